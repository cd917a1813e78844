use std::time::Duration;

use probe_common::ProbeError;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub stream: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, temperature: f64, stream: bool) -> Self {
        Self { prompt: prompt.into(), max_tokens, temperature, stream }
    }

    /// JSON body for `POST /completion`.
    pub fn body(&self) -> serde_json::Value {
        json!({
            "prompt": self.prompt,
            "n_predict": self.max_tokens,
            "temperature": self.temperature,
            "stream": self.stream,
        })
    }
}

/// Outcome of one request. Failed results never carry partial text.
#[derive(Debug)]
pub struct CompletionResult {
    pub text: String,
    pub elapsed: Duration,
    pub error: Option<ProbeError>,
}

impl CompletionResult {
    pub(crate) fn success(text: String, elapsed: Duration) -> Self {
        Self { text, elapsed, error: None }
    }

    pub(crate) fn failure(error: ProbeError, elapsed: Duration) -> Self {
        Self { text: String::new(), elapsed, error: Some(error) }
    }

    pub fn succeeded(&self) -> bool { self.error.is_none() }

    pub fn elapsed_seconds(&self) -> f64 { self.elapsed.as_secs_f64() }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}
