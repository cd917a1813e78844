use std::fmt;

pub type Result<T> = core::result::Result<T, ProbeError>;

#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned status {status}: {body}")]
    Server { status: u16, body: ErrorBody },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("{0}")]
    Message(String),
}

impl ProbeError {
    /// Short label used for metric labels and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Transport(_) => "transport",
            ProbeError::Server { .. } => "server",
            ProbeError::Protocol(_) => "protocol",
            ProbeError::Message(_) => "internal",
        }
    }
}

/// Diagnostic body of a non-200 response, decoded on a best-effort basis.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Json(serde_json::Value),
    Text(String),
}

impl ErrorBody {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return ErrorBody::Text("<empty body>".into());
        }
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => ErrorBody::Json(value),
            Err(_) => ErrorBody::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorBody::Json(value) => write!(f, "{}", value),
            ErrorBody::Text(text) => f.write_str(text),
        }
    }
}

pub mod config {
    use serde::Deserialize;
    use std::env;

    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
    pub const DEFAULT_PROMPT: &str = "Write a short poem about artificial intelligence";

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(default)]
    pub struct ProbeConfig {
        pub base_url: String,
        pub prompt: String,
        pub max_tokens: u32,
        pub temperature: f64,
        pub timeout_secs: Option<u64>,
    }

    impl Default for ProbeConfig {
        fn default() -> Self {
            Self {
                base_url: DEFAULT_BASE_URL.into(),
                prompt: DEFAULT_PROMPT.into(),
                max_tokens: 128,
                temperature: 0.7,
                timeout_secs: None,
            }
        }
    }

    impl ProbeConfig {
        pub fn load() -> Self {
            Self::load_from(|key| env::var(key).ok())
        }

        /// Same as [`ProbeConfig::load`], reading variables through `lookup`.
        pub fn load_from<F>(lookup: F) -> Self
        where
            F: Fn(&str) -> Option<String>,
        {
            if let Some(path) = lookup("PROBE_CONFIG") {
                let Ok(text) = std::fs::read_to_string(path) else { return Self::default() };
                let Ok(cfg) = serde_yaml::from_str::<ProbeConfig>(&text) else { return Self::default() };
                return cfg;
            }
            let mut cfg = Self::default();
            if let Some(url) = lookup("PROBE_URL") { cfg.base_url = url; }
            if let Some(prompt) = lookup("PROBE_PROMPT") { cfg.prompt = prompt; }
            if let Some(v) = lookup("PROBE_MAX_TOKENS").and_then(|v| v.parse().ok()) { cfg.max_tokens = v; }
            if let Some(v) = lookup("PROBE_TEMPERATURE").and_then(|v| v.parse().ok()) { cfg.temperature = v; }
            if let Some(v) = lookup("PROBE_TIMEOUT_SECS").and_then(|v| v.parse().ok()) { cfg.timeout_secs = Some(v); }
            cfg
        }
    }
}
