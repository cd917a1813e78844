use std::error::Error as _;
use std::time::{Duration, Instant};

use probe_common::{ErrorBody, ProbeError, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use crate::completion::{CompletionRequest, CompletionResult};
use crate::stream::{decode_line, decode_object, parse_chunk, LineDecoder};

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    content: String,
}

/// Issues single completion requests against a llama.cpp-style server.
#[derive(Clone)]
pub struct RequestRunner {
    client: reqwest::Client,
}

impl RequestRunner {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(format!("probe/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProbeError::Message(format!("failed to initialize HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self { Self { client } }

    pub async fn execute(&self, base_url: &str, request: &CompletionRequest) -> CompletionResult {
        self.execute_with(base_url, request, |_| {}).await
    }

    /// Runs `request`, handing each streamed fragment to `on_fragment` as it arrives.
    ///
    /// Never fails: transport, server and protocol errors are folded into the result.
    #[tracing::instrument(name = "completion", skip_all, fields(stream = request.stream, prompt_len = request.prompt.len()))]
    pub async fn execute_with<F>(&self, base_url: &str, request: &CompletionRequest, mut on_fragment: F) -> CompletionResult
    where
        F: FnMut(&str),
    {
        let mode = if request.stream { "stream" } else { "blocking" };
        let url = completion_url(base_url);
        let body = request.body().to_string();
        let _inflight = probe_obs::track_inflight();

        let start = Instant::now();
        let outcome = self.send(&url, body, request.stream, &mut on_fragment).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(text) => {
                probe_obs::record_request(mode, "ok", elapsed.as_secs_f64());
                tracing::info!(target: "probe", elapsed_s = elapsed.as_secs_f64(), chars = text.len(), "completion finished");
                CompletionResult::success(text, elapsed)
            }
            Err(err) => {
                probe_obs::record_request(mode, err.kind(), elapsed.as_secs_f64());
                tracing::warn!(target: "probe", elapsed_s = elapsed.as_secs_f64(), kind = err.kind(), "completion failed: {}", err);
                CompletionResult::failure(err, elapsed)
            }
        }
    }

    async fn send<F>(&self, url: &str, body: String, stream: bool, on_fragment: &mut F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let response = ensure_ok(response).await?;
        if stream {
            read_stream(response, on_fragment).await
        } else {
            read_body(response).await
        }
    }
}

fn completion_url(base_url: &str) -> String {
    format!("{}/completion", base_url.trim_end_matches('/'))
}

async fn ensure_ok(response: Response) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = match response.text().await {
        Ok(raw) => ErrorBody::parse(&raw),
        Err(e) => ErrorBody::Text(format!("<unreadable body: {}>", transport(e))),
    };
    Err(ProbeError::Server { status: status.as_u16(), body })
}

async fn read_body(response: Response) -> Result<String> {
    let bytes = response.bytes().await.map_err(transport)?;
    let raw = std::str::from_utf8(&bytes).map_err(|e| ProbeError::Protocol(format!("response body is not utf-8: {}", e)))?;
    let body: CompletionBody = decode_object(raw)?;
    Ok(body.content)
}

/// Consumes the body until a `stop` chunk or end of stream. Returning early
/// drops the response, which closes the connection and discards unread data.
/// Lines are decoded one at a time, so bytes after `stop` are never inspected.
async fn read_stream<F>(mut response: Response, on_fragment: &mut F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut decoder = LineDecoder::new();
    let mut text = String::new();
    while let Some(bytes) = response.chunk().await.map_err(transport)? {
        decoder.push(&bytes);
        while let Some(line) = decoder.next_line()? {
            if consume_line(&line, &mut text, on_fragment)? {
                return Ok(text);
            }
        }
    }
    if let Some(line) = decoder.finish() {
        consume_line(&line, &mut text, on_fragment)?;
    }
    Ok(text)
}

/// Appends the line's fragment to `text`; returns true on the final chunk.
fn consume_line<F>(line: &[u8], text: &mut String, on_fragment: &mut F) -> Result<bool>
where
    F: FnMut(&str),
{
    let Some(chunk) = parse_chunk(decode_line(line)?)? else { return Ok(false) };
    if let Some(fragment) = chunk.content.as_deref().filter(|f| !f.is_empty()) {
        text.push_str(fragment);
        probe_obs::record_fragment();
        on_fragment(fragment);
    }
    Ok(chunk.is_final)
}

fn transport(err: reqwest::Error) -> ProbeError {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    if err.is_timeout() {
        return ProbeError::Transport(format!("timed out: {}", detail));
    }
    if err.is_decode() || err.is_body() {
        return ProbeError::Transport(format!("body read failed: {}", detail));
    }
    ProbeError::Transport(detail)
}
