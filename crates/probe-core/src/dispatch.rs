use std::time::Duration;

use probe_common::ProbeError;
use tokio::task::JoinError;
use tracing::Instrument;

use crate::completion::{CompletionRequest, CompletionResult};
use crate::runner::RequestRunner;

pub const BURST_MAX_TOKENS: u32 = 128;
pub const BURST_TEMPERATURE: f64 = 0.7;

#[derive(Debug)]
pub struct IndexedResult {
    /// 1-based position of the request within the burst.
    pub index: usize,
    pub result: CompletionResult,
}

/// Fans a prompt out to `count` concurrent blocking requests.
#[derive(Clone)]
pub struct ParallelDispatcher {
    runner: RequestRunner,
}

impl ParallelDispatcher {
    pub fn new(runner: RequestRunner) -> Self { Self { runner } }

    pub fn burst_prompt(base_prompt: &str, index: usize) -> String {
        format!("{} (Request {})", base_prompt, index)
    }

    /// Returns once every task has finished, with one result per task.
    pub async fn run(&self, base_url: &str, base_prompt: &str, count: usize) -> Vec<IndexedResult> {
        tracing::info!(target: "probe", count, "dispatching burst");
        let mut tasks = Vec::with_capacity(count);
        for index in 1..=count {
            let runner = self.runner.clone();
            let url = base_url.to_string();
            let request = CompletionRequest::new(
                Self::burst_prompt(base_prompt, index),
                BURST_MAX_TOKENS,
                BURST_TEMPERATURE,
                false,
            );
            let span = tracing::info_span!("burst_task", index);
            let handle = tokio::spawn(async move { runner.execute(&url, &request).await }.instrument(span));
            tasks.push((index, handle));
        }

        let mut results = Vec::with_capacity(count);
        for (index, handle) in tasks {
            results.push(IndexedResult { index, result: settle(index, handle.await) });
        }
        results
    }
}

/// A task that panicked or was cancelled still yields a failed result.
fn settle(index: usize, joined: Result<CompletionResult, JoinError>) -> CompletionResult {
    match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(target: "probe", index, "burst task did not complete: {}", e);
            CompletionResult::failure(ProbeError::Message(format!("task {} did not complete: {}", index, e)), Duration::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn explode() -> CompletionResult {
        panic!("worker blew up")
    }

    #[tokio::test]
    async fn panicked_task_becomes_failed_result() {
        let joined = tokio::spawn(async { explode() }).await;
        let result = settle(4, joined);
        assert!(!result.succeeded());
        assert!(result.text.is_empty());
        assert_eq!(result.elapsed, Duration::ZERO);
        let detail = result.error_detail().unwrap();
        assert!(detail.contains("task 4 did not complete"), "{}", detail);
        assert!(detail.contains("panic"), "{}", detail);
    }

    #[tokio::test]
    async fn completed_task_passes_through() {
        let joined = tokio::spawn(async { CompletionResult::success("done".into(), Duration::from_millis(5)) }).await;
        let result = settle(1, joined);
        assert!(result.succeeded());
        assert_eq!(result.text, "done");
    }
}
