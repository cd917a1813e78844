//! Completion probe: single requests, streamed consumption, and parallel bursts

pub mod completion;
pub mod dispatch;
pub mod runner;
pub mod stream;
pub mod summary;

pub use completion::{CompletionRequest, CompletionResult};
pub use dispatch::{IndexedResult, ParallelDispatcher};
pub use runner::RequestRunner;
pub use summary::RunSummary;

/// How a probe invocation is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Single { stream: bool },
    Parallel(usize),
}

impl Mode {
    /// A positive `parallel` count always wins; bursts never stream.
    pub fn from_flags(stream: bool, parallel: usize) -> Self {
        if parallel > 0 { Mode::Parallel(parallel) } else { Mode::Single { stream } }
    }
}
