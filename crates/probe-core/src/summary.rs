use std::fmt;
use std::time::Duration;

use crate::completion::CompletionResult;

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub min: Option<Duration>,
    pub max: Option<Duration>,
    pub mean: Option<Duration>,
    pub wall: Duration,
}

impl RunSummary {
    pub fn from_results<'a, I>(results: I, wall: Duration) -> Self
    where
        I: IntoIterator<Item = &'a CompletionResult>,
    {
        let mut total = 0usize;
        let mut succeeded = 0usize;
        let mut sum = Duration::ZERO;
        let mut min: Option<Duration> = None;
        let mut max: Option<Duration> = None;
        for r in results {
            total += 1;
            if r.succeeded() { succeeded += 1; }
            sum += r.elapsed;
            min = Some(min.map_or(r.elapsed, |m| m.min(r.elapsed)));
            max = Some(max.map_or(r.elapsed, |m| m.max(r.elapsed)));
        }
        let mean = (total > 0).then(|| sum / total as u32);
        Self { total, succeeded, failed: total - succeeded, min, max, mean, wall }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} requests: {} ok, {} failed", self.total, self.succeeded, self.failed)?;
        if let (Some(min), Some(mean), Some(max)) = (self.min, self.mean, self.max) {
            write!(
                f,
                "; latency min {:.2}s mean {:.2}s max {:.2}s",
                min.as_secs_f64(),
                mean.as_secs_f64(),
                max.as_secs_f64()
            )?;
        }
        write!(f, "; wall {:.2}s", self.wall.as_secs_f64())
    }
}
