//! Per-stage outcome counters and the operator-facing summary.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Counts collected while a stage walks its documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Documents the stage attempted.
    pub processed: usize,
    /// Documents deliberately left alone (filtered, unchanged, nothing to do).
    pub skipped: usize,
    /// Attempted documents that failed; a subset of `processed`.
    pub errored: usize,
}

impl StageSummary {
    /// Attempted documents that did not fail.
    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.errored)
    }

    /// Fails when the stage had work to do and every attempt errored.
    pub fn ensure_progress(&self, stage: &str) -> anyhow::Result<()> {
        if self.processed > 0 && self.succeeded() == 0 {
            anyhow::bail!(
                "{}: all {} document(s) failed; nothing succeeded",
                stage,
                self.processed
            );
        }
        Ok(())
    }

    /// Prints the final summary to stdout.
    pub fn render(&self, stage: &str, artifact: Option<&Path>, dry_run: bool) {
        println!("{} summary", stage);
        println!("  processed: {}", self.processed);
        println!("  skipped:   {}", self.skipped);
        println!("  errored:   {}", self.errored);
        match (artifact, dry_run) {
            (_, true) => println!("  dry run: nothing persisted"),
            (Some(path), false) => println!("  artifact: {}", path.display()),
            (None, false) => {}
        }
        if self.errored > 0 {
            println!(
                "  warning: {} document(s) failed; see log output for details",
                self.errored
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_requires_one_success() {
        let none_ok = StageSummary {
            processed: 2,
            skipped: 0,
            errored: 2,
        };
        assert!(none_ok.ensure_progress("stage").is_err());

        let partial = StageSummary {
            processed: 2,
            skipped: 1,
            errored: 1,
        };
        assert!(partial.ensure_progress("stage").is_ok());
        assert!(StageSummary::default().ensure_progress("stage").is_ok());
    }
}
