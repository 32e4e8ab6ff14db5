//! Progress reporting channel between an executor/resolver worker thread
//! and whatever is driving it (CLI, scheduler). Single-producer/single-
//! consumer per invocation; the consumer is free to miss intermediate
//! updates (latest-wins is acceptable, there is no backpressure).

use crossbeam_channel::{unbounded, Receiver, Sender};

/// One progress update emitted during a backup or restore run.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// About to process this source-relative path.
    FileStarted { relative_path: String },
    /// Running totals, updated as files are processed.
    Counts {
        files_total: u64,
        files_processed: u64,
        files_copied: u64,
        files_skipped: u64,
        bytes_copied: u64,
    },
    /// The run finished, successfully or not.
    Done { success: bool, error: Option<String> },
}

impl ProgressEvent {
    /// Percentage of `files_total` processed so far; `0.0` when the total
    /// is not yet known.
    pub fn progress_percent(files_processed: u64, files_total: u64) -> f64 {
        if files_total == 0 {
            0.0
        } else {
            (files_processed as f64 / files_total as f64) * 100.0
        }
    }
}

/// Create a fresh progress channel for one backup/restore invocation.
pub fn channel() -> (Sender<ProgressEvent>, Receiver<ProgressEvent>) {
    unbounded()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_zero_when_total_unknown() {
        assert_eq!(ProgressEvent::progress_percent(5, 0), 0.0);
    }

    #[test]
    fn percent_reflects_progress() {
        assert_eq!(ProgressEvent::progress_percent(1, 4), 25.0);
    }

    #[test]
    fn events_flow_end_to_end() {
        let (tx, rx) = channel();
        tx.send(ProgressEvent::FileStarted {
            relative_path: "a.txt".into(),
        })
        .unwrap();
        tx.send(ProgressEvent::Done {
            success: true,
            error: None,
        })
        .unwrap();
        drop(tx);

        let mut seen_done = false;
        for event in rx.iter() {
            if let ProgressEvent::Done { success, .. } = event {
                seen_done = true;
                assert!(success);
            }
        }
        assert!(seen_done);
    }
}
