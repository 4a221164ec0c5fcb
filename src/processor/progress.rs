//! Progress reporting for pipeline runs.
//!
//! The pipeline emits [`ProgressEvent`]s through a [`ProgressSink`]. Sinks
//! only observe; they never influence ordering or decoded values.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedSender;

/// Events emitted while a batch runs
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    BatchStarted {
        inputs: usize,
    },
    ArchiveStarted {
        archive: PathBuf,
    },
    ArchiveStaged {
        archive: PathBuf,
        members: usize,
        extracted: usize,
    },
    MemberDecoded {
        archive: PathBuf,
        member: PathBuf,
        index: usize,
        total: usize,
    },
    MemberFailed {
        archive: PathBuf,
        member: PathBuf,
        reason: String,
    },
    ArchiveFinished {
        archive: PathBuf,
        succeeded: bool,
    },
    BatchFinished {
        succeeded: usize,
        failed: usize,
    },
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into a tokio channel
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        // A dropped receiver just means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

/// Terminal progress bar counting finished inputs
#[derive(Debug, Clone)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for ProgressBarSink {
    fn default() -> Self {
        Self::new()
    }
}

fn short_name(path: &std::path::Path) -> String {
    crate::filesystem::file_name_string(path)
}

impl ProgressSink for ProgressBarSink {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::BatchStarted { inputs } => {
                self.bar.set_length(inputs as u64);
                self.bar.set_message("Staging archives");
            }
            ProgressEvent::ArchiveStaged {
                archive,
                members,
                extracted,
            } => {
                self.bar.set_message(format!(
                    "{}: {} members ({} extracted)",
                    short_name(&archive),
                    members,
                    extracted
                ));
            }
            ProgressEvent::MemberDecoded {
                archive,
                index,
                total,
                ..
            } => {
                self.bar.set_message(format!(
                    "{}: decoded {}/{}",
                    short_name(&archive),
                    index + 1,
                    total
                ));
            }
            ProgressEvent::MemberFailed { member, reason, .. } => {
                self.bar
                    .println(format!("  failed {}: {}", short_name(&member), reason));
            }
            ProgressEvent::ArchiveFinished { .. } => self.bar.inc(1),
            ProgressEvent::BatchFinished { succeeded, failed } => {
                self.bar.finish_with_message(format!(
                    "Completed: {succeeded} succeeded, {failed} failed"
                ));
            }
            ProgressEvent::ArchiveStarted { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_sink_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ChannelProgress::new(tx);
        sink.emit(ProgressEvent::BatchStarted { inputs: 3 });

        assert_eq!(rx.try_recv().unwrap(), ProgressEvent::BatchStarted { inputs: 3 });
    }

    #[test]
    fn test_channel_sink_survives_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        ChannelProgress::new(tx).emit(ProgressEvent::BatchFinished {
            succeeded: 0,
            failed: 0,
        });
    }

    #[test]
    fn test_progress_bar_sink_counts_archives() {
        let sink = ProgressBarSink::hidden();
        sink.emit(ProgressEvent::BatchStarted { inputs: 2 });
        sink.emit(ProgressEvent::ArchiveFinished {
            archive: PathBuf::from("a.tar"),
            succeeded: true,
        });
        assert_eq!(sink.bar.position(), 1);
        assert_eq!(sink.bar.length(), Some(2));
    }
}
