//! Progress delivery and interruption plumbing.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mvarchive_core::{ArchiveProgress, Error, Result};

/// Push-only channel of progress snapshots.
///
/// Each call to [`ProgressSink::send`] delivers an independent clone, so the
/// consumer never observes a snapshot changing under it. A dropped receiver
/// is not an error; the run carries on without a listener.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ArchiveProgress>>,
}

impl ProgressSink {
    /// Sink plus the receiving end for a consumer task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ArchiveProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Sink that discards everything.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn from_sender(tx: mpsc::UnboundedSender<ArchiveProgress>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn send(&self, progress: &ArchiveProgress) {
        if let Some(ref tx) = self.tx {
            let _ = tx.send(progress.clone());
        }
    }
}

/// A step that stopped early, with the snapshot as it stood.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Interrupted {
    pub progress: ArchiveProgress,
    #[source]
    pub error: Error,
}

impl Interrupted {
    pub fn new(progress: ArchiveProgress, error: Error) -> Self {
        Self { progress, error }
    }
}

/// Cancellation checkpoint between units of work.
pub(crate) fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_delivers_independent_clones() {
        let (sink, mut rx) = ProgressSink::channel();
        let mut progress = ArchiveProgress::start(1, 29);
        progress.status = "first".into();
        sink.send(&progress);
        progress.status = "second".into();
        sink.send(&progress);

        assert_eq!(rx.recv().await.unwrap().status, "first");
        assert_eq!(rx.recv().await.unwrap().status, "second");
    }

    #[test]
    fn test_send_after_receiver_dropped_is_silent() {
        let (sink, rx) = ProgressSink::channel();
        drop(rx);
        sink.send(&ArchiveProgress::start(1, 29));
        ProgressSink::noop().send(&ArchiveProgress::start(1, 29));
    }

    #[test]
    fn test_checkpoint() {
        let token = CancellationToken::new();
        assert!(checkpoint(&token).is_ok());
        token.cancel();
        assert!(checkpoint(&token).unwrap_err().is_cancelled());
    }
}
