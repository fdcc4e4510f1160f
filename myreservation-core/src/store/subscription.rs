//! Cancellable live-query subscription.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Snapshot, StoreError};

/// Snapshots buffered between the producer and a slow consumer.
const SNAPSHOT_BUFFER: usize = 16;

pub type SnapshotResult = Result<Snapshot, StoreError>;

/// A live query owned by exactly one consumer.
///
/// The producing task is aborted when the subscription is dropped or
/// [`unsubscribe`](Self::unsubscribe)d, so the underlying connection never
/// outlives its owner.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<SnapshotResult>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawns `listen` as the producer. It should return once sending fails.
    pub fn spawn<F, Fut>(listen: F) -> Self
    where
        F: FnOnce(mpsc::Sender<SnapshotResult>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(SNAPSHOT_BUFFER);
        let task = tokio::spawn(listen(sender));
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Waits for the next snapshot. Returns `None` once the producer stopped.
    pub async fn next_snapshot(&mut self) -> Option<SnapshotResult> {
        self.receiver.recv().await
    }

    /// Returns true while the producer is running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the producer and releases the live connection.
    pub fn unsubscribe(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Stream for Subscription {
    type Item = SnapshotResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
