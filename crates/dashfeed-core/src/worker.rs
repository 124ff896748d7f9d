use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Single background task that runs submitted jobs one at a time, in order.
///
/// Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct BackgroundWorker {
    name: &'static str,
    sender: mpsc::UnboundedSender<Job>,
}

impl BackgroundWorker {
    pub fn spawn(name: &'static str) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            debug!(worker = name, "background worker stopped");
        });

        (Self { name, sender }, handle)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue a job. Returns `false` once the worker task has stopped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.sender.send(Box::pin(job)).is_ok()
    }

    /// Wait until every job queued before this call has finished.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        let queued = self.submit(async move {
            let _ = done.send(());
        });
        if queued {
            let _ = wait.await;
        }
    }
}
