use std::fmt;
use std::future::Future;
use futures::future::BoxFuture;
use futures::FutureExt;
use crate::error::Result;

type Work = BoxFuture<'static, Result<()>>;

/// # InferTask
///
/// A deferred unit of work produced by a batching stage for one object.
///
/// The task owns everything it needs (ticket, frame, object, batch index),
/// so it can be handed to any executor and run on any thread. Running it
/// happens in two phases:
///
/// 1. [`ready`](Self::ready) waits for the object's slot. This may park for
///    as long as the previous batch on that slot is in use, and depends on
///    other tasks making progress.
/// 2. The returned [`ReadyTask`] writes the object into its batch offset and
///    reports back to the pool. It never waits on other tasks.
///
/// Executors that bound concurrency should only count the second phase.
/// Tasks carry no identity beyond their `label`, which is only meant for
/// diagnostics.
pub struct InferTask {
    label: String,
    acquire: BoxFuture<'static, Result<Work>>,
}

impl InferTask {
    /// Wraps `work` into a task with no waiting phase.
    ///
    /// # Parameters
    ///
    /// * `label` - Human readable description used in logs
    /// * `work` - The future to run; it is not polled until the task runs
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self::staged(label, async move { Ok(work) })
    }

    /// Builds a task whose `acquire` future waits for a resource and then
    /// yields the work to run with it.
    pub fn staged<A, W>(label: impl Into<String>, acquire: A) -> Self
    where
        A: Future<Output = Result<W>> + Send + 'static,
        W: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            label: label.into(),
            acquire: acquire.map(|ready| ready.map(|work| Box::pin(work) as Work)).boxed(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Runs the waiting phase.
    pub async fn ready(self) -> Result<ReadyTask> {
        let work = self.acquire.await?;
        Ok(ReadyTask { label: self.label, work })
    }

    /// Runs the task to completion.
    pub async fn execute(self) -> Result<()> {
        self.ready().await?.execute().await
    }
}

impl fmt::Debug for InferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferTask").field("label", &self.label).finish()
    }
}

/// An [`InferTask`] whose resource is held; only the work is left.
pub struct ReadyTask {
    label: String,
    work: Work,
}

impl ReadyTask {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn execute(self) -> Result<()> {
        self.work.await
    }
}

impl fmt::Debug for ReadyTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadyTask").field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use crate::error::BatchingError;

    #[tokio::test]
    async fn test_work_is_deferred_until_execute() {
        let ran = Arc::new(AtomicBool::new(false));
        let task = {
            let ran = ran.clone();
            InferTask::new("infer task.", async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
        };
        assert_eq!(task.label(), "infer task.");
        assert!(!ran.load(Ordering::SeqCst));

        task.execute().await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let task = InferTask::new("failing", async { Err(BatchingError::TransformFailed(3)) });
        assert!(matches!(task.execute().await, Err(BatchingError::TransformFailed(3))));
    }

    #[tokio::test]
    async fn test_phases_run_in_order() {
        let step = Arc::new(AtomicUsize::new(0));
        let task = {
            let step = step.clone();
            InferTask::staged("two phases", async move {
                step.store(1, Ordering::SeqCst);
                Ok(async move {
                    step.store(2, Ordering::SeqCst);
                    Ok(())
                })
            })
        };

        let ready = task.ready().await.unwrap();
        assert_eq!(ready.label(), "two phases");
        assert_eq!(step.load(Ordering::SeqCst), 1);
        ready.execute().await.unwrap();
        assert_eq!(step.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_wait_skips_work() {
        let task = InferTask::staged::<_, futures::future::Ready<Result<()>>>("stale", async {
            Err(BatchingError::StaleTicket { slot: 0, generation: 3 })
        });
        assert!(matches!(task.execute().await, Err(BatchingError::StaleTicket { generation: 3, .. })));
    }
}
