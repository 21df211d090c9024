//! Reference executor for [`InferTask`]s.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use crate::error::{BatchingError, Result};
use crate::task::InferTask;

/// How long the dispatch loop sleeps before re-checking the queue on its own.
const RECHECK_INTERVAL: Duration = Duration::from_millis(100);

struct Pending {
    task: InferTask,
    reply: oneshot::Sender<Result<()>>,
}

type Queue = Arc<Mutex<VecDeque<Pending>>>;

/// # TaskExecutor
///
/// Runs submitted tasks on the tokio runtime, starting them in submission
/// order.
///
/// Every task first waits for its slot ([`InferTask::ready`]); at most
/// `max_concurrent` tasks run their work phase at the same time. Tasks may
/// be submitted in any order relative to their tickets.
///
/// A background loop drains the queue whenever it is notified of a new task
/// and re-checks it periodically. Shutting down (explicitly or by dropping
/// the executor) stops accepting tasks, but everything already queued is
/// still run.
///
/// Must be created from within a tokio runtime.
pub struct TaskExecutor {
    queue: Queue,
    /// Flag indicating whether new tasks are accepted
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    /// Handle to the dispatch loop, `None` after shutdown
    handle: Option<JoinHandle<()>>,
}

impl TaskExecutor {
    /// Spawns the dispatch loop.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::InvalidConfig`] if `max_concurrent` is zero.
    pub fn new(max_concurrent: usize) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(BatchingError::InvalidConfig("max_concurrent_tasks must be greater than 0".into()));
        }
        let queue: Queue = Default::default();
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = tokio::spawn(dispatch_loop(
            queue.clone(),
            running.clone(),
            notifier.clone(),
            Arc::new(Semaphore::new(max_concurrent)),
        ));
        info!(max_concurrent, "started task executor");
        Ok(Self { queue, running, notifier, handle: Some(handle) })
    }

    /// Queues `task` and returns a future resolving to its result.
    ///
    /// Never waits. After shutdown the returned outcome resolves to
    /// [`BatchingError::ExecutorClosed`].
    pub fn submit(&self, task: InferTask) -> TaskOutcome {
        let (reply, receiver) = oneshot::channel();
        {
            let mut queue = self.queue.lock();
            if !self.running.load(Ordering::SeqCst) {
                debug!(task = task.label(), "executor is shut down, rejecting task");
                return TaskOutcome::new(receiver);
            }
            queue.push_back(Pending { task, reply });
        }
        self.notifier.notify_one();
        TaskOutcome::new(receiver)
    }

    /// Tasks submitted but not yet started.
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Stops accepting tasks. Queued tasks still run.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
        // Dropping the handle detaches the loop; it exits once the queue is empty.
        self.handle.take();
    }

    /// Shuts down and waits until every queued task has been started.
    pub async fn join(mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Waits for the task's slot without a permit, then runs the work under one.
/// A task parked on its slot may be waiting for a task submitted after it,
/// so parked tasks must not hold permits.
async fn run_task(task: InferTask, permits: Arc<Semaphore>) -> Result<()> {
    let ready = task.ready().await?;
    let _permit = permits.acquire_owned().await.map_err(|_| BatchingError::ExecutorClosed)?;
    ready.execute().await
}

async fn dispatch_loop(queue: Queue, running: Arc<AtomicBool>, notifier: Arc<Notify>, permits: Arc<Semaphore>) {
    loop {
        let batch: Vec<Pending> = {
            let mut queue = queue.lock();
            if queue.is_empty() && !running.load(Ordering::SeqCst) {
                break;
            }
            queue.drain(..).collect()
        };

        if batch.is_empty() {
            let _ = tokio::time::timeout(RECHECK_INTERVAL, notifier.notified()).await;
            continue;
        }

        for Pending { task, reply } in batch {
            let permits = permits.clone();
            tokio::spawn(async move {
                let label = task.label().to_owned();
                let result = run_task(task, permits).await;
                if let Err(e) = &result {
                    error!(task = %label, error = %e, "task failed");
                }
                let _ = reply.send(result);
            });
        }
    }
    debug!("task executor stopped");
}

/// # TaskOutcome
///
/// Resolves to the result of a task submitted to a [`TaskExecutor`].
/// Dropping it does not cancel the task.
pub struct TaskOutcome {
    receiver: oneshot::Receiver<Result<()>>,
}

impl TaskOutcome {
    fn new(receiver: oneshot::Receiver<Result<()>>) -> Self {
        Self { receiver }
    }
}

impl Future for TaskOutcome {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BatchingError::ExecutorClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use futures::StreamExt;
    use futures::future::join_all;
    use tokio::time::{self, timeout};
    use crate::backend::mock::FillPreproc;
    use crate::config::StageConfig;
    use crate::frame::{DataFrame, FrameInfo, InferObject, PixelFormat};
    use crate::model::{ModelInfo, ModelShapes, TensorShape};
    use crate::stage::CpuPreprocessingStage;

    #[tokio::test]
    async fn test_runs_submitted_task() {
        let executor = TaskExecutor::new(2).unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let outcome = {
            let ran = ran.clone();
            executor.submit(InferTask::new("flag", async move {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            }))
        };
        timeout(Duration::from_secs(1), outcome).await.unwrap().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failure_reaches_outcome() {
        let executor = TaskExecutor::new(1).unwrap();
        let outcome = executor.submit(InferTask::new("fails", async { Err(BatchingError::TransformFailed(5)) }));
        assert!(matches!(outcome.await, Err(BatchingError::TransformFailed(5))));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let executor = TaskExecutor::new(2).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes: Vec<_> = (0..6)
            .map(|i| {
                let (active, peak) = (active.clone(), peak.clone());
                executor.submit(InferTask::new(format!("sleeper {i}"), async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .collect();

        for result in timeout(Duration::from_secs(2), join_all(outcomes)).await.unwrap() {
            result.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_queued_tasks_run_after_shutdown() {
        let executor = TaskExecutor::new(1).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let outcomes: Vec<_> = (0..3)
            .map(|_| {
                let count = count.clone();
                executor.submit(InferTask::new("count", async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }))
            })
            .collect();
        executor.join().await;

        for result in join_all(outcomes).await {
            result.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let mut executor = TaskExecutor::new(1).unwrap();
        executor.shutdown();
        executor.shutdown();
        let outcome = executor.submit(InferTask::new("late", async { Ok(()) }));
        assert!(matches!(outcome.await, Err(BatchingError::ExecutorClosed)));
        assert_eq!(executor.queued(), 0);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(matches!(TaskExecutor::new(0), Err(BatchingError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_tasks_submitted_out_of_ticket_order() {
        let model: Arc<dyn ModelShapes> = Arc::new(ModelInfo::new(vec![TensorShape::new(1, 1, 1, 1)]));
        let config = StageConfig { batch_size: 1, pool_depth: 1, max_concurrent_tasks: 1, ..Default::default() };
        let (stage, mut filled) = CpuPreprocessingStage::with_host_buffers(model, Arc::new(FillPreproc), &config).unwrap();
        let executor = TaskExecutor::new(config.max_concurrent_tasks).unwrap();

        let frame = Arc::new(FrameInfo {
            stream_id: "cam-5".into(),
            frame_id: 0,
            frame: DataFrame {
                fmt: PixelFormat::Rgb24,
                width: 1,
                height: 1,
                stride: vec![3],
                planes: vec![],
                device_id: 0,
            },
        });
        let first = stage.submit(frame.clone(), Arc::new(InferObject { score: 1.0, ..Default::default() }));
        let second = stage.submit(frame, Arc::new(InferObject { score: 2.0, ..Default::default() }));

        // The later turn reaches the executor first and parks on the slot.
        let second = executor.submit(second);
        let first = executor.submit(first);

        let consumer = tokio::spawn(async move {
            let mut values = vec![];
            for _ in 0..2 {
                let batch = filled.next().await.unwrap();
                values.extend(batch.value().inputs()[0].to_contiguous(batch.objects()));
            }
            values
        });

        let (first, second) = timeout(Duration::from_secs(2), futures::future::join(first, second))
            .await
            .unwrap();
        first.unwrap();
        second.unwrap();
        assert_eq!(timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drives_cpu_stage() {
        let model: Arc<dyn ModelShapes> = Arc::new(ModelInfo::new(vec![TensorShape::new(2, 1, 1, 1)]));
        let config = StageConfig { batch_size: 2, max_concurrent_tasks: 3, ..Default::default() };
        let (stage, mut filled) = CpuPreprocessingStage::with_host_buffers(model, Arc::new(FillPreproc), &config).unwrap();
        let executor = TaskExecutor::new(config.max_concurrent_tasks).unwrap();

        let frame = Arc::new(FrameInfo {
            stream_id: "cam-4".into(),
            frame_id: 0,
            frame: DataFrame {
                fmt: PixelFormat::Rgb24,
                width: 1,
                height: 1,
                stride: vec![3],
                planes: vec![],
                device_id: 0,
            },
        });
        let consumer = tokio::spawn(async move {
            let mut values = vec![];
            for _ in 0..3 {
                let batch = filled.next().await.unwrap();
                values.extend(batch.value().inputs()[0].to_contiguous(batch.objects()));
            }
            values
        });

        let mut outcomes = vec![];
        for score in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            let obj = Arc::new(InferObject { score, ..Default::default() });
            outcomes.push(executor.submit(stage.submit(frame.clone(), obj)));
        }
        for result in join_all(outcomes).await {
            result.unwrap();
        }
        // Batches on different slots may complete in either order.
        let mut values = timeout(Duration::from_secs(2), consumer).await.unwrap().unwrap();
        values.sort_by(f32::total_cmp);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }
}
