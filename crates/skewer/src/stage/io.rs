use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, trace};
use crate::error::{BatchingError, Result};
use crate::frame::{FrameInfo, InferObject};
use crate::resource::{BatchBuffers, SlotPool};
use crate::task::InferTask;
use super::core_trait::{ObjBatchingStage, ObjectProcessor};

/// # IoObjBatchingStage
///
/// Deferred batching stage: every admitted object becomes an [`InferTask`]
/// that waits for the object's slot, lets the processor write the object's
/// offset and reports back to the pool.
///
/// Admission goes through [`submit`](Self::submit), which only needs `&self`,
/// so several dispatchers may share one stage. The batch offset and the
/// ticket are taken under the same lock, which keeps offsets in ticket order.
///
/// If the processor fails, the task returns the error and the whole batch is
/// abandoned: the slot is recycled once the rest of the batch finishes and
/// is never handed to the consumer.
pub struct IoObjBatchingStage<H: ObjectProcessor> {
    batch_size: u32,
    batch_idx: Mutex<u32>,
    pool: SlotPool<BatchBuffers<H::Buffer>>,
    processor: Arc<H>,
}

impl<H: ObjectProcessor> IoObjBatchingStage<H> {
    /// Creates a stage writing into the slots of `pool`.
    ///
    /// Every slot's buffers must hold at least `batch_size` samples.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::InvalidConfig`] if `batch_size` is zero.
    pub fn new(processor: H, batch_size: u32, pool: SlotPool<BatchBuffers<H::Buffer>>) -> Result<Self> {
        if batch_size == 0 {
            return Err(BatchingError::InvalidConfig("batch_size must be greater than 0".into()));
        }
        info!(stage = processor.name(), batch_size, slots = pool.len(), "created batching stage");
        Ok(Self {
            batch_size,
            batch_idx: Mutex::new(0),
            pool,
            processor: Arc::new(processor),
        })
    }

    pub fn pool(&self) -> &SlotPool<BatchBuffers<H::Buffer>> {
        &self.pool
    }

    pub fn processor(&self) -> &H {
        &self.processor
    }

    /// Admits one object and returns the task that writes it.
    ///
    /// Never waits. The returned task must eventually be executed, otherwise
    /// the slot it was assigned to never completes.
    pub fn submit(&self, frame: Arc<FrameInfo>, obj: Arc<InferObject>) -> InferTask {
        let (ticket, batch_idx) = {
            let mut next = self.batch_idx.lock();
            let batch_idx = *next;
            let ticket = self.pool.pick_up_ticket(batch_idx + 1 != self.batch_size);
            *next = (batch_idx + 1) % self.batch_size;
            (ticket, batch_idx)
        };
        trace!(
            stage = self.processor.name(),
            slot = ticket.slot(),
            batch_idx,
            object = %obj.id,
            "admitted object"
        );

        let label = format!(
            "{} stream={} frame={} object={} batch_idx={batch_idx}",
            self.processor.name(),
            frame.stream_id,
            frame.frame_id,
            obj.id
        );
        let pool = self.pool.clone();
        let processor = self.processor.clone();
        InferTask::staged(label, async move {
            let view = pool.wait_resource_by_ticket(ticket).await?;
            Ok(async move {
                match processor.process_one_object(&frame, &obj, batch_idx, view.value()) {
                    Ok(()) => pool.dealing_done(view),
                    Err(e) => pool.abandon(view).and(Err(e)),
                }
            })
        })
    }

    /// See [`ObjBatchingStage::flush`].
    pub fn flush_pending(&self) -> Option<u32> {
        let mut next = self.batch_idx.lock();
        if *next == 0 {
            return None;
        }
        let objects = self.pool.seal_current();
        debug!(stage = self.processor.name(), ?objects, "flushed partial batch");
        *next = 0;
        objects
    }

    pub fn current_batch_idx(&self) -> u32 {
        *self.batch_idx.lock()
    }
}

#[async_trait]
impl<H: ObjectProcessor> ObjBatchingStage for IoObjBatchingStage<H> {
    async fn batching(&mut self, frame: Arc<FrameInfo>, obj: Arc<InferObject>) -> Result<Option<InferTask>> {
        Ok(Some(self.submit(frame, obj)))
    }

    fn flush(&mut self) -> Option<u32> {
        self.flush_pending()
    }

    fn batch_size(&self) -> u32 {
        self.batch_size
    }

    fn batch_idx(&self) -> u32 {
        self.current_batch_idx()
    }
}
