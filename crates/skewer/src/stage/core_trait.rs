use std::sync::Arc;
use async_trait::async_trait;
use crate::error::Result;
use crate::frame::{FrameInfo, InferObject};
use crate::resource::BatchBuffers;
use crate::task::InferTask;

/// # ObjBatchingStage
///
/// Admits detected objects one at a time into the batch that is currently
/// being assembled.
///
/// Every object is assigned the next batch offset in arrival order. Stages
/// either hand back a deferred [`InferTask`] that performs the write once the
/// object's slot is available, or do the work before returning and yield
/// `None`.
///
/// # Example
///
/// ```ignore
/// while let Some((frame, obj)) = detections.next().await {
///     if let Some(task) = stage.batching(frame, obj).await? {
///         executor.submit(task);
///     }
/// }
/// stage.flush();
/// ```
#[async_trait]
pub trait ObjBatchingStage: Send {
    /// Admits one object.
    ///
    /// # Parameters
    ///
    /// * `frame` - The frame the object was detected in
    /// * `obj` - The detection; its bounding box may lie outside the frame
    ///
    /// # Returns
    ///
    /// A task to run for deferred stages, `None` for synchronous ones.
    async fn batching(&mut self, frame: Arc<FrameInfo>, obj: Arc<InferObject>) -> Result<Option<InferTask>>;

    /// Closes the batch being assembled even though it is not full.
    ///
    /// # Returns
    ///
    /// The number of objects in the closed batch, or `None` when no object was
    /// pending.
    fn flush(&mut self) -> Option<u32>;

    fn batch_size(&self) -> u32;

    /// Offset the next object will be written to.
    fn batch_idx(&self) -> u32;
}

/// Writes a single object into its offset of a slot's batch buffers.
///
/// Implementations never touch the pool; the stage owns the ticketing around
/// each call. Calls for distinct offsets of the same slot may run at the same
/// time.
pub trait ObjectProcessor: Send + Sync + 'static {
    /// Destination buffer held once per model input in every slot.
    type Buffer: Send + Sync + 'static;

    /// Short name used in task labels and logs.
    fn name(&self) -> &'static str;

    fn process_one_object(
        &self,
        frame: &FrameInfo,
        obj: &InferObject,
        batch_idx: u32,
        value: &BatchBuffers<Self::Buffer>,
    ) -> Result<()>;
}
