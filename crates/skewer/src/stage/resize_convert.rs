use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, info, trace};
use crate::backend::{ColorMode, CoreVersion, ResizeConvertAttr, ResizeConvertInput, ResizeConvertOp};
use crate::config::StageConfig;
use crate::error::{BatchingError, Result};
use crate::frame::{FrameInfo, InferObject};
use crate::model::ModelShapes;
use crate::resource::{RcOpSlot, SlotPool, SlotView};
use crate::task::InferTask;
use super::core_trait::ObjBatchingStage;

/// # ResizeConvertStage
///
/// Synchronous batching stage feeding a pool of stateful resize-convert
/// operators. Each object is submitted to an operator right away; the
/// operator keeps its own batch and output pipelining, so
/// [`batching`](ObjBatchingStage::batching) always yields `None`.
///
/// The operators are initialized lazily on the first object: destination
/// size from model input 0, colour mode from the frame's pixel format. Every
/// later frame must map to the same colour mode.
///
/// Operators must see objects in order from one producer, which `&mut self`
/// guarantees.
pub struct ResizeConvertStage {
    model: Arc<dyn ModelShapes>,
    core_version: CoreVersion,
    batch_size: u32,
    batch_idx: u32,
    pool: SlotPool<RcOpSlot>,
}

impl ResizeConvertStage {
    pub fn new(
        model: Arc<dyn ModelShapes>,
        core_version: CoreVersion,
        batch_size: u32,
        pool: SlotPool<RcOpSlot>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(BatchingError::InvalidConfig("batch_size must be greater than 0".into()));
        }
        info!(stage = "resize-convert", batch_size, slots = pool.len(), ?core_version, "created batching stage");
        Ok(Self { model, core_version, batch_size, batch_idx: 0, pool })
    }

    /// Builds a stage with one slot per operator.
    pub fn with_ops<O: ResizeConvertOp + 'static>(
        model: Arc<dyn ModelShapes>,
        core_version: CoreVersion,
        ops: Vec<O>,
        config: &StageConfig,
    ) -> Result<Self> {
        config.validate()?;
        let pool = SlotPool::new(ops.into_iter().map(RcOpSlot::new).collect())?;
        Self::new(model, core_version, config.batch_size, pool)
    }

    pub fn pool(&self) -> &SlotPool<RcOpSlot> {
        &self.pool
    }

    async fn admit(&mut self, frame: &FrameInfo, obj: &InferObject) -> Result<()> {
        let data = &frame.frame;
        let color_mode = ColorMode::for_pixel_format(data.fmt)?;
        if let Some(attr) = self.pool.params() {
            if attr.color_mode != color_mode {
                return Err(BatchingError::ColorModeMismatch { expected: attr.color_mode, found: color_mode });
            }
        }
        let input = ResizeConvertInput {
            src_w: data.width,
            src_h: data.height,
            src_stride: data.stride(0)?,
            planes: [data.device_plane(0)?, data.device_plane(1)?],
            crop: obj.bbox.crop_rect(data.width, data.height),
        };

        let ticket = self.pool.pick_up_ticket(false);
        let view = self.pool.wait_resource_by_ticket(ticket).await?;
        if let Err(e) = self.resize_convert(&view, color_mode, &input) {
            self.pool.abandon(view)?;
            return Err(e);
        }
        self.pool.dealing_done(view)?;

        trace!(batch_idx = self.batch_idx, object = %obj.id, "submitted object to resize convert operator");
        self.batch_idx = (self.batch_idx + 1) % self.batch_size;
        Ok(())
    }

    fn resize_convert(&self, view: &SlotView<RcOpSlot>, color_mode: ColorMode, input: &ResizeConvertInput) -> Result<()> {
        if !self.pool.initialized() {
            let shape = self.model.input_shape(0)?;
            self.pool.init(ResizeConvertAttr {
                dst_w: shape.w,
                dst_h: shape.h,
                color_mode,
                core_version: self.core_version,
            })?;
        }
        view.value().op().batching_up(input)
    }
}

#[async_trait]
impl ObjBatchingStage for ResizeConvertStage {
    async fn batching(&mut self, frame: Arc<FrameInfo>, obj: Arc<InferObject>) -> Result<Option<InferTask>> {
        self.admit(&frame, &obj).await?;
        Ok(None)
    }

    /// Operators flush their own batches; this only restarts the offset count.
    fn flush(&mut self) -> Option<u32> {
        let pending = std::mem::take(&mut self.batch_idx);
        if pending == 0 {
            return None;
        }
        debug!(stage = "resize-convert", objects = pending, "flushed partial batch");
        Some(pending)
    }

    fn batch_size(&self) -> u32 {
        self.batch_size
    }

    fn batch_idx(&self) -> u32 {
        self.batch_idx
    }
}
