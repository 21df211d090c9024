use std::sync::Arc;
use crate::backend::{ColorSpace, Filter, ImageTransform, Roi, TransformFrame, TransformPixelFormat, TransformPlane};
use crate::config::StageConfig;
use crate::error::{BatchingError, Result};
use crate::frame::{FrameInfo, InferObject, PixelFormat};
use crate::resource::{align_up, BatchBuffers, DeviceBatchBuffer, FilledSlots, SlotPool};
use super::core_trait::ObjectProcessor;
use super::io::IoObjBatchingStage;

/// Row alignment of ARGB destination samples, in bytes.
const DST_ROW_ALIGN: u32 = 128;

/// Crops, resizes and converts one object to ARGB with a stateless device
/// transform, straight into the object's sample of the slot's device buffer.
pub struct Scaler {
    transform: Arc<dyn ImageTransform>,
    device_id: i32,
}

impl Scaler {
    /// `device_id` is the accelerator holding the destination buffers.
    pub fn new(transform: Arc<dyn ImageTransform>, device_id: i32) -> Self {
        Self { transform, device_id }
    }

    fn source(frame: &FrameInfo) -> Result<TransformFrame> {
        let data = &frame.frame;
        let pixel_fmt = match data.fmt {
            PixelFormat::Nv12 => TransformPixelFormat::Nv12,
            PixelFormat::Nv21 => TransformPixelFormat::Nv21,
            other => return Err(BatchingError::UnsupportedPixelFormat(other)),
        };
        let planes = (0..2)
            .map(|i| {
                Ok(TransformPlane {
                    addr: data.device_plane(i)?,
                    size: data.plane_bytes(i)? as u64,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TransformFrame {
            pixel_fmt,
            color_space: ColorSpace::Bt709,
            width: data.width,
            height: data.height,
            planes,
            strides: vec![data.stride(0)?, data.stride(1)?],
            device_id: data.device_id,
        })
    }
}

impl ObjectProcessor for Scaler {
    type Buffer = DeviceBatchBuffer;

    fn name(&self) -> &'static str {
        "scaler"
    }

    fn process_one_object(
        &self,
        frame: &FrameInfo,
        obj: &InferObject,
        batch_idx: u32,
        value: &BatchBuffers<DeviceBatchBuffer>,
    ) -> Result<()> {
        let src = Self::source(frame)?;
        let buffer = value.inputs().first().ok_or(BatchingError::MissingInputShape(0))?;
        let shape = buffer.shape();
        let stride = align_up(shape.w * 4, DST_ROW_ALIGN);
        let dst = TransformFrame {
            pixel_fmt: TransformPixelFormat::Argb,
            color_space: ColorSpace::Bt709,
            width: shape.w,
            height: shape.h,
            planes: vec![TransformPlane {
                addr: buffer.offset(batch_idx)?,
                size: u64::from(stride) * u64::from(shape.h),
            }],
            strides: vec![stride],
            device_id: self.device_id,
        };
        let roi = Roi::from(obj.bbox.crop_rect(frame.frame.width, frame.frame.height));

        let status = self.transform.transform(&dst, &roi, &src, Filter::BiLinear);
        if !status.is_success() {
            return Err(BatchingError::TransformFailed(status.0));
        }
        Ok(())
    }
}

/// Deferred stage scaling objects on the device.
pub type ScalerStage = IoObjBatchingStage<Scaler>;

impl IoObjBatchingStage<Scaler> {
    /// Builds a stage with one slot per destination buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::InvalidConfig`] if a buffer holds fewer than
    /// `config.batch_size` samples, or if `buffers` is empty.
    pub fn with_device_buffers(
        transform: Arc<dyn ImageTransform>,
        buffers: Vec<DeviceBatchBuffer>,
        config: &StageConfig,
    ) -> Result<(Self, FilledSlots<BatchBuffers<DeviceBatchBuffer>>)> {
        config.validate()?;
        if let Some(small) = buffers.iter().find(|b| b.batch_size() < config.batch_size) {
            return Err(BatchingError::InvalidConfig(format!(
                "device buffer holds {} samples, batch_size is {}",
                small.batch_size(),
                config.batch_size
            )));
        }
        let slots = buffers.into_iter().map(|b| BatchBuffers::new(vec![b])).collect();
        let (pool, filled) = SlotPool::with_consumer(slots)?;
        let stage = Self::new(Scaler::new(transform, config.device_id), config.batch_size, pool)?;
        Ok((stage, filled))
    }
}
