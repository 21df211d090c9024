use parking_lot::{Mutex, MutexGuard};
use crate::error::{BatchingError, Result};
use crate::frame::DevicePtr;
use crate::model::{ModelShapes, TensorShape};
use super::SlotResource;

/// Rounds `x` up to the next multiple of `align`.
pub fn align_up(x: u32, align: u32) -> u32 {
    x.div_ceil(align) * align
}

/// Host destination buffer for one model input, holding a whole batch.
///
/// Every batch index owns its own lane, so objects of the same batch write
/// concurrently without contending: each lane lock is only ever taken by the
/// single task that owns that offset, and by the consumer once the batch is
/// complete.
#[derive(Debug)]
pub struct HostBatchBuffer {
    shape: TensorShape,
    lanes: Vec<Mutex<Vec<f32>>>,
}

impl HostBatchBuffer {
    pub fn new(shape: TensorShape, batch_size: u32) -> Self {
        let lanes = (0..batch_size)
            .map(|_| Mutex::new(vec![0.0; shape.sample_len()]))
            .collect();
        Self { shape, lanes }
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn batch_size(&self) -> u32 {
        self.lanes.len() as u32
    }

    /// Locks the lane of `batch_idx`.
    pub fn lane(&self, batch_idx: u32) -> Result<MutexGuard<'_, Vec<f32>>> {
        self.lanes
            .get(batch_idx as usize)
            .map(|lane| lane.lock())
            .ok_or(BatchingError::BatchIndexOutOfRange { batch_idx, batch_size: self.batch_size() })
    }

    /// Copies the first `objects` lanes into one contiguous NHWC buffer.
    pub fn to_contiguous(&self, objects: u32) -> Vec<f32> {
        self.lanes
            .iter()
            .take(objects as usize)
            .flat_map(|lane| lane.lock().clone())
            .collect()
    }
}

/// Device destination buffer for one model input, holding a whole batch.
///
/// The memory itself is owned by the caller; this only computes per-object
/// addresses. Consecutive samples are `sample_stride` bytes apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceBatchBuffer {
    base: DevicePtr,
    shape: TensorShape,
    batch_size: u32,
    sample_stride: u64,
}

impl DeviceBatchBuffer {
    pub fn new(base: DevicePtr, shape: TensorShape, batch_size: u32, sample_stride: u64) -> Self {
        Self { base, shape, batch_size, sample_stride }
    }

    /// Buffer laid out for 4-channel 8-bit samples whose rows are padded to
    /// 128 bytes, as the device scaler writes them.
    pub fn argb(base: DevicePtr, shape: TensorShape, batch_size: u32) -> Self {
        let row = u64::from(align_up(shape.w * 4, 128));
        Self::new(base, shape, batch_size, row * u64::from(shape.h))
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn sample_stride(&self) -> u64 {
        self.sample_stride
    }

    /// Total bytes covered by the buffer.
    pub fn bytes(&self) -> u64 {
        self.sample_stride * u64::from(self.batch_size)
    }

    /// Address of the sample at `batch_idx`.
    pub fn offset(&self, batch_idx: u32) -> Result<DevicePtr> {
        if batch_idx >= self.batch_size {
            return Err(BatchingError::BatchIndexOutOfRange { batch_idx, batch_size: self.batch_size });
        }
        Ok(self.base.add(self.sample_stride * u64::from(batch_idx)))
    }
}

/// Slot value holding one destination buffer per model input.
#[derive(Debug)]
pub struct BatchBuffers<T> {
    inputs: Vec<T>,
}

impl<T> BatchBuffers<T> {
    pub fn new(inputs: Vec<T>) -> Self {
        Self { inputs }
    }

    pub fn inputs(&self) -> &[T] {
        &self.inputs
    }
}

impl BatchBuffers<HostBatchBuffer> {
    /// Allocates host buffers matching every input of `model`.
    pub fn for_model(model: &dyn ModelShapes, batch_size: u32) -> Self {
        Self::new(
            model
                .input_shapes()
                .iter()
                .map(|shape| HostBatchBuffer::new(*shape, batch_size))
                .collect(),
        )
    }
}

impl<T: Send + Sync + 'static> SlotResource for BatchBuffers<T> {
    type Params = ();

    fn configure(&self, _params: &()) -> Result<()> {
        Ok(())
    }
}
