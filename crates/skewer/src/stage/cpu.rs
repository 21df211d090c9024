use std::sync::Arc;
use crate::backend::ObjPreproc;
use crate::config::StageConfig;
use crate::error::Result;
use crate::frame::{FrameInfo, InferObject};
use crate::model::ModelShapes;
use crate::resource::{BatchBuffers, FilledSlots, HostBatchBuffer, SlotPool};
use super::core_trait::ObjectProcessor;
use super::io::IoObjBatchingStage;

/// Host preprocessing of one object: locks the object's lane in every model
/// input buffer and hands them to an [`ObjPreproc`].
pub struct CpuPreprocessing {
    model: Arc<dyn ModelShapes>,
    preprocessor: Arc<dyn ObjPreproc>,
}

impl CpuPreprocessing {
    pub fn new(model: Arc<dyn ModelShapes>, preprocessor: Arc<dyn ObjPreproc>) -> Self {
        Self { model, preprocessor }
    }
}

impl ObjectProcessor for CpuPreprocessing {
    type Buffer = HostBatchBuffer;

    fn name(&self) -> &'static str {
        "cpu-preprocessing"
    }

    fn process_one_object(
        &self,
        frame: &FrameInfo,
        obj: &InferObject,
        batch_idx: u32,
        value: &BatchBuffers<HostBatchBuffer>,
    ) -> Result<()> {
        let mut lanes = value
            .inputs()
            .iter()
            .map(|input| input.lane(batch_idx))
            .collect::<Result<Vec<_>>>()?;
        let mut net_inputs: Vec<&mut [f32]> = lanes.iter_mut().map(|lane| lane.as_mut_slice()).collect();
        self.preprocessor.execute(&mut net_inputs, self.model.as_ref(), frame, obj)
    }
}

/// Deferred stage preprocessing objects on the host.
pub type CpuPreprocessingStage = IoObjBatchingStage<CpuPreprocessing>;

impl IoObjBatchingStage<CpuPreprocessing> {
    /// Allocates `config.pool_depth` slots of host buffers sized for `model`
    /// and builds a stage over them.
    ///
    /// # Returns
    ///
    /// The stage and the stream completed batches are delivered on.
    pub fn with_host_buffers(
        model: Arc<dyn ModelShapes>,
        preprocessor: Arc<dyn ObjPreproc>,
        config: &StageConfig,
    ) -> Result<(Self, FilledSlots<BatchBuffers<HostBatchBuffer>>)> {
        config.validate()?;
        let slots = (0..config.pool_depth)
            .map(|_| BatchBuffers::for_model(model.as_ref(), config.batch_size))
            .collect();
        let (pool, filled) = SlotPool::with_consumer(slots)?;
        let stage = Self::new(CpuPreprocessing::new(model, preprocessor), config.batch_size, pool)?;
        Ok((stage, filled))
    }
}
