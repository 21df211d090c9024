use std::sync::Arc;
use parking_lot::Mutex;
use crate::error::{BatchingError, Result};
use crate::frame::{FrameInfo, InferObject};
use crate::model::ModelShapes;
use super::{
    Filter, ImageTransform, ObjPreproc, ResizeConvertAttr, ResizeConvertInput, ResizeConvertOp, Roi,
    TransformFrame, TransformStatus,
};

/// Arguments of one [`ImageTransform::transform`] call.
#[derive(Debug, Clone)]
pub struct TransformCall {
    pub dst: TransformFrame,
    pub roi: Roi,
    pub src: TransformFrame,
    pub filter: Filter,
}

/// Records every call and answers with a fixed status.
#[derive(Debug)]
pub struct MockTransform {
    pub status: TransformStatus,
    pub calls: Mutex<Vec<TransformCall>>,
}

impl MockTransform {
    pub fn new(status: TransformStatus) -> Self {
        Self { status, calls: Mutex::new(vec![]) }
    }
}

impl ImageTransform for MockTransform {
    fn transform(&self, dst: &TransformFrame, roi: &Roi, src: &TransformFrame, filter: Filter) -> TransformStatus {
        self.calls.lock().push(TransformCall { dst: dst.clone(), roi: *roi, src: src.clone(), filter });
        self.status
    }
}

/// Everything a [`MockResizeConvert`] saw, shared with the test.
#[derive(Debug, Default)]
pub struct ResizeConvertLog {
    pub inits: Vec<ResizeConvertAttr>,
    pub inputs: Vec<ResizeConvertInput>,
}

#[derive(Debug)]
pub struct MockResizeConvert {
    attr: Option<ResizeConvertAttr>,
    log: Arc<Mutex<ResizeConvertLog>>,
    fail_batching: bool,
}

impl MockResizeConvert {
    pub fn new(log: Arc<Mutex<ResizeConvertLog>>) -> Self {
        Self { attr: None, log, fail_batching: false }
    }

    pub fn failing(log: Arc<Mutex<ResizeConvertLog>>) -> Self {
        Self { attr: None, log, fail_batching: true }
    }
}

impl ResizeConvertOp for MockResizeConvert {
    fn init(&mut self, attr: &ResizeConvertAttr) -> Result<()> {
        self.attr = Some(*attr);
        self.log.lock().inits.push(*attr);
        Ok(())
    }

    fn attr(&self) -> Option<ResizeConvertAttr> {
        self.attr
    }

    fn batching_up(&mut self, input: &ResizeConvertInput) -> Result<()> {
        if self.fail_batching {
            return Err(BatchingError::TransformFailed(-1));
        }
        self.log.lock().inputs.push(*input);
        Ok(())
    }
}

/// Fills every value of every input with the object's score, or fails when
/// the score is negative.
#[derive(Debug, Default)]
pub struct FillPreproc;

impl ObjPreproc for FillPreproc {
    fn execute(
        &self,
        net_inputs: &mut [&mut [f32]],
        _model: &dyn ModelShapes,
        _frame: &FrameInfo,
        obj: &InferObject,
    ) -> Result<()> {
        if obj.score < 0.0 {
            return Err(BatchingError::Preprocess(format!("object {} has a negative score", obj.id)));
        }
        for input in net_inputs.iter_mut() {
            input.fill(obj.score);
        }
        Ok(())
    }
}
