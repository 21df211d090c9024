use parking_lot::{Mutex, MutexGuard};
use crate::backend::{ResizeConvertAttr, ResizeConvertOp};
use crate::error::Result;
use super::SlotResource;

/// Slot value wrapping one stateful resize-convert operator.
///
/// The lock is only there to satisfy `Sync`; the operator is driven by a
/// single producer, so it is never contended.
pub struct RcOpSlot {
    op: Mutex<Box<dyn ResizeConvertOp>>,
}

impl RcOpSlot {
    pub fn new(op: impl ResizeConvertOp + 'static) -> Self {
        Self { op: Mutex::new(Box::new(op)) }
    }

    pub fn op(&self) -> MutexGuard<'_, Box<dyn ResizeConvertOp>> {
        self.op.lock()
    }

    /// Attributes the operator was initialized with.
    pub fn attr(&self) -> Option<ResizeConvertAttr> {
        self.op.lock().attr()
    }
}

impl SlotResource for RcOpSlot {
    type Params = ResizeConvertAttr;

    fn configure(&self, params: &ResizeConvertAttr) -> Result<()> {
        self.op.lock().init(params)
    }
}
