//! # Object Batching Stages
//!
//! Stages admit detected objects one at a time and place each one at the
//! next offset of the batch being assembled in a [`SlotPool`](crate::resource::SlotPool).
//!
//! Three variants are provided:
//!
//! * [`CpuPreprocessingStage`] - deferred, host-side preprocessing into host buffers
//! * [`ScalerStage`] - deferred, stateless device transform into device buffers
//! * [`ResizeConvertStage`] - synchronous, feeds stateful device operators
//!
//! The deferred variants share [`IoObjBatchingStage`] and differ only in the
//! [`ObjectProcessor`] that writes a single object.

mod core_trait;
mod cpu;
mod io;
mod resize_convert;
mod scaler;

pub use core_trait::{ObjBatchingStage, ObjectProcessor};
pub use cpu::{CpuPreprocessing, CpuPreprocessingStage};
pub use io::IoObjBatchingStage;
pub use resize_convert::ResizeConvertStage;
pub use scaler::{Scaler, ScalerStage};
