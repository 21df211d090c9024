//! # Transform Backends
//!
//! Capabilities the batching stages call into to move one object's pixels
//! into its batch offset. The device-side ones are implemented by vendor
//! bindings outside this crate; only their contracts live here.
//!
//! * [`ObjPreproc`] - host-side preprocessing, see [`HostCropResize`]
//! * [`ResizeConvertOp`] - stateful cumulative device operator
//! * [`ImageTransform`] - stateless per-object device transform

mod core_trait;
mod host;

pub use core_trait::*;
pub use host::HostCropResize;


#[cfg(test)]
/// Recording test doubles for the device capabilities.
pub(crate) mod mock;
