use crate::error::{BatchingError, Result};
use crate::frame::{CropRect, DevicePtr, FrameInfo, InferObject, PixelFormat};
use crate::model::ModelShapes;

/// Host-side preprocessing of one object into its batch offset.
///
/// `net_inputs` holds one mutable sample per model input, already positioned
/// at the object's batch index.
pub trait ObjPreproc: Send + Sync {
    fn execute(
        &self,
        net_inputs: &mut [&mut [f32]],
        model: &dyn ModelShapes,
        frame: &FrameInfo,
        obj: &InferObject,
    ) -> Result<()>;
}

/// Colour conversion performed by a [`ResizeConvertOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorMode {
    Yuv2RgbaNv12,
    Yuv2RgbaNv21,
    Yuv2AbgrNv12,
    Yuv2AbgrNv21,
}

impl ColorMode {
    /// Colour mode used to feed an RGBA model from a frame of format `fmt`.
    ///
    /// # Errors
    ///
    /// Returns [`BatchingError::UnsupportedPixelFormat`] for anything that is
    /// not semi-planar YUV.
    pub fn for_pixel_format(fmt: PixelFormat) -> Result<ColorMode> {
        match fmt {
            PixelFormat::Nv12 => Ok(ColorMode::Yuv2RgbaNv12),
            PixelFormat::Nv21 => Ok(ColorMode::Yuv2RgbaNv21),
            other => Err(BatchingError::UnsupportedPixelFormat(other)),
        }
    }
}

/// Hardware generation of the accelerator, forwarded to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoreVersion(pub u32);

/// Initialization parameters of a [`ResizeConvertOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResizeConvertAttr {
    pub dst_w: u32,
    pub dst_h: u32,
    pub color_mode: ColorMode,
    pub core_version: CoreVersion,
}

/// One object submitted to a [`ResizeConvertOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeConvertInput {
    pub src_w: u32,
    pub src_h: u32,
    pub src_stride: u32,
    /// Luma and chroma planes.
    pub planes: [DevicePtr; 2],
    pub crop: CropRect,
}

/// Stateful device operator that accumulates one object per call into an
/// internal batch and manages its own output pipelining.
///
/// Calls must arrive in order from a single producer.
pub trait ResizeConvertOp: Send {
    fn init(&mut self, attr: &ResizeConvertAttr) -> Result<()>;

    /// Attributes from the last successful [`init`](Self::init).
    fn attr(&self) -> Option<ResizeConvertAttr>;

    fn batching_up(&mut self, input: &ResizeConvertInput) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformPixelFormat {
    Nv12,
    Nv21,
    Argb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Bt601,
    Bt709,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    BiLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformPlane {
    pub addr: DevicePtr,
    pub size: u64,
}

/// Source or destination descriptor of an [`ImageTransform`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFrame {
    pub pixel_fmt: TransformPixelFormat,
    pub color_space: ColorSpace,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<TransformPlane>,
    pub strides: Vec<u32>,
    pub device_id: i32,
}

/// Region of the source to transform, in source pixels. `right` and
/// `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl From<CropRect> for Roi {
    fn from(rect: CropRect) -> Self {
        Self { left: rect.left, top: rect.top, right: rect.right(), bottom: rect.bottom() }
    }
}

/// Status code returned by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformStatus(pub i32);

impl TransformStatus {
    pub const SUCCESS: TransformStatus = TransformStatus(0);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

/// Stateless crop + resize + colour-convert of one image on the device.
pub trait ImageTransform: Send + Sync {
    fn transform(&self, dst: &TransformFrame, roi: &Roi, src: &TransformFrame, filter: Filter) -> TransformStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_mode_for_pixel_format() {
        assert_eq!(ColorMode::for_pixel_format(PixelFormat::Nv12).unwrap(), ColorMode::Yuv2RgbaNv12);
        assert_eq!(ColorMode::for_pixel_format(PixelFormat::Nv21).unwrap(), ColorMode::Yuv2RgbaNv21);
        assert!(matches!(
            ColorMode::for_pixel_format(PixelFormat::I420),
            Err(BatchingError::UnsupportedPixelFormat(PixelFormat::I420))
        ));
    }

    #[test]
    fn test_roi_from_crop() {
        let roi = Roi::from(CropRect { left: 1152, top: 432, width: 1152, height: 324 });
        assert_eq!(roi, Roi { left: 1152, top: 432, right: 2304, bottom: 756 });
    }
}
