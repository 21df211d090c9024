//! # Frames and detected objects
//!
//! The upstream pipeline owns decoding; this module only describes what the
//! batching stages need to see of a frame and of the objects detected in it.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::error::{BatchingError, Result};

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Semi-planar YUV 4:2:0, interleaved UV plane.
    Nv12,
    /// Semi-planar YUV 4:2:0, interleaved VU plane.
    Nv21,
    /// Planar YUV 4:2:0.
    I420,
    /// Packed 8-bit RGB.
    Rgb24,
    /// Packed 8-bit BGR.
    Bgr24,
}

impl PixelFormat {
    /// Number of planes a frame of this format carries.
    pub fn planes(&self) -> usize {
        match self {
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
            PixelFormat::I420 => 3,
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => 1,
        }
    }
}

/// Opaque address of accelerator memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(pub u64);

impl DevicePtr {
    /// Returns the address `bytes` past this one.
    pub fn add(self, bytes: u64) -> DevicePtr {
        DevicePtr(self.0 + bytes)
    }
}

/// Where a plane's bytes live.
#[derive(Debug, Clone)]
pub enum PlaneMemory {
    Host(Arc<[u8]>),
    Device(DevicePtr),
}

/// One image plane.
#[derive(Debug, Clone)]
pub struct Plane {
    pub memory: PlaneMemory,
    /// Plane size in bytes.
    pub bytes: usize,
}

impl Plane {
    pub fn host(data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self { bytes: data.len(), memory: PlaneMemory::Host(data) }
    }

    pub fn device(ptr: DevicePtr, bytes: usize) -> Self {
        Self { memory: PlaneMemory::Device(ptr), bytes }
    }
}

/// A decoded frame as seen by the batching stages.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub fmt: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes, one entry per plane.
    pub stride: Vec<u32>,
    pub planes: Vec<Plane>,
    pub device_id: i32,
}

impl DataFrame {
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> Result<&Plane> {
        self.planes.get(index).ok_or(BatchingError::MissingPlane {
            index,
            available: self.planes.len(),
        })
    }

    pub fn plane_bytes(&self, index: usize) -> Result<usize> {
        Ok(self.plane(index)?.bytes)
    }

    pub fn stride(&self, index: usize) -> Result<u32> {
        self.stride.get(index).copied().ok_or(BatchingError::MissingPlane {
            index,
            available: self.stride.len(),
        })
    }

    /// Host bytes of plane `index`.
    pub fn host_plane(&self, index: usize) -> Result<&[u8]> {
        match &self.plane(index)?.memory {
            PlaneMemory::Host(data) => Ok(data),
            PlaneMemory::Device(_) => Err(BatchingError::WrongPlaneMemory { index, expected: "host" }),
        }
    }

    /// Device address of plane `index`.
    pub fn device_plane(&self, index: usize) -> Result<DevicePtr> {
        match &self.plane(index)?.memory {
            PlaneMemory::Device(ptr) => Ok(*ptr),
            PlaneMemory::Host(_) => Err(BatchingError::WrongPlaneMemory { index, expected: "device" }),
        }
    }
}

/// Per-frame envelope handed down the pipeline.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub stream_id: String,
    pub frame_id: u64,
    pub frame: DataFrame,
}

/// Normalized bounding box. Values are fractions of the frame size and are
/// not guaranteed to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Scales the box to a `width` x `height` frame.
    ///
    /// Each edge is computed in `f64` from the box edges (`x`, `x + w`, `y`,
    /// `y + h`) and rounded half away from zero, so the right and bottom
    /// edges carry a single rounding. Out-of-range boxes produce out-of-range
    /// rectangles; rejecting them is left to whoever consumes the rectangle.
    pub fn crop_rect(&self, width: u32, height: u32) -> CropRect {
        let scale = |v: f64, extent: u32| (v * f64::from(extent)).round() as i32;
        let (x, y) = (f64::from(self.x), f64::from(self.y));
        let left = scale(x, width);
        let top = scale(y, height);
        let right = scale(x + f64::from(self.w), width);
        let bottom = scale(y + f64::from(self.h), height);
        CropRect {
            left,
            top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

/// Crop rectangle in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl CropRect {
    pub fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }

    /// Intersects the rectangle with a `width` x `height` frame, returning
    /// `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<CropRect> {
        let max_w = i32::try_from(width).unwrap_or(i32::MAX);
        let max_h = i32::try_from(height).unwrap_or(i32::MAX);
        let left = self.left.clamp(0, max_w);
        let top = self.top.clamp(0, max_h);
        let right = self.right().clamp(0, max_w);
        let bottom = self.bottom().clamp(0, max_h);
        if right <= left || bottom <= top {
            return None;
        }
        Some(CropRect { left, top, width: right - left, height: bottom - top })
    }
}

/// A detection produced upstream.
#[derive(Debug, Clone, Default)]
pub struct InferObject {
    pub id: String,
    pub label: i32,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl InferObject {
    pub fn with_bbox(bbox: BoundingBox) -> Self {
        Self { bbox, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_rect_full_hd() {
        let rect = BoundingBox::new(0.6, 0.4, 0.6, 0.3).crop_rect(1920, 1080);
        assert_eq!(rect, CropRect { left: 1152, top: 432, width: 1152, height: 324 });
        assert_eq!(rect.right(), 2304);
        assert_eq!(rect.bottom(), 756);
    }

    #[test]
    fn test_crop_rect_negative_does_not_panic() {
        let rect = BoundingBox::new(0.1, -0.2, 0.3, 0.4).crop_rect(1920, 1080);
        assert_eq!(rect, CropRect { left: 192, top: -216, width: 576, height: 432 });
    }

    #[test]
    fn test_crop_rect_edges_round_once() {
        let rect = BoundingBox::new(0.25, 0.25, 0.25, 0.25).crop_rect(6, 6);
        assert_eq!(rect, CropRect { left: 2, top: 2, width: 1, height: 1 });
        assert_eq!((rect.right(), rect.bottom()), (3, 3));
    }

    #[test]
    fn test_crop_rect_huge_values_saturate() {
        let rect = BoundingBox::new(f32::MAX, 1e12, -1e12, 0.0).crop_rect(1920, 1080);
        assert_eq!(rect.left, i32::MAX);
        assert_eq!(rect.top, i32::MAX);
        assert_eq!(rect.width, 0);
        assert_eq!(rect.right(), i32::MAX);

        let rect = BoundingBox::new(-1e12, 0.0, 1e12, f32::MAX).crop_rect(1920, 1080);
        assert_eq!(rect.left, i32::MIN);
        assert_eq!(rect.width, i32::MAX);
        assert_eq!(rect.height, i32::MAX);
    }

    #[test]
    fn test_clamp_to() {
        let rect = CropRect { left: 192, top: -216, width: 576, height: 432 };
        assert_eq!(
            rect.clamp_to(1920, 1080),
            Some(CropRect { left: 192, top: 0, width: 576, height: 216 })
        );
        let outside = CropRect { left: 2000, top: 0, width: 10, height: 10 };
        assert_eq!(outside.clamp_to(1920, 1080), None);
    }

    #[test]
    fn test_plane_access() {
        let frame = DataFrame {
            fmt: PixelFormat::Nv12,
            width: 4,
            height: 2,
            stride: vec![4, 4],
            planes: vec![Plane::device(DevicePtr(0x1000), 8), Plane::host(vec![0u8; 4])],
            device_id: 0,
        };
        assert_eq!(frame.device_plane(0).unwrap(), DevicePtr(0x1000));
        assert!(matches!(
            frame.device_plane(1),
            Err(BatchingError::WrongPlaneMemory { index: 1, .. })
        ));
        assert!(matches!(
            frame.plane_bytes(2),
            Err(BatchingError::MissingPlane { index: 2, available: 2 })
        ));
        assert_eq!(frame.host_plane(1).unwrap().len(), 4);
    }
}
