//! Source images served by the root stage of a pipeline.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;
use crate::ticket::{Array2d, Rectangle};

/// Supported bit depths for source images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitDepth {
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
    /// 16-bit floating point.
    F16,
    /// 32-bit floating point.
    #[default]
    F32,
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "8-bit"),
            Self::U16 => write!(f, "16-bit"),
            Self::F16 => write!(f, "16-bit float"),
            Self::F32 => write!(f, "32-bit float"),
        }
    }
}

impl From<image::ColorType> for BitDepth {
    fn from(color: image::ColorType) -> Self {
        match color {
            image::ColorType::L16
            | image::ColorType::La16
            | image::ColorType::Rgb16
            | image::ColorType::Rgba16 => Self::U16,
            image::ColorType::Rgb32F | image::ColorType::Rgba32F => Self::F32,
            _ => Self::U8,
        }
    }
}

/// Channel layout of an image or of what a connector hands over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelLayout {
    pub channels: u8,
    pub bit_depth: BitDepth,
    pub planar: bool,
    pub premultiplied: bool,
}

impl Default for PixelLayout {
    fn default() -> Self {
        Self {
            channels: 4,
            bit_depth: BitDepth::F32,
            planar: false,
            premultiplied: false,
        }
    }
}

/// Size and layout of the image a ticket renders into. Zero dimensions mean
/// the size has not been settled yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
}

impl ImageDescriptor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layout: PixelLayout::default(),
        }
    }

    pub fn is_unsized(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Pixel data stored as RGBA f32, row-major.
pub struct Image {
    envelope: Envelope,
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<[f32; 4]>,
}

impl Image {
    pub fn new(
        width: u32,
        height: u32,
        layout: PixelLayout,
        pixels: Vec<[f32; 4]>,
    ) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(PipelineError::InvalidRegion(format!(
                "{width}x{height} image needs {expected} pixels, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            envelope: Envelope::new(ObjectKind::Image),
            width,
            height,
            layout,
            pixels,
        })
    }

    /// Uniformly coloured image.
    pub fn filled(width: u32, height: u32, value: [f32; 4]) -> Self {
        Self {
            envelope: Envelope::new(ObjectKind::Image),
            width,
            height,
            layout: PixelLayout::default(),
            pixels: vec![value; width as usize * height as usize],
        }
    }

    /// Image whose pixel at `(x, y)` is `f(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [f32; 4]) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            envelope: Envelope::new(ObjectKind::Image),
            width,
            height,
            layout: PixelLayout::default(),
            pixels,
        }
    }

    /// Convert a decoded image to RGBA f32.
    pub fn from_dynamic(img: &image::DynamicImage) -> Self {
        let rgba = img.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let pixels: Vec<[f32; 4]> = rgba
            .pixels()
            .map(|p| [p.0[0], p.0[1], p.0[2], p.0[3]])
            .collect();
        Self {
            envelope: Envelope::new(ObjectKind::Image),
            width,
            height,
            layout: PixelLayout {
                bit_depth: BitDepth::from(img.color()),
                ..PixelLayout::default()
            },
            pixels,
        }
    }

    /// Decode an encoded image held in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(&img))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn descriptor(&self) -> ImageDescriptor {
        ImageDescriptor {
            width: self.width,
            height: self.height,
            layout: self.layout,
        }
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }

    pub fn get_point(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Copy the pixels covered by `region` into `array`, resizing it to the
    /// region's pixel bounds. Pixels outside the image are left zero.
    pub fn fill_array(&self, region: &Rectangle, array: &mut Array2d) -> Result<(), PipelineError> {
        let bounds = region.pixel_bounds()?;
        array.resize(bounds.width, bounds.height)?;
        for row in 0..bounds.height {
            for col in 0..bounds.width {
                let Some(pixel) = self.get_point(bounds.x + col, bounds.y + row) else {
                    continue;
                };
                array.set(col, row, pixel);
            }
        }
        Ok(())
    }
}

impl Clone for Image {
    fn clone(&self) -> Self {
        Self {
            envelope: self.envelope.duplicate(),
            width: self.width,
            height: self.height,
            layout: self.layout,
            pixels: self.pixels.clone(),
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("id", &self.envelope.id())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish()
    }
}

impl Object for Image {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn copy_object(&self) -> Option<Arc<dyn Object>> {
        Some(Arc::new(self.clone()))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
