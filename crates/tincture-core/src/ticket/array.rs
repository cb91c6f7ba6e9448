//! Realized 2-D pixel buffers carried by pull tickets.

use std::any::Any;
use std::sync::Arc;

use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;

/// Row-major RGBA f32 buffer.
pub struct Array2d {
    envelope: Envelope,
    width: u32,
    height: u32,
    data: Vec<[f32; 4]>,
}

impl Array2d {
    pub fn new() -> Self {
        Self {
            envelope: Envelope::new(ObjectKind::Array),
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    /// Allocate a zeroed `width` x `height` buffer.
    pub fn allocate(width: u32, height: u32) -> Result<Self, PipelineError> {
        let mut array = Self::new();
        array.resize(width, height)?;
        Ok(array)
    }

    /// Resize to `width` x `height`, zeroing every pixel. Allocation failure
    /// is reported instead of aborting.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        let count = (width as usize)
            .checked_mul(height as usize)
            .ok_or(PipelineError::OutOfMemory { bytes: usize::MAX })?;
        self.data.clear();
        self.data
            .try_reserve_exact(count)
            .map_err(|_| PipelineError::OutOfMemory {
                bytes: count.saturating_mul(std::mem::size_of::<[f32; 4]>()),
            })?;
        self.data.resize(count, [0.0; 4]);
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| y as usize * self.width as usize + x as usize)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        self.index(x, y).map(|i| self.data[i])
    }

    pub fn set(&mut self, x: u32, y: u32, pixel: [f32; 4]) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.data[i] = pixel;
                true
            }
            None => false,
        }
    }

    pub fn row(&self, y: u32) -> Option<&[[f32; 4]]> {
        let start = self.index(0, y)?;
        Some(&self.data[start..start + self.width as usize])
    }

    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.data
    }

    pub fn pixels_mut(&mut self) -> &mut [[f32; 4]] {
        &mut self.data
    }

    /// Raw bytes of the buffer, native endian.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

impl Default for Array2d {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Array2d {
    fn clone(&self) -> Self {
        Self {
            envelope: self.envelope.duplicate(),
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        }
    }
}

impl std::fmt::Debug for Array2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array2d")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl Object for Array2d {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_zeroed() {
        let array = Array2d::allocate(3, 2).expect("allocate");
        assert_eq!(array.pixels().len(), 6);
        assert_eq!(array.get(2, 1), Some([0.0; 4]));
        assert_eq!(array.get(3, 0), None);
        assert_eq!(array.as_bytes().len(), 6 * 16);
    }

    #[test]
    fn test_set_and_rows() {
        let mut array = Array2d::allocate(2, 2).expect("allocate");
        assert!(array.set(1, 1, [1.0, 0.5, 0.25, 1.0]));
        assert!(!array.set(2, 0, [1.0; 4]));
        let row = array.row(1).expect("row 1");
        assert_eq!(row[1], [1.0, 0.5, 0.25, 1.0]);
        assert!(array.row(2).is_none());
    }

    #[test]
    fn test_oversized_request_fails_cleanly() {
        let mut array = Array2d::new();
        let result = array.resize(u32::MAX, u32::MAX);
        assert!(matches!(result, Err(PipelineError::OutOfMemory { .. })));
        assert!(array.is_empty());
    }
}
