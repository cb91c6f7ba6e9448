//! Pull tickets: the per-request state threaded through a pipeline run.
//!
//! A [`PixelAccess`] names the region being rendered, the cursor of the next
//! batch, how many pixels each call services and the buffer the source fills.
//! Stages pass the ticket upstream; the root stage reads the cursor, advances
//! it and realizes pixels into the ticket's array.

mod array;
mod rectangle;
pub mod source;

use std::any::Any;
use std::sync::Arc;

pub use array::Array2d;
pub use rectangle::{PixelBounds, Rectangle};

use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;
use crate::image::ImageDescriptor;

/// Identifies the caller-side workspace a ticket renders for.
pub type WorkspaceId = i32;

/// Outcome of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// A batch was serviced.
    Advanced,
    /// The region was already exhausted; nothing moved.
    Completed,
    /// Nothing upstream could service the request.
    Unchanged,
}

pub struct PixelAccess {
    envelope: Envelope,
    cursor: [u32; 2],
    roi: Option<Rectangle>,
    pixels_per_call: usize,
    array: Array2d,
    array_origin: [u32; 2],
    output_image: ImageDescriptor,
    workspace_id: WorkspaceId,
    exhausted: bool,
}

impl PixelAccess {
    /// Ticket over `roi`, or over the whole output image when `roi` is `None`.
    /// A `pixels_per_call` of zero services the whole region in one call.
    pub fn new(roi: Option<Rectangle>, pixels_per_call: usize) -> Self {
        let mut ticket = Self {
            envelope: Envelope::new(ObjectKind::Ticket),
            cursor: [0, 0],
            roi: None,
            pixels_per_call,
            array: Array2d::new(),
            array_origin: [0, 0],
            output_image: ImageDescriptor::default(),
            workspace_id: 0,
            exhausted: false,
        };
        ticket.set_roi(roi);
        ticket
    }

    /// Ticket rendering all of `output` in one call.
    pub fn for_image(output: ImageDescriptor) -> Self {
        Self::new(None, 0).with_output_image(output)
    }

    pub fn with_output_image(mut self, output: ImageDescriptor) -> Self {
        self.output_image = output;
        self
    }

    pub fn with_workspace(mut self, workspace_id: WorkspaceId) -> Self {
        self.workspace_id = workspace_id;
        self
    }

    pub fn id(&self) -> u32 {
        self.envelope.id()
    }

    pub fn cursor(&self) -> [u32; 2] {
        self.cursor
    }

    pub fn roi(&self) -> Option<Rectangle> {
        self.roi
    }

    /// Replace the region and rewind the cursor to its origin.
    pub fn set_roi(&mut self, roi: Option<Rectangle>) {
        self.roi = roi;
        self.rewind();
    }

    /// Rewind the cursor so the region is rendered again.
    pub fn rewind(&mut self) {
        self.cursor = match self.roi.map(|r| r.pixel_bounds()) {
            Some(Ok(bounds)) => [bounds.x, bounds.y],
            _ => [0, 0],
        };
        self.exhausted = false;
    }

    /// The region as a rectangle in output-image pixels.
    pub fn region(&self) -> Result<Rectangle, PipelineError> {
        match self.roi {
            Some(roi) => Ok(roi),
            None if self.output_image.is_unsized() => Err(PipelineError::InvalidRegion(
                "no region and no output image size".into(),
            )),
            None => Ok(Rectangle::from_size(
                self.output_image.width,
                self.output_image.height,
            )),
        }
    }

    pub fn pixels_per_call(&self) -> usize {
        self.pixels_per_call
    }

    pub fn set_pixels_per_call(&mut self, pixels: usize) {
        self.pixels_per_call = pixels;
    }

    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    pub fn output_image(&self) -> &ImageDescriptor {
        &self.output_image
    }

    pub fn output_image_mut(&mut self) -> &mut ImageDescriptor {
        &mut self.output_image
    }

    pub fn array(&self) -> &Array2d {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Array2d {
        &mut self.array
    }

    /// Output-image position of the array's first pixel.
    pub fn array_origin(&self) -> [u32; 2] {
        self.array_origin
    }

    pub fn set_array_origin(&mut self, origin: [u32; 2]) {
        self.array_origin = origin;
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance the cursor past the batch starting at the current position.
    ///
    /// Moves in raster order over the region, `pixels_per_call` pixels at a
    /// time. The call that consumes the last batch marks the ticket exhausted
    /// and leaves the cursor in place; later calls return
    /// [`Progress::Completed`] without moving.
    pub fn next_start_pixel(&mut self) -> Result<Progress, PipelineError> {
        if self.exhausted {
            return Ok(Progress::Completed);
        }
        let bounds = self.region()?.pixel_bounds()?;
        let [x, y] = self.cursor;
        if !bounds.contains(x, y) {
            return Err(PipelineError::InvalidRegion(format!(
                "cursor ({x}, {y}) outside {}x{} region at ({}, {})",
                bounds.width, bounds.height, bounds.x, bounds.y
            )));
        }

        let area = bounds.area();
        let step = match self.pixels_per_call {
            0 => area,
            n => n as u64,
        };
        let width = u64::from(bounds.width);
        let index = u64::from(y - bounds.y) * width + u64::from(x - bounds.x);
        let next = index + step;
        if next >= area {
            self.exhausted = true;
            tracing::trace!(ticket = self.id(), "region exhausted");
        } else {
            self.cursor = [
                bounds.x + (next % width) as u32,
                bounds.y + (next / width) as u32,
            ];
        }
        Ok(Progress::Advanced)
    }
}

impl std::fmt::Debug for PixelAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelAccess")
            .field("id", &self.envelope.id())
            .field("cursor", &self.cursor)
            .field("roi", &self.roi)
            .field("pixels_per_call", &self.pixels_per_call)
            .field("workspace_id", &self.workspace_id)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl Object for PixelAccess {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
