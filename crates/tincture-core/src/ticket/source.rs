//! Request servicing at the root of a pipeline.

use crate::error::PipelineError;
use crate::graph::RunContext;

use super::{PixelAccess, Progress, Rectangle};

/// Service a pull request at a root stage from the image attached to the
/// requested socket.
///
/// The cursor is read before it is advanced, so the pixel sampled for a
/// single-pixel request is the one the cursor pointed at on entry. Requests
/// for more than one pixel, or landing outside the source, fill the ticket's
/// array from the region of interest mapped into source coordinates.
pub fn run_image_root(
    ctx: &mut RunContext<'_>,
    ticket: &mut PixelAccess,
) -> Result<Progress, PipelineError> {
    let Some(image) = ctx.stage.data(ctx.socket) else {
        tracing::debug!(
            stage = ctx.stage.id(),
            socket = ctx.socket,
            "no source image behind the requested socket"
        );
        return Ok(Progress::Unchanged);
    };

    if ticket.output_image().is_unsized() {
        let output = ticket.output_image_mut();
        output.width = image.width();
        output.height = image.height();
        output.layout = image.layout();
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "ticket adopted source dimensions"
        );
    }

    let [x, y] = ticket.cursor();
    let progress = ticket.next_start_pixel()?;
    if progress != Progress::Advanced {
        return Ok(progress);
    }

    if x < image.width() && y < image.height() && ticket.pixels_per_call() == 1 {
        let pixel = image
            .get_point(x, y)
            .ok_or(PipelineError::PixelUnavailable { x, y })?;
        let array = ticket.array_mut();
        array.resize(1, 1)?;
        array.set(0, 0, pixel);
        ticket.set_array_origin([x, y]);
        return Ok(progress);
    }

    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::InvalidRegion("source image is empty".into()));
    }
    let output = *ticket.output_image();
    let region = ticket.region()?;
    let mapped = source_region(
        &region,
        (output.width, output.height),
        (image.width(), image.height()),
    )?;
    let origin = region.pixel_bounds()?;
    image.fill_array(&mapped, ticket.array_mut())?;
    ticket.set_array_origin([origin.x, origin.y]);
    Ok(progress)
}

/// Region of the source image a ticket's region maps to.
pub fn source_region(
    region: &Rectangle,
    output: (u32, u32),
    source: (u32, u32),
) -> Result<Rectangle, PipelineError> {
    if output.0 == 0 || output.1 == 0 {
        return Err(PipelineError::InvalidRegion("output image is unsized".into()));
    }
    Ok(region.scaled(
        f64::from(source.0) / f64::from(output.0),
        f64::from(source.1) / f64::from(output.1),
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::ObjectCache;
    use crate::image::{Image, ImageDescriptor};
    use crate::testing::root_stage;

    fn source() -> Arc<crate::graph::Stage> {
        let stage = root_stage();
        let image = Image::from_fn(4, 2, |x, y| [x as f32, y as f32, 0.0, 1.0]);
        stage.set_data(0, Arc::new(image)).expect("attach image");
        stage
    }

    #[test]
    fn test_single_pixel_samples_pre_advance_cursor() {
        let stage = source();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(None, 1);

        assert_eq!(stage.run(0, None, &mut cache, &mut ticket).ok(), Some(Progress::Advanced));
        assert_eq!(ticket.output_image(), &ImageDescriptor::new(4, 2));
        assert_eq!(ticket.array().get(0, 0), Some([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(ticket.array_origin(), [0, 0]);
        assert_eq!(ticket.cursor(), [1, 0]);

        stage.run(0, None, &mut cache, &mut ticket).expect("second pixel");
        assert_eq!(ticket.array().get(0, 0), Some([1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_region_request_fills_array() {
        let stage = source();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(Some(Rectangle::new(1.0, 0.0, 2.0, 2.0)), 0);

        assert_eq!(stage.run(0, None, &mut cache, &mut ticket).ok(), Some(Progress::Advanced));
        let array = ticket.array();
        assert_eq!((array.width(), array.height()), (2, 2));
        assert_eq!(array.get(1, 1), Some([2.0, 1.0, 0.0, 1.0]));
        assert_eq!(ticket.array_origin(), [1, 0]);
        assert_eq!(stage.run(0, None, &mut cache, &mut ticket).ok(), Some(Progress::Completed));
    }

    #[test]
    fn test_region_maps_into_smaller_source() {
        let stage = source();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(None, 0).with_output_image(ImageDescriptor::new(8, 4));

        stage.run(0, None, &mut cache, &mut ticket).expect("run");
        let array = ticket.array();
        assert_eq!((array.width(), array.height()), (4, 2));
        assert_eq!(array.get(3, 1), Some([3.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn test_missing_image_is_unchanged() {
        let stage = root_stage();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(None, 1);
        assert_eq!(stage.run(0, None, &mut cache, &mut ticket).ok(), Some(Progress::Unchanged));
        assert_eq!(ticket.cursor(), [0, 0]);
    }

    #[test]
    fn test_source_region_helper() {
        let r = source_region(&Rectangle::new(2.0, 2.0, 4.0, 4.0), (8, 8), (4, 4))
            .expect("sized output");
        assert_eq!(r, Rectangle::new(1.0, 1.0, 2.0, 2.0));
        assert!(source_region(&r, (0, 8), (4, 4)).is_err());
    }
}
