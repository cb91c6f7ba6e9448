//! Image root filter: the source stage of a pipeline.

use tincture_core::graph::{ConnectorDescriptor, RunContext};
use tincture_core::ticket::source::run_image_root;
use tincture_core::ticket::{PixelAccess, Progress};
use tincture_core::registry::FilterApi;
use tincture_core::PipelineError;

/// Serves the image attached to its single data socket.
pub struct ImageRootFilter;

impl FilterApi for ImageRootFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        Vec::new()
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("image")]
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        run_image_root(ctx, ticket)
    }
}
