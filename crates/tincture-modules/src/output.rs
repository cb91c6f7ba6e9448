//! Output filter: the sink stage a conversion is rendered through.

use tincture_core::graph::{ConnectorDescriptor, RunContext};
use tincture_core::registry::FilterApi;
use tincture_core::ticket::{PixelAccess, Progress};
use tincture_core::PipelineError;

pub struct OutputFilter;

impl FilterApi for OutputFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("image")]
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        Vec::new()
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        if !ctx.stage.is_ready() {
            tracing::warn!(stage = ctx.stage.id(), "output stage has no input");
            return Ok(Progress::Unchanged);
        }
        let progress = ctx.pull(0, ticket)?;
        if progress == Progress::Advanced {
            tracing::trace!(
                stage = ctx.stage.id(),
                origin = ?ticket.array_origin(),
                width = ticket.array().width(),
                height = ticket.array().height(),
                "batch delivered"
            );
        }
        Ok(progress)
    }
}
