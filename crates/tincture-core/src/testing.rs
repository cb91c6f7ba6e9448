//! Minimal providers for unit tests.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::RuntimeConfig;
use crate::error::PipelineError;
use crate::graph::{Conversion, ConnectorDescriptor, RunContext, Stage};
use crate::options::Options;
use crate::policy::{CorrectReport, CorrectSettings, DefaultsSource, correct_conversion};
use crate::registry::{FilterApi, MessageSink, PolicyApi, Provider, ProviderApi};
use crate::ticket::source::run_image_root;
use crate::ticket::{PixelAccess, Progress};

/// Serves the image attached to its socket.
pub struct RootFilter;

impl FilterApi for RootFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        Vec::new()
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("out")]
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelAccess) -> Result<Progress, PipelineError> {
        run_image_root(ctx, ticket)
    }
}

/// Forwards requests upstream unchanged.
pub struct PassFilter {
    sockets: Vec<ConnectorDescriptor>,
}

impl PassFilter {
    pub fn data() -> Self {
        Self {
            sockets: vec![ConnectorDescriptor::data("out")],
        }
    }

    pub fn with_control() -> Self {
        Self {
            sockets: vec![
                ConnectorDescriptor::data("out"),
                ConnectorDescriptor::control("ctl"),
            ],
        }
    }
}

impl FilterApi for PassFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("in")]
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        self.sockets.clone()
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelAccess) -> Result<Progress, PipelineError> {
        ctx.pull(0, ticket)
    }
}

/// Terminal stage: data plug, control plug and an optional second data plug.
pub struct SinkFilter;

impl FilterApi for SinkFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        vec![
            ConnectorDescriptor::data("in"),
            ConnectorDescriptor::control("ctl"),
            ConnectorDescriptor::data("aux").optional(),
        ]
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        Vec::new()
    }

    fn run(&self, ctx: &mut RunContext<'_>, ticket: &mut PixelAccess) -> Result<Progress, PipelineError> {
        ctx.pull(0, ticket)
    }
}

#[derive(Default)]
pub struct TestPolicy {
    sink: RwLock<Option<MessageSink>>,
}

impl PolicyApi for TestPolicy {
    fn set_message_sink(&self, sink: MessageSink) {
        *self.sink.write() = Some(sink);
    }

    fn validate_options(&self, _options: &Options) -> Result<(), PipelineError> {
        Ok(())
    }

    fn default_options(&self) -> Options {
        Options::new()
    }

    fn ui_text(&self, _options: &Options) -> String {
        String::new()
    }

    fn correct_graph(
        &self,
        conversion: &Conversion,
        options: &Options,
        defaults: &dyn DefaultsSource,
        config: &RuntimeConfig,
    ) -> Result<CorrectReport, PipelineError> {
        let settings = CorrectSettings::for_config("//colour/icc", config);
        correct_conversion(conversion, options, &Options::new(), defaults, &settings)
    }
}

fn stage(registration: &str, filter: Arc<dyn FilterApi>) -> Arc<Stage> {
    let provider = Provider::new(registration, [0, 0, 1], ProviderApi::Filter(filter));
    Stage::new(Arc::new(provider)).expect("filter provider")
}

pub fn root_stage() -> Arc<Stage> {
    stage("org/test/colour/root.image", Arc::new(RootFilter))
}

pub fn pass_stage() -> Arc<Stage> {
    stage("org/test/colour/pass", Arc::new(PassFilter::data()))
}

pub fn icc_stage() -> Arc<Stage> {
    stage("org/test/colour/icc.pass", Arc::new(PassFilter::with_control()))
}

pub fn sink_stage() -> Arc<Stage> {
    stage("org/test/colour/sink", Arc::new(SinkFilter))
}
