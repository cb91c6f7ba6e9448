//! A configured pipeline: the input and output stage handles of a graph.

use std::any::Any;
use std::sync::{Arc, Weak};

use crate::cache::ObjectCache;
use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;
use crate::ticket::{PixelAccess, Progress};

use super::stage::Stage;
use super::traversal::{Direction, Graph, build_graph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionState {
    /// No stage attached yet.
    Unbuilt,
    Built,
    Released,
}

/// What a release pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Stages reachable from the conversion when it was released.
    pub visited: usize,
    /// Ids of stages freed by the release.
    pub released: Vec<u32>,
    /// Ids of stages still alive through references held elsewhere.
    pub retained: Vec<u32>,
}

/// Result of driving a ticket to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    /// Pull requests issued at the output stage.
    pub passes: usize,
    /// Outcome of the last pass.
    pub last: Progress,
}

pub struct Conversion {
    envelope: Envelope,
    input: Option<Arc<Stage>>,
    output: Option<Arc<Stage>>,
    released: bool,
}

impl Conversion {
    pub fn new() -> Self {
        Self {
            envelope: Envelope::new(ObjectKind::Conversion),
            input: None,
            output: None,
            released: false,
        }
    }

    pub fn from_stages(input: Arc<Stage>, output: Arc<Stage>) -> Self {
        let mut conversion = Self::new();
        conversion.input = Some(input);
        conversion.output = Some(output);
        conversion
    }

    pub fn id(&self) -> u32 {
        self.envelope.id()
    }

    pub fn set_input(&mut self, stage: Arc<Stage>) {
        self.input = Some(stage);
        self.released = false;
    }

    pub fn set_output(&mut self, stage: Arc<Stage>) {
        self.output = Some(stage);
        self.released = false;
    }

    pub fn input(&self) -> Option<&Arc<Stage>> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Arc<Stage>> {
        self.output.as_ref()
    }

    pub fn state(&self) -> ConversionState {
        if self.released {
            ConversionState::Released
        } else if self.input.is_none() && self.output.is_none() {
            ConversionState::Unbuilt
        } else {
            ConversionState::Built
        }
    }

    /// Graph reachable from the input stage, or the output stage if there is
    /// no input.
    pub fn graph(&self, direction: Direction) -> Option<Graph> {
        let start = self.input.as_ref().or(self.output.as_ref())?;
        Some(build_graph(start, direction))
    }

    /// Issue one pull request at the output stage.
    pub fn run_pixels(
        &self,
        cache: &mut ObjectCache,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        let output = self.output.as_ref().ok_or(PipelineError::MissingStage("output"))?;
        output.run(0, None, cache, ticket)
    }

    /// Pull repeatedly until the ticket is exhausted or nothing upstream
    /// makes progress. `on_batch` sees the ticket after every serviced batch.
    pub fn render(
        &self,
        cache: &mut ObjectCache,
        ticket: &mut PixelAccess,
        max_passes: usize,
        mut on_batch: impl FnMut(&PixelAccess),
    ) -> Result<RenderSummary, PipelineError> {
        let mut passes = 0;
        let mut last = Progress::Unchanged;
        while passes < max_passes {
            last = self.run_pixels(cache, ticket)?;
            passes += 1;
            if last != Progress::Advanced {
                break;
            }
            on_batch(ticket);
        }
        if last == Progress::Advanced {
            tracing::warn!(
                conversion = self.id(),
                passes,
                "render stopped at the pass limit before the region was exhausted"
            );
        }
        Ok(RenderSummary { passes, last })
    }

    /// Drop the conversion's stage handles and report which stages were
    /// freed. A second call is a no-op.
    pub fn release(&mut self) -> ReleaseReport {
        if self.released {
            return ReleaseReport::default();
        }
        self.released = true;
        let Some(graph) = self.graph(Direction::All) else {
            return ReleaseReport::default();
        };

        let watched: Vec<(u32, Weak<Stage>)> = graph
            .nodes()
            .iter()
            .map(|n| (n.id(), Arc::downgrade(n)))
            .collect();
        let visited = graph.len();
        drop(graph);
        self.input = None;
        self.output = None;

        let mut report = ReleaseReport {
            visited,
            ..ReleaseReport::default()
        };
        for (id, weak) in watched {
            if weak.strong_count() == 0 {
                report.released.push(id);
            } else {
                report.retained.push(id);
            }
        }
        tracing::debug!(
            conversion = self.id(),
            visited = report.visited,
            released = report.released.len(),
            retained = report.retained.len(),
            "conversion released"
        );
        report
    }
}

impl Default for Conversion {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Conversion {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Conversion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversion")
            .field("id", &self.id())
            .field("input", &self.input.as_ref().map(|s| s.id()))
            .field("output", &self.output.as_ref().map(|s| s.id()))
            .field("state", &self.state())
            .finish()
    }
}

impl Object for Conversion {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Release the conversion behind `handle` and clear the handle. Releasing
/// an empty handle does nothing.
pub fn release_pipeline(handle: &mut Option<Conversion>) -> ReleaseReport {
    match handle.take() {
        Some(mut conversion) => conversion.release(),
        None => ReleaseReport::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::connect;
    use crate::image::Image;
    use crate::testing::{pass_stage, root_stage, sink_stage};

    fn pipeline() -> Conversion {
        let root = root_stage();
        let pass = pass_stage();
        let sink = sink_stage();
        connect(&pass.plug(0).expect("plug"), &root.socket(0).expect("socket")).expect("root");
        connect(&sink.plug(0).expect("plug"), &pass.socket(0).expect("socket")).expect("pass");
        root.set_data(0, Arc::new(Image::filled(3, 2, [0.25; 4])))
            .expect("image");
        Conversion::from_stages(root, sink)
    }

    #[test]
    fn test_release_frees_every_stage() {
        let mut handle = Some(pipeline());
        assert_eq!(handle.as_ref().map(Conversion::state), Some(ConversionState::Built));
        let report = release_pipeline(&mut handle);
        assert!(handle.is_none());
        assert_eq!(report.visited, 3);
        assert_eq!(report.released.len(), 3);
        assert!(report.retained.is_empty());

        assert_eq!(release_pipeline(&mut handle), ReleaseReport::default());
    }

    #[test]
    fn test_release_twice_is_noop() {
        let mut conversion = pipeline();
        assert_eq!(conversion.release().visited, 3);
        assert_eq!(conversion.state(), ConversionState::Released);
        assert_eq!(conversion.release(), ReleaseReport::default());
    }

    #[test]
    fn test_externally_held_stage_is_retained() {
        let mut conversion = pipeline();
        let kept = conversion
            .graph(Direction::All)
            .and_then(|g| g.get_node_matching(0, "//colour/pass").cloned())
            .expect("pass stage");
        let report = conversion.release();
        assert!(report.retained.contains(&kept.id()));
        // The pass stage still holds the root through its plug.
        assert_eq!(report.retained.len(), 2);
        assert_eq!(report.released.len(), 1);
        assert!(kept.plug(0).expect("plug").is_connected());
    }

    #[test]
    fn test_render_drives_ticket_to_completion() {
        let conversion = pipeline();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(None, 1);
        let mut seen = Vec::new();
        let summary = conversion
            .render(&mut cache, &mut ticket, 64, |t| {
                seen.push((t.array_origin(), t.array().get(0, 0)))
            })
            .expect("render");
        assert_eq!(summary.last, Progress::Completed);
        assert_eq!(summary.passes, 7);
        assert_eq!(seen.len(), 6);
        assert_eq!(seen[4], ([1, 1], Some([0.25; 4])));
    }

    #[test]
    fn test_run_without_output_fails() {
        let conversion = Conversion::new();
        let mut cache = ObjectCache::new();
        let mut ticket = PixelAccess::new(None, 1);
        assert_eq!(conversion.state(), ConversionState::Unbuilt);
        assert!(matches!(
            conversion.run_pixels(&mut cache, &mut ticket),
            Err(PipelineError::MissingStage("output"))
        ));
    }
}
