//! ICC transform filter.
//!
//! Pulls pixels from upstream and applies a per-channel gain to the colour
//! channels. The derived transform is memoized in the object cache under the
//! stage's registration and options, so stages with identical options share
//! one instance. When a stage's options change, the slot it used before is
//! released back to the cache; it is evicted once no other stage holds it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tincture_core::cache::CacheSlot;
use tincture_core::envelope::{Envelope, Object, ObjectKind};
use tincture_core::graph::{ConnectorDescriptor, RunContext};
use tincture_core::options::{OptionEntry, OptionSource, Options};
use tincture_core::registry::FilterApi;
use tincture_core::ticket::{PixelAccess, Progress, WorkspaceId};
use tincture_core::PipelineError;

const GAIN_KEY: &str = "gain";

/// Colour-channel gain derived from a stage's options.
pub struct GainTransform {
    envelope: Envelope,
    gain: [f32; 3],
}

impl GainTransform {
    /// `gain` applies to every colour channel; `gain_r`, `gain_g` and
    /// `gain_b` override single channels.
    pub fn from_options(options: &Options) -> Self {
        let uniform = options.double(GAIN_KEY).unwrap_or(1.0) as f32;
        let channel = |key: &str| options.double(key).map_or(uniform, |v| v as f32);
        Self {
            envelope: Envelope::new(ObjectKind::Transform),
            gain: [channel("gain_r"), channel("gain_g"), channel("gain_b")],
        }
    }

    pub fn gain(&self) -> [f32; 3] {
        self.gain
    }

    pub fn is_identity(&self) -> bool {
        self.gain == [1.0; 3]
    }

    /// Scale colour channels in place. Alpha is untouched.
    pub fn apply(&self, pixels: &mut [[f32; 4]]) {
        if self.is_identity() {
            return;
        }
        for px in pixels {
            px[0] *= self.gain[0];
            px[1] *= self.gain[1];
            px[2] *= self.gain[2];
        }
    }
}

impl Object for GainTransform {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Per-workspace counters kept by a transform stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkspaceStats {
    pub batches: u64,
    pub pixels: u64,
}

#[derive(Default)]
pub struct IccTransformFilter {
    workspaces: Mutex<HashMap<(u32, WorkspaceId), WorkspaceStats>>,
    /// Cache slot each live stage last drew its transform from.
    slots: Mutex<HashMap<u32, Arc<CacheSlot>>>,
}

impl IccTransformFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters of stage `stage` for `workspace`.
    pub fn stats(&self, stage: u32, workspace: WorkspaceId) -> WorkspaceStats {
        self.workspaces
            .lock()
            .get(&(stage, workspace))
            .copied()
            .unwrap_or_default()
    }

    fn transform_for(&self, ctx: &mut RunContext<'_>) -> Result<Arc<GainTransform>, PipelineError> {
        let options = ctx.options();
        let key = format!(
            "{}:{}",
            ctx.stage.registration(),
            serde_json::to_string(&options)?
        );
        let slot = ctx.cache.get_or_create(&key);
        let previous = self.slots.lock().insert(ctx.stage.id(), Arc::clone(&slot));
        if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &slot)) {
            let stale = previous.key().clone();
            if ctx.cache.release(previous) {
                tracing::debug!(stage = ctx.stage.id(), key = %stale, "evicted stale transform");
            }
        }
        if let Some(transform) = slot.get::<GainTransform>(ObjectKind::Transform) {
            return Ok(transform);
        }

        let transform = GainTransform::from_options(&options);
        tracing::debug!(
            stage = ctx.stage.id(),
            gain = ?transform.gain(),
            "built transform"
        );
        let transform: Arc<dyn Object> = Arc::new(transform);
        slot.set(&transform);
        slot.get::<GainTransform>(ObjectKind::Transform)
            .ok_or(PipelineError::WrongType {
                expected: ObjectKind::Transform,
                found: transform.kind(),
            })
    }
}

impl FilterApi for IccTransformFilter {
    fn plugs(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("in")]
    }

    fn sockets(&self) -> Vec<ConnectorDescriptor> {
        vec![ConnectorDescriptor::data("out")]
    }

    fn default_options(&self) -> Options {
        std::iter::once(
            OptionEntry::new("org/tincture/colour/icc.transform/gain", 1.0)
                .with_source(OptionSource::Filter),
        )
        .collect()
    }

    fn run(
        &self,
        ctx: &mut RunContext<'_>,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        let progress = ctx.pull(0, ticket)?;
        if progress != Progress::Advanced {
            return Ok(progress);
        }

        let transform = self.transform_for(ctx)?;
        let pixels = ticket.array_mut().pixels_mut();
        transform.apply(pixels);

        let mut workspaces = self.workspaces.lock();
        let stats = workspaces
            .entry((ctx.stage.id(), ticket.workspace_id()))
            .or_default();
        stats.batches += 1;
        stats.pixels += ticket.array().pixels().len() as u64;
        Ok(progress)
    }

    fn release_stage(&self, stage: u32) {
        self.workspaces.lock().retain(|(owner, _), _| *owner != stage);
        self.slots.lock().remove(&stage);
    }
}
