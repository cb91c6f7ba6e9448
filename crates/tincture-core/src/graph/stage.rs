//! Pipeline stages and the plug/socket edges between them.
//!
//! A plug (input) holds a strong reference to the socket it pulls from, so
//! downstream stages keep their upstream alive. A socket (output) only keeps
//! weak back-references to its plugs.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::cache::ObjectCache;
use crate::envelope::{Envelope, Object, ObjectKind};
use crate::error::PipelineError;
use crate::image::Image;
use crate::options::{OptionEntry, Options};
use crate::registry::{FilterApi, Provider, ProviderCategory, RegistrationPath, Registry};
use crate::ticket::{PixelAccess, Progress};

use super::connector::ConnectorDescriptor;
use super::traversal::{Direction, build_graph};

struct Plug {
    descriptor: ConnectorDescriptor,
    remote: RwLock<Option<SocketRef>>,
}

struct Socket {
    descriptor: ConnectorDescriptor,
    plugs: RwLock<Vec<WeakPlugRef>>,
    data: RwLock<Option<Arc<Image>>>,
}

#[derive(Clone)]
struct WeakPlugRef {
    stage: Weak<Stage>,
    index: usize,
}

impl WeakPlugRef {
    fn upgrade(&self) -> Option<PlugRef> {
        Some(PlugRef {
            stage: self.stage.upgrade()?,
            index: self.index,
        })
    }
}

/// A node of the pipeline graph, backed by a filter provider.
pub struct Stage {
    envelope: Envelope,
    provider: Arc<Provider>,
    filter: Arc<dyn FilterApi>,
    options: RwLock<Options>,
    plugs: Vec<Plug>,
    sockets: Vec<Socket>,
}

impl Stage {
    /// Instantiate a stage from a filter provider. The stage starts with the
    /// filter's declared options.
    pub fn new(provider: Arc<Provider>) -> Result<Arc<Self>, PipelineError> {
        let filter = Arc::clone(provider.as_filter()?);
        let plugs = filter
            .plugs()
            .into_iter()
            .map(|descriptor| Plug {
                descriptor,
                remote: RwLock::new(None),
            })
            .collect();
        let sockets = filter
            .sockets()
            .into_iter()
            .map(|descriptor| Socket {
                descriptor,
                plugs: RwLock::new(Vec::new()),
                data: RwLock::new(None),
            })
            .collect();
        let stage = Arc::new(Self {
            envelope: Envelope::new(ObjectKind::Stage),
            options: RwLock::new(filter.default_options()),
            filter,
            provider,
            plugs,
            sockets,
        });
        tracing::debug!(
            stage = stage.id(),
            registration = stage.registration().as_str(),
            "created stage"
        );
        Ok(stage)
    }

    /// Instantiate the first filter provider matching `pattern`.
    pub fn from_registry(registry: &Registry, pattern: &str) -> Result<Arc<Self>, PipelineError> {
        Self::new(registry.first(pattern, ProviderCategory::Filter)?)
    }

    pub fn id(&self) -> u32 {
        self.envelope.id()
    }

    pub fn registration(&self) -> &RegistrationPath {
        self.provider.registration()
    }

    pub fn provider(&self) -> &Arc<Provider> {
        &self.provider
    }

    pub fn filter(&self) -> &Arc<dyn FilterApi> {
        &self.filter
    }

    /// Snapshot of the stage's options.
    pub fn options(&self) -> Options {
        self.options.read().clone()
    }

    pub fn replace_options(&self, options: Options) {
        *self.options.write() = options;
    }

    pub fn set_option(&self, entry: OptionEntry) -> Option<OptionEntry> {
        self.options.write().move_in(entry)
    }

    /// Run `f` with the options locked for writing.
    pub fn with_options<R>(&self, f: impl FnOnce(&mut Options) -> R) -> R {
        f(&mut self.options.write())
    }

    pub fn plug_count(&self) -> usize {
        self.plugs.len()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    fn plug_slot(&self, index: usize) -> Result<&Plug, PipelineError> {
        self.plugs.get(index).ok_or(PipelineError::PortOutOfRange {
            stage: self.id(),
            port: "plug",
            index,
        })
    }

    fn socket_slot(&self, index: usize) -> Result<&Socket, PipelineError> {
        self.sockets.get(index).ok_or(PipelineError::PortOutOfRange {
            stage: self.id(),
            port: "socket",
            index,
        })
    }

    pub fn plug(self: &Arc<Self>, index: usize) -> Result<PlugRef, PipelineError> {
        self.plug_slot(index)?;
        Ok(PlugRef {
            stage: Arc::clone(self),
            index,
        })
    }

    pub fn socket(self: &Arc<Self>, index: usize) -> Result<SocketRef, PipelineError> {
        self.socket_slot(index)?;
        Ok(SocketRef {
            stage: Arc::clone(self),
            index,
        })
    }

    pub fn plugs(self: &Arc<Self>) -> Vec<PlugRef> {
        (0..self.plugs.len())
            .map(|index| PlugRef {
                stage: Arc::clone(self),
                index,
            })
            .collect()
    }

    pub fn sockets(self: &Arc<Self>) -> Vec<SocketRef> {
        (0..self.sockets.len())
            .map(|index| SocketRef {
                stage: Arc::clone(self),
                index,
            })
            .collect()
    }

    /// Attach source pixels to a socket.
    pub fn set_data(&self, socket: usize, image: Arc<Image>) -> Result<(), PipelineError> {
        *self.socket_slot(socket)?.data.write() = Some(image);
        Ok(())
    }

    pub fn data(&self, socket: usize) -> Option<Arc<Image>> {
        self.sockets.get(socket)?.data.read().clone()
    }

    /// Whether every mandatory plug is connected.
    pub fn is_ready(&self) -> bool {
        self.plugs
            .iter()
            .all(|p| !p.descriptor.mandatory || p.remote.read().is_some())
    }

    /// Service a pull request arriving at `socket`.
    pub fn run(
        self: &Arc<Self>,
        socket: usize,
        requestor: Option<&PlugRef>,
        cache: &mut ObjectCache,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        let filter = Arc::clone(&self.filter);
        let mut ctx = RunContext {
            stage: self,
            socket,
            requestor,
            cache,
        };
        filter.run(&mut ctx, ticket)
    }

    /// Forward a pull request through plug `plug` to the stage upstream.
    /// Unconnected plugs yield [`Progress::Unchanged`].
    pub fn pull(
        self: &Arc<Self>,
        plug: usize,
        cache: &mut ObjectCache,
        ticket: &mut PixelAccess,
    ) -> Result<Progress, PipelineError> {
        let plug = self.plug(plug)?;
        let Some(remote) = plug.remote() else {
            tracing::debug!(stage = self.id(), plug = plug.index(), "pull on unconnected plug");
            return Ok(Progress::Unchanged);
        };
        remote
            .stage()
            .run(remote.index(), Some(&plug), cache, ticket)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id())
            .field("registration", &self.registration().as_str())
            .field("plugs", &self.plugs.len())
            .field("sockets", &self.sockets.len())
            .finish()
    }
}

impl Drop for Stage {
    fn drop(&mut self) {
        tracing::trace!(stage = self.id(), "dropping stage");
        self.filter.release_stage(self.id());
    }
}

impl Object for Stage {
    fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// State handed to a filter while it services a request.
pub struct RunContext<'a> {
    pub stage: &'a Arc<Stage>,
    /// Socket the request arrived at.
    pub socket: usize,
    /// Downstream plug that issued the request, if any.
    pub requestor: Option<&'a PlugRef>,
    pub cache: &'a mut ObjectCache,
}

impl RunContext<'_> {
    /// Pull from the stage upstream of plug `plug`.
    pub fn pull(&mut self, plug: usize, ticket: &mut PixelAccess) -> Result<Progress, PipelineError> {
        self.stage.pull(plug, &mut *self.cache, ticket)
    }

    pub fn options(&self) -> Options {
        self.stage.options()
    }
}

// ── Port handles ────────────────────────────────────────────────────────────

/// A stage plus plug index.
#[derive(Clone)]
pub struct PlugRef {
    stage: Arc<Stage>,
    index: usize,
}

/// A stage plus socket index.
#[derive(Clone)]
pub struct SocketRef {
    stage: Arc<Stage>,
    index: usize,
}

impl PlugRef {
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn slot(&self) -> &Plug {
        &self.stage.plugs[self.index]
    }

    pub fn descriptor(&self) -> &ConnectorDescriptor {
        &self.slot().descriptor
    }

    pub fn remote(&self) -> Option<SocketRef> {
        self.slot().remote.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.slot().remote.read().is_some()
    }
}

impl SocketRef {
    pub fn stage(&self) -> &Arc<Stage> {
        &self.stage
    }

    pub fn index(&self) -> usize {
        self.index
    }

    fn slot(&self) -> &Socket {
        &self.stage.sockets[self.index]
    }

    pub fn descriptor(&self) -> &ConnectorDescriptor {
        &self.slot().descriptor
    }

    /// Live plugs attached to this socket.
    pub fn plugs(&self) -> Vec<PlugRef> {
        self.slot()
            .plugs
            .read()
            .iter()
            .filter_map(WeakPlugRef::upgrade)
            .collect()
    }

    pub fn data(&self) -> Option<Arc<Image>> {
        self.slot().data.read().clone()
    }
}

impl PartialEq for PlugRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stage, &other.stage) && self.index == other.index
    }
}

impl PartialEq for SocketRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.stage, &other.stage) && self.index == other.index
    }
}

impl fmt::Debug for PlugRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlugRef({}:{})", self.stage.id(), self.index)
    }
}

impl fmt::Debug for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketRef({}:{})", self.stage.id(), self.index)
    }
}

// ── Edges ───────────────────────────────────────────────────────────────────

/// Connect `plug` to `socket`, replacing any previous connection of the plug.
///
/// Fails without touching either side when the connectors are incompatible
/// or the edge would close a cycle.
pub fn connect(plug: &PlugRef, socket: &SocketRef) -> Result<(), PipelineError> {
    if let Err(err) = plug.descriptor().check_compatible(socket.descriptor()) {
        tracing::debug!(
            plug = ?plug,
            socket = ?socket,
            error = %err,
            "connection refused"
        );
        return Err(err);
    }

    let downstream = plug.stage();
    let upstream = socket.stage();
    if Arc::ptr_eq(downstream, upstream)
        || build_graph(upstream, Direction::Upstream).contains(downstream.id())
    {
        return Err(PipelineError::CycleDetected {
            downstream: downstream.id(),
            upstream: upstream.id(),
        });
    }

    disconnect(plug);
    *plug.slot().remote.write() = Some(socket.clone());
    let mut plugs = socket.slot().plugs.write();
    plugs.retain(|p| p.stage.strong_count() > 0);
    plugs.push(WeakPlugRef {
        stage: Arc::downgrade(downstream),
        index: plug.index(),
    });
    tracing::trace!(plug = ?plug, socket = ?socket, "connected");
    Ok(())
}

/// Detach `plug` from its socket. Returns the socket it was attached to.
pub fn disconnect(plug: &PlugRef) -> Option<SocketRef> {
    let previous = plug.slot().remote.write().take()?;
    previous.slot().plugs.write().retain(|p| {
        p.stage.strong_count() > 0
            && !(Weak::ptr_eq(&p.stage, &Arc::downgrade(plug.stage())) && p.index == plug.index())
    });
    Some(previous)
}
