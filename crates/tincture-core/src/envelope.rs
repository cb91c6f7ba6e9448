//! Capability envelope embedded in every runtime entity.
//!
//! The envelope carries the entity's discriminant, a process-unique id and
//! lazily filled name and digest caches. Ownership and the reference count
//! live in the `Arc` wrapping the entity; [`ref_count`] exposes the count for
//! release bookkeeping and diagnostics.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Discriminant of every entity the runtime hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A pipeline stage (graph node).
    Stage,
    /// A configured pipeline.
    Conversion,
    /// A pull ticket.
    Ticket,
    /// A cache slot.
    CacheSlot,
    /// A registered transform provider.
    Provider,
    /// A source image.
    Image,
    /// A realized 2-D pixel buffer.
    Array,
    /// A loaded colour profile payload.
    Profile,
    /// A derived transform memoized by a stage.
    Transform,
    /// Provider-defined payload.
    Custom(&'static str),
}

impl ObjectKind {
    /// Short label used in logs and error messages.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Conversion => "conversion",
            Self::Ticket => "ticket",
            Self::CacheSlot => "cache slot",
            Self::Provider => "provider",
            Self::Image => "image",
            Self::Array => "array",
            Self::Profile => "profile",
            Self::Transform => "transform",
            Self::Custom(name) => *name,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which of the three cached names to read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Nick,
    Name,
    Description,
}

#[derive(Debug, Clone, Default)]
struct Names {
    nick: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

impl Names {
    fn get(&self, which: NameKind) -> Option<&String> {
        match which {
            NameKind::Nick => self.nick.as_ref(),
            NameKind::Name => self.name.as_ref(),
            NameKind::Description => self.description.as_ref(),
        }
    }

    fn slot(&mut self, which: NameKind) -> &mut Option<String> {
        match which {
            NameKind::Nick => &mut self.nick,
            NameKind::Name => &mut self.name,
            NameKind::Description => &mut self.description,
        }
    }
}

/// Shared lifecycle header of a runtime entity.
pub struct Envelope {
    kind: ObjectKind,
    id: u32,
    names: RwLock<Names>,
    digest: OnceLock<[u8; 32]>,
}

impl Envelope {
    /// Create a new envelope with a fresh process-unique id.
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            names: RwLock::new(Names::default()),
            digest: OnceLock::new(),
        }
    }

    /// Envelope for a copy of an entity: same kind and names, new id, no digest.
    pub fn duplicate(&self) -> Self {
        Self {
            kind: self.kind,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            names: RwLock::new(self.names.read().clone()),
            digest: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self, which: NameKind) -> Option<String> {
        self.names.read().get(which).cloned()
    }

    pub fn set_name(&self, which: NameKind, text: impl Into<String>) {
        *self.names.write().slot(which) = Some(text.into());
    }

    /// Cached digest, if one was computed.
    pub fn digest(&self) -> Option<[u8; 32]> {
        self.digest.get().copied()
    }

    /// Return the cached digest, computing it on first use.
    pub fn digest_or_init(&self, compute: impl FnOnce() -> [u8; 32]) -> [u8; 32] {
        *self.digest.get_or_init(compute)
    }

    /// Seed the digest cache with a known value, e.g. when copying an entity
    /// whose content is unchanged. Returns `false` if a digest was already
    /// cached.
    pub fn set_digest(&self, digest: [u8; 32]) -> bool {
        self.digest.set(digest).is_ok()
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Behaviour shared by every entity that can live in the object cache.
pub trait Object: Any + Send + Sync {
    fn envelope(&self) -> &Envelope;

    /// Produce an independent copy, if the entity supports copying.
    ///
    /// The cache stores copies of copyable entities so that its lifetime is
    /// independent of the caller's handle.
    fn copy_object(&self) -> Option<Arc<dyn Object>> {
        None
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn kind(&self) -> ObjectKind {
        self.envelope().kind()
    }
}

/// Downcast a shared entity to its concrete type.
pub fn downcast<T: Object>(object: Arc<dyn Object>) -> Option<Arc<T>> {
    object.into_any().downcast::<T>().ok()
}

/// Current strong reference count of a shared handle.
pub fn ref_count<T: ?Sized>(handle: &Arc<T>) -> usize {
    Arc::strong_count(handle)
}
