//! Pipeline graph model: stages, connectors, traversal and conversions.

pub mod connector;
pub mod conversion;
pub mod stage;
pub mod traversal;

pub use connector::{CONTROL_CATEGORY, ConnectorCaps, ConnectorDescriptor, DATA_CATEGORY};
pub use conversion::{Conversion, ConversionState, ReleaseReport, RenderSummary, release_pipeline};
pub use stage::{PlugRef, RunContext, SocketRef, Stage, connect, disconnect};
pub use traversal::{Direction, Edge, Graph, build_graph};
