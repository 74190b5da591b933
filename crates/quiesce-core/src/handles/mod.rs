pub mod differ;
pub mod sources;
pub mod types;

// Public API exports
pub use differ::SnapshotDiffer;
pub use sources::{CompositeSource, HandleSource, platform_source};
pub use types::{HandleDescriptor, HandleKind, HandleSnapshot};
