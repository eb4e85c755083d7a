mod error;
pub mod memory_store;
pub mod node_cache;
pub mod node_filter;
pub mod stats;
pub mod store;
pub mod types;

pub use error::{DomainError, DomainResult};
pub use memory_store::InMemoryNodeStore;
pub use node_cache::{CacheStats, NodeStateCache};
pub use node_filter::{FilterStats, NodeFilter};
pub use stats::{PipelineStats, StatsSnapshot};
pub use store::NodeStore;
pub use types::{NodeRecord, NodeUpdate, RawMessage, UpdateKind};

/// Default admission pattern: base-station shortnames like `BB07`.
pub const DEFAULT_SHORTNAME_PATTERN: &str = "BB[0-9][0-9]";
