//! Data Access Layer
//!
//! Cache-aside CRUD over an authoritative [`Source`], kept consistent by
//! invalidate-on-write and by change-feed notifications from other writers.

pub mod cancel;
pub mod feed;
pub mod memory_source;
pub mod service;
pub mod source;
pub mod table;

pub use cancel::{CancelToken, Fetch};
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, ChangeStream, InMemoryChangeFeed};
pub use memory_source::MemorySource;
pub use service::{DataService, MutationOptions, QueryOptions};
pub use source::{OrderBy, SelectOptions, SortDirection, Source, SourceResult};
pub use table::Table;
