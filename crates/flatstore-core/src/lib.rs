//! FlatStore Core: In-Memory Tables with Crash-Safe CSV Snapshots
//!
//! A small storage engine for a three-table social-media dataset (users,
//! posts, engagements). RAM is the working surface; each table is backed by a
//! flat CSV file that is rewritten atomically on every mutation.
//!
//! # Architecture
//!
//! - **Read path**: shared table locks, answered from RAM and secondary indexes
//! - **Write path**: exclusive lock, atomic file rewrite, then RAM update
//! - **Load path**: sequential or fork-join parallel parse, integrity check,
//!   all-or-nothing install
//!
//! # Example
//!
//! ```no_run
//! use flatstore_core::{FlatStore, NewEngagement, StoreConfig};
//!
//! let store = FlatStore::open(StoreConfig::in_dir("data"))?;
//! store.update_post_views(1, 50)?;
//! let id = store.add_engagement(NewEngagement::like(1, "eve", 1706500000))?;
//! assert!(store.engagement(id).is_some());
//! # Ok::<(), flatstore_core::StoreError>(())
//! ```

pub mod codec;
pub mod config;
pub mod durable;
pub mod error;
pub mod index;
pub mod load;
pub mod model;
pub mod platform_durability;
pub mod store;

// Re-export key types for convenience
pub use codec::{CsvRecord, ParsedTable, RowRejection};
pub use config::{Durability, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use index::Indexes;
pub use load::Tables;
pub use model::{Engagement, EngagementId, EngagementKind, NewEngagement, Post, PostId, Table, User, UserId};
pub use store::FlatStore;
