//! Glyphgate - per-subject character allow-lists
//!
//! Maintains which subjects may use which characters, administers that
//! relation in bulk, and keeps client sessions' view of their own allow-set
//! fresh by polling the store.

pub mod auth;
pub mod engine;
pub mod matrix;
pub mod storage;
pub mod sync;

pub use auth::{AllowDelta, AllowSet};
pub use engine::{BulkEngine, EngineError, ErrorKind, GrantEngine};
pub use matrix::{Cell, Interaction, Matrix, MatrixProjector};
pub use storage::{MemoryStore, PostgresStore, RelationStore, StorageError};
pub use sync::{PermissionSession, SessionState, SyncConfig, SyncError};
