// railsync-core: Mirrored panel state and the reconciliation engine between
// railsync-api and consumers (CLI).

pub mod config;
pub mod error;
pub mod heuristics;
pub mod log_buffer;
pub mod model;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{SyncConfig, TlsVerification};
pub use error::CoreError;
pub use log_buffer::BoundedLog;
pub use reconcile::{Effect, Reconciler};
pub use session::SyncSession;
pub use store::MirrorStore;
pub use stream::{ConnectionStream, RegistryChange};

// Wire types callers pass into session operations.
pub use railsync_api::command_channel::{ChannelRequest, ChannelState};
pub use railsync_api::event_stream::StreamState;
pub use railsync_api::models::{ConnectionTarget, CreateConnection};

pub use model::{
    AccessoryId, AccessoryStatus, CommandStation, ConnectionRecord, FocusedThrottle, LogCategory,
    LogEntry, PowerStatus, Role, StatusKind, StatusMessage, SystemDescriptor, ThrottleKey,
    ThrottlePatch, ThrottleState,
};
