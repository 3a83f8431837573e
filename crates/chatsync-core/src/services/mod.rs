pub mod message_surface;
pub mod navigation_guard;
pub mod scheduler;
pub mod stream_recovery;
pub mod sync_manager;
pub mod telemetry;
pub mod visibility;

pub use message_surface::{MessageAnchor, MessageSurface, NullSurface, resolve_anchor};
pub use navigation_guard::{NavigationGuard, NavigationToken};
pub use scheduler::ScheduledTask;
pub use stream_recovery::StreamRecoveryManager;
pub use sync_manager::{SyncEvent, SyncManager, SyncOutcome, SyncReport};
pub use telemetry::init_tracing;
pub use visibility::VisibilityTracker;
