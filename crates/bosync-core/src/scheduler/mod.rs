// ── Race-safe scheduling ──
//
// `TaskQueue` serializes work per resource and collapses superseded keys;
// `watch_resource` / `watch_action` bind it to a stream or a tracked action.

mod queue;
mod watch;

pub use queue::{TaskQueue, Ticket};
pub use watch::{WatchHandle, watch_action, watch_resource};
