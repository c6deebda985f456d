// bosync-core: Race-safe sync of server-streamed and paged RPC data into reactive state.
//
// Resources (`store`) hold loading/error/value state in `watch` channels.
// `pull` runs streams and `action` runs one-shot requests against them;
// `scheduler` re-runs either whenever a key changes, one operation at a
// time, and `store::Collection` merges paged lists with a live stream.

pub mod action;
pub mod adapters;
pub mod config;
pub mod error;
pub mod pull;
pub mod scheduler;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use action::{ActionState, ActionTracker, Attempt, track_action};
pub use config::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, SyncOptions};
pub use error::CoreError;
pub use pull::{close_resource, pull_resource};
pub use scheduler::{TaskQueue, Ticket, WatchHandle, watch_action, watch_resource};
pub use store::{
    Collection, CollectionState, HasMeta, PageSource, PageState, QueryToken, RemoteResource,
    ResourceCollection, ResourceError, ResourceMeta, ResourceValue, StreamHandle, ValueState,
    set_collection, set_value,
};
pub use stream::{ResourceStream, ResourceWatchStream};

// Adapters most dashboards need.
pub use adapters::{AirTemperatureWatch, MeterWatch, OnOffWatch, device_collection};
