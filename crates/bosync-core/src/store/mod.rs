// ── Reactive resource state ──
//
// Single values, keyed collections and the paginated collection built on
// top of them. All share `ResourceMeta` and the stream slot in `RemoteCell`.

mod collection;
mod meta;
mod paged;
pub(crate) mod remote;
mod value;

pub use collection::{CollectionState, IdFn, ResourceCollection, set_collection};
pub use meta::{HasMeta, ResourceError, ResourceMeta};
pub use paged::{Collection, PageSource, PageState, QueryToken};
pub use remote::{RemoteCell, RemoteResource, StreamHandle};
pub use value::{ResourceValue, ValueState, set_value};
