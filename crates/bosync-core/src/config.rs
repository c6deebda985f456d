// ── Runtime sync options ──
//
// Tuning for the sync primitives. Never touches disk: `bosync-config`
// (or the embedding application) builds a `SyncOptions` and hands it in.

/// Page size requested from list RPCs when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Upper bound on pages fetched for a single query.
pub const DEFAULT_MAX_PAGES: u32 = 1000;

/// Options shared by the paginated collections and adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Page size requested from list RPCs.
    pub page_size: u32,
    /// Loop guard: paging for one query stops after this many pages, even
    /// if the server keeps handing out continuation tokens.
    pub max_pages: u32,
    /// Ask pull streams to skip the initial value.
    pub updates_only: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            updates_only: false,
        }
    }
}
