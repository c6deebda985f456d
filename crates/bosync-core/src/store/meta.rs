use std::fmt;

use chrono::{DateTime, Utc};

/// A failure attached to the resource or tracker it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    /// Label of the operation that failed.
    pub name: String,
    pub error: bosync_api::Error,
}

impl ResourceError {
    pub fn new(name: impl Into<String>, error: bosync_api::Error) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.error)
    }
}

/// State shared by every remote resource, single value or collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMeta {
    /// True from the moment a stream is requested until its first message
    /// or error.
    pub loading: bool,
    pub stream_error: Option<ResourceError>,
    /// When data last arrived.
    pub update_time: Option<DateTime<Utc>>,
}

impl ResourceMeta {
    /// Record that fresh data has been applied.
    pub(crate) fn touch(&mut self) {
        self.loading = false;
        self.update_time = Some(Utc::now());
    }
}

/// Access to the [`ResourceMeta`] embedded in a resource state.
pub trait HasMeta {
    fn meta(&self) -> &ResourceMeta;
    fn meta_mut(&mut self) -> &mut ResourceMeta;
}
