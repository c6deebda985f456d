// ── Per-trait adapters ──
//
// Thin wrappers that bind the sync primitives to concrete trait APIs:
// request shapes, labels and the apply function for each message type.

pub mod air_temperature;
pub mod devices;
pub mod meter;
pub mod on_off;

use std::sync::Arc;

use bosync_api::{Endpoint, EndpointResolver, MessageStream, PullRequest, PullValueResponse};

use crate::config::SyncOptions;
use crate::error::CoreError;
use crate::scheduler::{WatchHandle, watch_resource};
use crate::store::{RemoteResource, ResourceValue, ValueState, set_value};
use crate::stream::ResourceStream;

pub use air_temperature::AirTemperatureWatch;
pub use devices::{DevicesSource, device_collection};
pub use meter::MeterWatch;
pub use on_off::OnOffWatch;

/// Fold a batch of value changes: the newest one wins.
pub fn apply_latest<V>(state: &mut ValueState<V>, response: PullValueResponse<V>) -> bool {
    match response.into_latest() {
        Some(value) => {
            set_value(state, value);
            true
        }
        None => false,
    }
}

/// A single named value kept in sync with its pull stream.
pub struct PulledValue<V: Clone + Send + Sync + 'static> {
    value: Arc<ResourceValue<V>>,
    watch: WatchHandle<PullRequest>,
    updates_only: bool,
}

impl<V: Clone + Send + Sync + 'static> PulledValue<V> {
    /// Validate `name` and start streaming. Fails with
    /// [`CoreError::InvalidRequest`] before anything is created if the name
    /// is blank.
    pub(crate) fn start<O>(
        label: &str,
        name: &str,
        resolver: Arc<dyn EndpointResolver>,
        options: &SyncOptions,
        open: O,
    ) -> Result<Self, CoreError>
    where
        O: Fn(Endpoint, PullRequest) -> MessageStream<PullValueResponse<V>> + Send + Sync + 'static,
    {
        let request = PullRequest::builder()
            .name(name)
            .updates_only(options.updates_only)
            .build()?;
        let value = Arc::new(ResourceValue::new());
        let watch = watch_resource(
            label,
            Arc::clone(&value),
            resolver,
            request,
            move |endpoint, request: &PullRequest| open(endpoint, request.clone()),
            apply_latest::<V>,
        );
        Ok(Self {
            value,
            watch,
            updates_only: options.updates_only,
        })
    }

    pub fn name(&self) -> String {
        self.watch.key().name
    }

    /// Follow a different name. Returns whether the stream is reopened.
    pub fn set_name(&self, name: &str) -> Result<bool, CoreError> {
        if self.watch.is_disposed() {
            return Err(CoreError::Disposed);
        }
        let request = PullRequest::builder()
            .name(name)
            .updates_only(self.updates_only)
            .build()?;
        Ok(self.watch.set_key(request))
    }

    pub fn set_paused(&self, paused: bool) {
        self.watch.set_paused(paused);
    }

    /// Reopen the stream, e.g. after a stream error.
    pub fn rerun(&self) {
        self.watch.rerun();
    }

    pub fn dispose(&self) {
        self.watch.dispose();
    }

    pub fn value(&self) -> Option<V> {
        self.value.value()
    }

    pub fn state(&self) -> ValueState<V> {
        self.value.state()
    }

    pub fn resource(&self) -> &ResourceValue<V> {
        &self.value
    }

    pub fn subscribe(&self) -> ResourceStream<ValueState<V>> {
        self.value.subscribe()
    }

    /// Write a value obtained outside the stream, such as an update
    /// response.
    /// Apply a write's answer, unless the watch follows another name by now.
    pub(crate) fn set_value_for(&self, name: &str, value: V) {
        if self.name() == name {
            self.value.set_value(value);
        } else {
            tracing::debug!(name, "dropping write answer for a name no longer followed");
        }
    }
}
