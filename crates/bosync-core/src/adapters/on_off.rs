use std::sync::Arc;

use bosync_api::{EndpointResolver, OnOff, OnOffApi, UpdateOnOffRequest};

use super::PulledValue;
use crate::action::{ActionTracker, track_committed};
use crate::config::SyncOptions;
use crate::error::CoreError;

/// Live on/off state of one device, plus writes.
pub struct OnOffWatch {
    api: Arc<dyn OnOffApi>,
    resolver: Arc<dyn EndpointResolver>,
    pulled: PulledValue<OnOff>,
    updating: ActionTracker<OnOff>,
}

impl OnOffWatch {
    /// Start following `name`. A blank name is rejected before any stream
    /// is opened.
    pub fn new(
        name: &str,
        api: Arc<dyn OnOffApi>,
        resolver: Arc<dyn EndpointResolver>,
        options: &SyncOptions,
    ) -> Result<Self, CoreError> {
        let stream_api = Arc::clone(&api);
        let pulled = PulledValue::start(
            "pull on/off",
            name,
            Arc::clone(&resolver),
            options,
            move |endpoint, request| stream_api.pull_on_off(endpoint, request),
        )?;
        Ok(Self {
            api,
            resolver,
            pulled,
            updating: ActionTracker::new(),
        })
    }

    /// Switch the device and apply the server's answer right away, ahead of
    /// the stream echoing it. The answer is not applied if a later update
    /// finished first or the watch moved to another name meanwhile.
    pub async fn update(&self, on_off: OnOff) -> Result<OnOff, CoreError> {
        let request = UpdateOnOffRequest::new(self.pulled.name(), on_off)?;
        let name = request.name.clone();
        let api = &self.api;
        track_committed(
            "update on/off",
            &self.updating,
            &*self.resolver,
            |endpoint| api.update_on_off(endpoint, request),
            || true,
            |updated| self.pulled.set_value_for(&name, *updated),
        )
        .await
    }

    pub fn value(&self) -> Option<OnOff> {
        self.pulled.value()
    }

    pub fn pulled(&self) -> &PulledValue<OnOff> {
        &self.pulled
    }

    /// Progress of the last [`update`](Self::update).
    pub fn updating(&self) -> &ActionTracker<OnOff> {
        &self.updating
    }
}
