use std::sync::Arc;

use bosync_api::{EndpointResolver, GetRequest, MeterApi, MeterReading};

use super::PulledValue;
use crate::action::ActionTracker;
use crate::config::SyncOptions;
use crate::error::CoreError;
use crate::scheduler::{WatchHandle, watch_action};

/// Meter readings for one device: a live stream, plus a one-shot read
/// that follows the same name.
pub struct MeterWatch {
    pulled: PulledValue<MeterReading>,
    reading: Arc<ActionTracker<MeterReading>>,
    get: WatchHandle<Option<GetRequest>>,
}

impl MeterWatch {
    pub fn new(
        name: &str,
        api: Arc<dyn MeterApi>,
        resolver: Arc<dyn EndpointResolver>,
        options: &SyncOptions,
    ) -> Result<Self, CoreError> {
        let request = GetRequest::new(name)?;

        let stream_api = Arc::clone(&api);
        let pulled = PulledValue::start(
            "pull meter readings",
            name,
            Arc::clone(&resolver),
            options,
            move |endpoint, request| stream_api.pull_meter_readings(endpoint, request),
        )?;

        let reading = Arc::new(ActionTracker::new());
        let get = watch_action(
            "get meter reading",
            Arc::clone(&reading),
            resolver,
            Some(request),
            move |endpoint, request| api.get_meter_reading(endpoint, request),
        );

        Ok(Self {
            pulled,
            reading,
            get,
        })
    }

    /// Follow a different meter with both the stream and the one-shot read.
    pub fn set_name(&self, name: &str) -> Result<bool, CoreError> {
        let request = GetRequest::new(name)?;
        let reopened = self.pulled.set_name(name)?;
        self.get.set_key(Some(request));
        Ok(reopened)
    }

    /// Stop both the stream and the one-shot read; the last values stay.
    pub fn set_paused(&self, paused: bool) {
        self.pulled.set_paused(paused);
        self.get.set_paused(paused);
    }

    /// Read the meter again.
    pub fn refresh(&self) {
        self.get.rerun();
    }

    /// The newest reading: streamed if any arrived, otherwise the one-shot
    /// read.
    pub fn latest(&self) -> Option<MeterReading> {
        self.pulled.value().or_else(|| self.reading.response())
    }

    pub fn pulled(&self) -> &PulledValue<MeterReading> {
        &self.pulled
    }

    pub fn reading(&self) -> &ActionTracker<MeterReading> {
        &self.reading
    }
}
