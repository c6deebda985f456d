use std::sync::Arc;

use bosync_api::{
    AirTemperature, AirTemperatureApi, AirTemperatureMode, EndpointResolver,
    UpdateAirTemperatureRequest,
};

use super::PulledValue;
use crate::action::{ActionTracker, track_committed};
use crate::config::SyncOptions;
use crate::error::CoreError;

/// Live temperature and set point of one HVAC zone, plus writes.
pub struct AirTemperatureWatch {
    api: Arc<dyn AirTemperatureApi>,
    resolver: Arc<dyn EndpointResolver>,
    pulled: PulledValue<AirTemperature>,
    updating: ActionTracker<AirTemperature>,
}

impl AirTemperatureWatch {
    pub fn new(
        name: &str,
        api: Arc<dyn AirTemperatureApi>,
        resolver: Arc<dyn EndpointResolver>,
        options: &SyncOptions,
    ) -> Result<Self, CoreError> {
        let stream_api = Arc::clone(&api);
        let pulled = PulledValue::start(
            "pull air temperature",
            name,
            Arc::clone(&resolver),
            options,
            move |endpoint, request| stream_api.pull_air_temperature(endpoint, request),
        )?;
        Ok(Self {
            api,
            resolver,
            pulled,
            updating: ActionTracker::new(),
        })
    }

    pub async fn set_point(&self, celsius: f64) -> Result<AirTemperature, CoreError> {
        self.update(UpdateAirTemperatureRequest::set_point(self.pulled.name(), celsius)?)
            .await
    }

    pub async fn set_mode(&self, mode: AirTemperatureMode) -> Result<AirTemperature, CoreError> {
        self.update(UpdateAirTemperatureRequest::mode(self.pulled.name(), mode)?)
            .await
    }

    async fn update(
        &self,
        request: UpdateAirTemperatureRequest,
    ) -> Result<AirTemperature, CoreError> {
        let name = request.name.clone();
        let api = &self.api;
        track_committed(
            "update air temperature",
            &self.updating,
            &*self.resolver,
            |endpoint| api.update_air_temperature(endpoint, request),
            || true,
            |updated| self.pulled.set_value_for(&name, updated.clone()),
        )
        .await
    }

    pub fn value(&self) -> Option<AirTemperature> {
        self.pulled.value()
    }

    pub fn pulled(&self) -> &PulledValue<AirTemperature> {
        &self.pulled
    }

    pub fn updating(&self) -> &ActionTracker<AirTemperature> {
        &self.updating
    }
}
