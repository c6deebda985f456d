//! Per-trait client contracts.
//!
//! Implementations wrap generated gRPC-web stubs (or test doubles). Every
//! call takes the resolved [`Endpoint`] by value and returns an owned
//! future or stream, so the sync layer can hold onto it across task
//! boundaries.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::message::{GetRequest, ListPage, PullRequest, PullValueResponse};
use crate::types::{
    AirTemperature, Device, ListDevicesRequest, MeterReading, OnOff, PullDevicesRequest,
    PullDevicesResponse, UpdateAirTemperatureRequest, UpdateOnOffRequest,
};

/// A server-push stream of response messages.
///
/// Dropping the stream cancels the underlying call.
pub type MessageStream<M> = BoxStream<'static, Result<M, Error>>;

/// Future returned by unary calls.
pub type UnaryFuture<M> = BoxFuture<'static, Result<M, Error>>;

pub trait DevicesApi: Send + Sync {
    fn list_devices(&self, endpoint: Endpoint, request: ListDevicesRequest)
    -> UnaryFuture<ListPage<Device>>;

    fn pull_devices(
        &self,
        endpoint: Endpoint,
        request: PullDevicesRequest,
    ) -> MessageStream<PullDevicesResponse>;
}

pub trait OnOffApi: Send + Sync {
    fn get_on_off(&self, endpoint: Endpoint, request: GetRequest) -> UnaryFuture<OnOff>;

    fn update_on_off(&self, endpoint: Endpoint, request: UpdateOnOffRequest) -> UnaryFuture<OnOff>;

    fn pull_on_off(
        &self,
        endpoint: Endpoint,
        request: PullRequest,
    ) -> MessageStream<PullValueResponse<OnOff>>;
}

pub trait MeterApi: Send + Sync {
    fn get_meter_reading(&self, endpoint: Endpoint, request: GetRequest)
    -> UnaryFuture<MeterReading>;

    fn pull_meter_readings(
        &self,
        endpoint: Endpoint,
        request: PullRequest,
    ) -> MessageStream<PullValueResponse<MeterReading>>;
}

pub trait AirTemperatureApi: Send + Sync {
    fn get_air_temperature(
        &self,
        endpoint: Endpoint,
        request: GetRequest,
    ) -> UnaryFuture<AirTemperature>;

    fn update_air_temperature(
        &self,
        endpoint: Endpoint,
        request: UpdateAirTemperatureRequest,
    ) -> UnaryFuture<AirTemperature>;

    fn pull_air_temperature(
        &self,
        endpoint: Endpoint,
        request: PullRequest,
    ) -> MessageStream<PullValueResponse<AirTemperature>>;
}
