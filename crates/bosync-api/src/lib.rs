//! Transport contracts for the bosync remote-resource sync layer.
//!
//! This crate does not speak any wire protocol. It defines what the sync
//! layer needs from one:
//!
//! - **[`EndpointResolver`]**: async lookup of the server [`Endpoint`].
//! - **Client traits** ([`client`]): unary calls returning a
//!   [`UnaryFuture`] and server-push calls returning a [`MessageStream`].
//! - **Message shapes** ([`message`]): [`Change`] lists for streamed
//!   collections, [`ListPage`] for paged lists, validated request builders.
//! - **[`Error`]**: the transport error taxonomy.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod types;

pub use client::{AirTemperatureApi, DevicesApi, MessageStream, MeterApi, OnOffApi, UnaryFuture};
pub use endpoint::{Endpoint, EndpointResolver, LazyEndpoint, StaticEndpoint};
pub use error::{Code, Error};
pub use message::{
    Change, ChangeType, GetRequest, ListPage, PageRequest, PullRequest, PullRequestBuilder,
    PullValueResponse, ValueChange,
};
pub use types::{
    AirTemperature, AirTemperatureMode, Condition, Device, DeviceQuery, ListDevicesRequest,
    MeterReading, OnOff, OnOffState, PullDevicesRequest, PullDevicesResponse,
    UpdateAirTemperatureRequest, UpdateOnOffRequest,
};
