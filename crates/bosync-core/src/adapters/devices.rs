use std::sync::Arc;

use bosync_api::{
    Change, Condition, Device, DeviceQuery, DevicesApi, Endpoint, EndpointResolver,
    ListDevicesRequest, ListPage, MessageStream, PageRequest, PullDevicesRequest, UnaryFuture,
};
use futures_util::StreamExt;

use crate::config::SyncOptions;
use crate::store::{Collection, PageSource};

/// Pages and change streams from the devices API.
///
/// Pulls ask for updates only; the list pages already carry the initial
/// state.
pub struct DevicesSource {
    api: Arc<dyn DevicesApi>,
}

impl DevicesSource {
    pub fn new(api: Arc<dyn DevicesApi>) -> Self {
        Self { api }
    }
}

impl PageSource<DeviceQuery, Device> for DevicesSource {
    fn list(
        &self,
        endpoint: Endpoint,
        query: &DeviceQuery,
        page: PageRequest,
    ) -> UnaryFuture<ListPage<Device>> {
        let request = ListDevicesRequest {
            query: query.clone(),
            page_size: page.page_size,
            page_token: page.page_token,
        };
        self.api.list_devices(endpoint, request)
    }

    fn pull(&self, endpoint: Endpoint, query: &DeviceQuery) -> MessageStream<Vec<Change<Device>>> {
        let request = PullDevicesRequest {
            query: query.clone(),
            updates_only: true,
        };
        self.api
            .pull_devices(endpoint, request)
            .map(|message| message.map(|response| response.changes))
            .boxed()
    }

    fn id(&self, device: &Device) -> String {
        device.name.clone()
    }
}

/// A paged, live device list keyed by device name.
pub fn device_collection(
    api: Arc<dyn DevicesApi>,
    resolver: Arc<dyn EndpointResolver>,
    options: SyncOptions,
) -> Collection<DeviceQuery, Device> {
    Collection::new("devices", Arc::new(DevicesSource::new(api)), resolver, options)
}

/// Query for the devices on one floor.
pub fn on_floor(floor: impl Into<String>) -> DeviceQuery {
    DeviceQuery::all().and(Condition::eq("floor", floor))
}
