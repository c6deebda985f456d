// Scripted in-memory devices API shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bosync_api::{
    Change, Code, Device, DeviceQuery, DevicesApi, Endpoint, EndpointResolver, Error,
    ListDevicesRequest, ListPage, MessageStream, PullDevicesRequest, PullDevicesResponse,
    StaticEndpoint, UnaryFuture,
};
use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Subscriber = (DeviceQuery, mpsc::UnboundedSender<Result<PullDevicesResponse, Error>>);

/// Devices held in memory. Pages are offsets into the filtered list,
/// encoded as decimal page tokens.
#[derive(Default)]
pub struct FakeDevices {
    devices: Mutex<Vec<Device>>,
    subscribers: Mutex<Vec<Subscriber>>,
    list_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    fail_lists: AtomicBool,
    endless: AtomicBool,
}

impl FakeDevices {
    pub fn with(devices: Vec<Device>) -> Arc<Self> {
        Arc::new(Self {
            devices: Mutex::new(devices),
            ..Self::default()
        })
    }

    /// `count` devices on each of the given floors, named `<floor>-<n>`.
    pub fn building(floors: &[&str], count: usize) -> Arc<Self> {
        let devices = floors
            .iter()
            .flat_map(|floor| {
                (0..count).map(move |n| Device::new(format!("{floor}-{n:02}")).on_floor(*floor))
            })
            .collect();
        Self::with(devices)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    /// Pull streams the client has not dropped yet.
    pub fn live_streams(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .count()
    }

    /// Make every list call fail until switched back.
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Hand out a continuation token on every page, forever.
    pub fn endless(&self, endless: bool) {
        self.endless.store(endless, Ordering::SeqCst);
    }

    /// Apply `change` to the stored devices and push it to every open
    /// stream whose query matches it.
    pub fn push(&self, change: Change<Device>) {
        {
            let mut devices = self.devices.lock().unwrap();
            if let Some(old) = &change.old_value {
                devices.retain(|d| d.name != old.name);
            }
            if let Some(new) = &change.new_value {
                devices.retain(|d| d.name != new.name);
                devices.push(new.clone());
            }
        }
        for (query, tx) in self.subscribers.lock().unwrap().iter() {
            if change.subject().is_some_and(|d| query.matches(d)) {
                let _ = tx.send(Ok(PullDevicesResponse {
                    changes: vec![change.clone()],
                }));
            }
        }
    }

    /// Terminate every open stream with `error`.
    pub fn break_streams(&self, error: &Error) {
        for (_, tx) in self.subscribers.lock().unwrap().iter() {
            let _ = tx.send(Err(error.clone()));
        }
    }
}

impl DevicesApi for FakeDevices {
    fn list_devices(
        &self,
        _endpoint: Endpoint,
        request: ListDevicesRequest,
    ) -> UnaryFuture<ListPage<Device>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lists.load(Ordering::SeqCst) {
            return futures_util::future::ready(Err(Error::status(Code::Unavailable, "list down")))
                .boxed();
        }

        let matching: Vec<Device> = self
            .devices
            .lock()
            .unwrap()
            .iter()
            .filter(|d| request.query.matches(d))
            .cloned()
            .collect();
        let offset: usize = request
            .page_token
            .as_deref()
            .map_or(0, |t| t.parse().unwrap());
        let size = usize::try_from(request.page_size).unwrap().max(1);
        let end = (offset + size).min(matching.len());
        let items = matching.get(offset..end).unwrap_or_default().to_vec();

        let next = if self.endless.load(Ordering::SeqCst) || end < matching.len() {
            end.to_string()
        } else {
            String::new()
        };
        let mut page = ListPage::new(items, Some(next.as_str()));
        page.total_size = Some(u32::try_from(matching.len()).unwrap());
        futures_util::future::ready(Ok(page)).boxed()
    }

    fn pull_devices(
        &self,
        _endpoint: Endpoint,
        request: PullDevicesRequest,
    ) -> MessageStream<PullDevicesResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((request.query, tx));
        UnboundedReceiverStream::new(rx).boxed()
    }
}

pub fn resolver() -> Arc<dyn EndpointResolver> {
    Arc::new(StaticEndpoint::new(
        Endpoint::parse("https://bos.test:23557").unwrap(),
    ))
}

/// Let spawned tasks run until they are all parked.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
