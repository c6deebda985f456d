#![allow(clippy::unwrap_used)]
// Integration tests for the paged device collection against a scripted API.

mod common;

use std::sync::Arc;

use bosync_api::{Change, Code, Device, DevicesApi, Error};
use bosync_core::adapters::devices::on_floor;
use bosync_core::{RemoteResource, SyncOptions, device_collection};
use pretty_assertions::assert_eq;

use common::{FakeDevices, resolver, settle};

// ── Helpers ─────────────────────────────────────────────────────────

fn options(page_size: u32, max_pages: u32) -> SyncOptions {
    SyncOptions {
        page_size,
        max_pages,
        ..SyncOptions::default()
    }
}

fn floors_of(devices: &[Arc<Device>]) -> Vec<String> {
    let mut floors: Vec<String> = devices.iter().filter_map(|d| d.floor.clone()).collect();
    floors.sort();
    floors.dedup();
    floors
}

// ── Paging ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_floor_query_pages_to_the_end_and_streams() {
    let api = FakeDevices::building(&["L1", "L2"], 5);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(2, 100),
    );

    devices.query(on_floor("L2"));
    let pages = devices.settled().await;

    assert!(pages.exhausted);
    assert!(!pages.truncated);
    assert_eq!(pages.pages_fetched, 3);
    assert_eq!(pages.total_size, Some(5));
    assert_eq!(api.list_calls(), 3);
    assert_eq!(devices.len(), 5);
    assert_eq!(floors_of(&devices.items()), vec!["L2".to_string()]);
    assert!(!devices.meta().loading);

    assert!(devices.is_streaming());
    assert_eq!(api.live_streams(), 1);

    api.push(Change::add(Device::new("L2-new").on_floor("L2")));
    api.push(Change::add(Device::new("L1-new").on_floor("L1")));
    api.push(Change::remove(Device::new("L2-00").on_floor("L2")));
    settle().await;

    assert!(devices.get("L2-new").is_some());
    assert!(devices.get("L1-new").is_none());
    assert!(devices.get("L2-00").is_none());
    assert_eq!(devices.len(), 5);
}

#[tokio::test]
async fn test_page_limit_truncates_endless_listing() {
    let api = FakeDevices::building(&["L1"], 3);
    api.endless(true);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(1, 4),
    );

    devices.query(on_floor("L1"));
    let pages = devices.settled().await;

    assert!(pages.truncated);
    assert!(!pages.exhausted);
    assert_eq!(pages.pages_fetched, 4);
    assert_eq!(api.list_calls(), 4);

    // Resuming does not go past the limit.
    devices.fetch_pages().await;
    assert_eq!(api.list_calls(), 4);
}

#[tokio::test]
async fn test_demand_signal_gates_paging() {
    let api = FakeDevices::building(&["L1"], 6);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(2, 100),
    );

    devices.set_needs_more_pages(false);
    devices.query(on_floor("L1"));
    devices.settled().await;
    assert_eq!(api.list_calls(), 0);
    assert!(devices.is_empty());

    devices.set_needs_more_pages(true);
    let pages = devices.settled().await;
    assert!(pages.exhausted);
    assert_eq!(devices.len(), 6);
}

// ── Query switching ─────────────────────────────────────────────────

#[tokio::test]
async fn test_switching_floors_drops_the_old_results_and_stream() {
    let api = FakeDevices::building(&["L1", "L2"], 4);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(3, 100),
    );

    let first = devices.query(on_floor("L1"));
    devices.settled().await;
    assert_eq!(floors_of(&devices.items()), vec!["L1".to_string()]);

    let second = devices.query(on_floor("L2"));
    assert_ne!(first, second);
    devices.settled().await;
    settle().await;

    assert_eq!(devices.len(), 4);
    assert_eq!(floors_of(&devices.items()), vec!["L2".to_string()]);
    assert_eq!(api.pull_calls(), 2);
    assert_eq!(api.live_streams(), 1);

    // A late change for the old floor has nowhere to land.
    api.push(Change::add(Device::new("L1-late").on_floor("L1")));
    settle().await;
    assert!(devices.get("L1-late").is_none());
}

#[tokio::test]
async fn test_rapid_query_switches_keep_only_the_last() {
    let api = FakeDevices::building(&["L1", "L2", "L3"], 3);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(2, 100),
    );

    devices.query(on_floor("L1"));
    devices.query(on_floor("L2"));
    let last = devices.query(on_floor("L3"));
    devices.settled().await;
    settle().await;

    assert_eq!(devices.query_token(), last);
    assert_eq!(floors_of(&devices.items()), vec!["L3".to_string()]);
    assert_eq!(devices.len(), 3);
    assert_eq!(api.live_streams(), 1);
}

#[tokio::test]
async fn test_dropping_the_collection_closes_its_stream() {
    let api = FakeDevices::building(&["L1"], 2);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(10, 100),
    );
    devices.query(on_floor("L1"));
    devices.settled().await;
    assert_eq!(api.live_streams(), 1);

    drop(devices);
    settle().await;
    assert_eq!(api.live_streams(), 0);
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_page_is_retried_on_resume() {
    let api = FakeDevices::building(&["L1"], 4);
    api.fail_lists(true);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(2, 100),
    );

    devices.query(on_floor("L1"));
    devices.settled().await;

    let error = devices.fetch_error().unwrap();
    assert_eq!(error.error.code(), Some(Code::Unavailable));
    assert!(devices.is_empty());
    assert_eq!(devices.next_page_token(), None);
    // The live stream is independent of the page failure.
    assert!(devices.is_streaming());

    api.fail_lists(false);
    devices.fetch_pages().await;

    assert!(devices.fetch_error().is_none());
    assert_eq!(devices.len(), 4);
}

#[tokio::test]
async fn test_stream_error_is_recorded_without_reopening() {
    let api = FakeDevices::building(&["L1"], 2);
    let devices = device_collection(
        Arc::clone(&api) as Arc<dyn DevicesApi>,
        resolver(),
        options(10, 100),
    );
    devices.query(on_floor("L1"));
    devices.settled().await;

    api.break_streams(&Error::StreamClosed {
        reason: "server restart".into(),
    });
    settle().await;

    let meta = devices.meta();
    assert!(meta.stream_error.is_some());
    assert!(!devices.is_streaming());
    assert_eq!(api.live_streams(), 0);
    assert_eq!(api.pull_calls(), 1);
    // Items fetched before the failure stay.
    assert_eq!(devices.len(), 2);
}
