//! End-to-end region download behaviour against an in-process transport.

mod support;

use std::sync::Arc;
use std::time::Duration;

use offline_regions::region::MAX_MERCATOR_LAT;
use offline_regions::{
    ChannelObserver, DownloadState, LatLngBounds, OfflineConfig, PausePolicy, RegionDefinition,
    RegionError, RegionErrorKind, RegionEvent, RegionId, RegionMetadata, RegionStore, StoreError,
};
use support::{
    Harness, Reply, STYLE_URL, ScriptedTransport, collect_events, config, definition, statuses,
    ten_tile_definition, within,
};

const IDLE: Duration = Duration::from_millis(100);

fn tile_url(z: u8, x: u32, y: u32) -> String {
    format!("https://tiles.example.com/{z}/{x}/{y}.pbf")
}

async fn wait_for_completed(region: &offline_regions::OfflineRegion, count: u64) {
    within(async {
        while region.status().completed_resource_count < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_small_region_downloads_to_completion_once() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    let definition = definition(0.0, 1.0);
    // Two tiles plus the style.
    assert_eq!(definition.tile_count(), 2);

    let region = harness
        .manager
        .create_region(definition, RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_for_inactive()).await;
    within(region.wait_until_idle()).await;

    let events = collect_events(&mut events, IDLE).await;
    let statuses = statuses(&events);
    let first = statuses.first().unwrap();
    assert_eq!(first.completed_resource_count, 0);
    assert_eq!(first.required_resource_count, 3);

    let last = statuses.last().unwrap();
    assert_eq!(last.download_state, DownloadState::Inactive);
    assert_eq!(last.completed_resource_count, 3);
    assert_eq!(last.required_resource_count, 3);
    assert!(last.is_required_count_precise);

    let finals = statuses
        .iter()
        .filter(|status| status.download_state == DownloadState::Inactive)
        .count();
    assert_eq!(finals, 1, "completion must fire exactly once");
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RegionEvent::Error { .. }))
    );

    let durable = harness.store.get_status(region.id()).await.unwrap();
    assert_eq!(durable.download_state, DownloadState::Inactive);
    assert_eq!(durable.completed_resource_count, 3);
    assert!(durable.is_complete());
}

#[tokio::test]
async fn test_completed_counts_are_non_decreasing() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 12.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let statuses = statuses(&collect_events(&mut events, IDLE).await);
    assert!(statuses.len() > 2);
    assert!(
        statuses
            .windows(2)
            .all(|pair| pair[0].completed_resource_count <= pair[1].completed_resource_count)
    );
    let last = statuses.last().unwrap();
    assert_eq!(last.completed_resource_count, last.required_resource_count);
}

#[tokio::test]
async fn test_start_on_active_region_spawns_nothing_new() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    region.set_download_state(DownloadState::Active).await;
    harness
        .manager
        .orchestrator()
        .start(&region)
        .await;
    assert_eq!(region.download_state(), DownloadState::Active);

    harness.transport.open_gate(100);
    within(region.wait_until_idle()).await;

    assert_eq!(harness.transport.requests_for(STYLE_URL), 1);
    assert_eq!(harness.transport.requests().len(), 3);
    assert!(region.status().is_complete());
}

#[tokio::test]
async fn test_detached_observer_receives_nothing_further() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 4.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(1);
    wait_for_completed(&region, 1).await;
    let before = collect_events(&mut events, IDLE).await;
    assert!(!before.is_empty());

    region.set_observer(None);
    harness.transport.open_gate(100);
    within(region.wait_until_idle()).await;

    assert!(region.status().is_complete());
    assert_eq!(region.download_state(), DownloadState::Inactive);
    // The slot held the only sender, so the channel closes without more events.
    assert!(within(events.recv()).await.is_none());
}

#[tokio::test]
async fn test_handles_for_same_region_share_state() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let other = harness.manager.region(region.id()).await.unwrap();

    region.set_download_state(DownloadState::Active).await;
    assert_eq!(other.download_state(), DownloadState::Active);

    other.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(100);
    within(other.wait_until_idle()).await;
    assert_eq!(harness.transport.requests_for(STYLE_URL), 1);
    assert!(region.status().is_complete());
}

#[tokio::test]
async fn test_transient_failures_within_budget_still_complete() {
    let transport = ScriptedTransport::new();
    let tile = tile_url(0, 0, 0);
    transport.script(&tile, [Reply::Timeout, Reply::Timeout]);
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    assert_eq!(harness.transport.requests_for(&tile), 3);
    assert_eq!(harness.manager.orchestrator().fetcher().stats().retries(), 2);
    let events = collect_events(&mut events, IDLE).await;
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RegionEvent::Error { .. }))
    );
    assert!(region.status().is_complete());
}

#[tokio::test]
async fn test_exhausted_retries_report_transient_error_once() {
    let transport = ScriptedTransport::new();
    let tile = tile_url(0, 0, 0);
    transport.script(&tile, [Reply::Timeout, Reply::Timeout, Reply::Timeout]);
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    assert_eq!(harness.transport.requests_for(&tile), 3);
    let events = collect_events(&mut events, IDLE).await;
    let errors: Vec<&RegionEvent> = events
        .iter()
        .filter(|event| matches!(event, RegionEvent::Error { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        RegionEvent::Error {
            kind: RegionErrorKind::FetchTransient,
            ..
        }
    ));
    assert!(matches!(events.last(), Some(RegionEvent::Error { .. })));
    assert_eq!(region.download_state(), DownloadState::Inactive);
    assert!(!region.status().is_complete());
}

#[tokio::test]
async fn test_not_found_is_permanent_without_retry() {
    let transport = ScriptedTransport::new();
    let tile = tile_url(1, 0, 0);
    transport.script(&tile, [Reply::status(404)]);
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    assert_eq!(harness.transport.requests_for(&tile), 1);
    let events = collect_events(&mut events, IDLE).await;
    assert!(events.iter().any(|event| matches!(
        event,
        RegionEvent::Error {
            kind: RegionErrorKind::FetchPermanent,
            ..
        }
    )));
    assert_eq!(region.download_state(), DownloadState::Inactive);
}

#[tokio::test]
async fn test_unparseable_style_is_permanent_error() {
    let transport = ScriptedTransport::new();
    transport.script(STYLE_URL, [Reply::ok(b"<html>not a style</html>")]);
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let events = collect_events(&mut events, IDLE).await;
    assert!(events.iter().any(|event| matches!(
        event,
        RegionEvent::Error {
            kind: RegionErrorKind::FetchPermanent,
            ..
        }
    )));
    // Only the style was requested.
    assert_eq!(harness.transport.requests().len(), 1);
}

#[tokio::test]
async fn test_style_sprites_are_downloaded() {
    let transport = ScriptedTransport::new();
    transport.script(
        STYLE_URL,
        [Reply::ok(
            br#"{"version": 8, "sprite": "https://maps.example.com/sprites/streets"}"#,
        )],
    );
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let status = region.status();
    assert_eq!(status.required_resource_count, 5);
    assert!(status.is_complete());
    assert_eq!(
        harness
            .transport
            .requests_for("https://maps.example.com/sprites/streets.png"),
        1
    );
}

#[tokio::test]
async fn test_repeated_glyph_url_is_fetched_and_counted_once() {
    const GLYPH_URL: &str = "https://maps.example.com/fonts/Noto%20Sans.pbf";
    let transport = ScriptedTransport::new();
    transport.script(
        STYLE_URL,
        [Reply::ok(
            br#"{
                "version": 8,
                "glyphs": "https://maps.example.com/fonts/{fontstack}.pbf",
                "layers": [{"layout": {"text-font": ["Noto Sans"]}}]
            }"#,
        )],
    );
    let harness = Harness::new(transport, config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let status = region.status();
    assert_eq!(status.required_resource_count, 4);
    assert!(status.is_complete());
    assert_eq!(harness.transport.requests_for(GLYPH_URL), 1);

    let events = collect_events(&mut events, IDLE).await;
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RegionEvent::Error { .. }))
    );
    let last = statuses(&events).pop().unwrap();
    assert_eq!(last.completed_resource_count, last.required_resource_count);
}

#[tokio::test]
async fn test_tile_count_limit_stops_region() {
    let config = OfflineConfig {
        tile_count_limit: Some(5),
        ..config()
    };
    let harness = Harness::new(ScriptedTransport::new(), config).await;
    let definition = ten_tile_definition();
    assert_eq!(definition.tile_count(), 10);
    assert_eq!(harness.manager.tile_count_limit(), Some(5));

    let region = harness
        .manager
        .create_region(definition, RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let events = collect_events(&mut events, IDLE).await;
    let limits: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            RegionEvent::TileCountLimitExceeded(limit) => Some(*limit),
            _ => None,
        })
        .collect();
    assert_eq!(limits, vec![5]);
    assert_eq!(region.download_state(), DownloadState::Inactive);
    assert_eq!(harness.store.tile_count().await.unwrap(), 5);
    assert_eq!(harness.tile_limit.count(), 5);
}

#[tokio::test]
async fn test_world_region_at_high_zoom_stops_at_tile_limit() {
    let config = OfflineConfig {
        tile_count_limit: Some(3),
        ..config()
    };
    let harness = Harness::new(ScriptedTransport::new(), config).await;
    let definition = RegionDefinition::new(
        STYLE_URL,
        support::TILE_TEMPLATE,
        LatLngBounds::new(-MAX_MERCATOR_LAT, -180.0, MAX_MERCATOR_LAT, 180.0),
        17.0,
        22.0,
        1.0,
    )
    .unwrap();
    let tiles: u64 = (17..=22).map(|zoom: u32| 1_u64 << (2 * zoom)).sum();
    assert_eq!(definition.tile_count(), tiles);

    let region = harness
        .manager
        .create_region(definition, RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));

    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    let events = collect_events(&mut events, IDLE).await;
    assert!(
        events
            .iter()
            .any(|event| matches!(event, RegionEvent::TileCountLimitExceeded(3)))
    );
    assert_eq!(region.download_state(), DownloadState::Inactive);
    assert_eq!(region.status().required_resource_count, tiles + 1);
    assert_eq!(harness.store.tile_count().await.unwrap(), 3);
}

#[tokio::test]
async fn test_pause_then_resume_never_refetches_stored_resources() {
    let config = OfflineConfig {
        max_concurrent_fetches: 2,
        ..config()
    };
    let harness = Harness::new(ScriptedTransport::gated(), config).await;
    let definition = definition(0.0, 10.0);
    let keys: Vec<_> = definition.required_resources().collect();
    let region = harness
        .manager
        .create_region(definition, RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(3);
    wait_for_completed(&region, 3).await;

    region.set_download_state(DownloadState::Inactive).await;
    assert_eq!(region.download_state(), DownloadState::Inactive);
    // Release the fetches still in flight; their results must be discarded.
    harness.transport.open_gate(10);
    within(region.wait_until_idle()).await;

    let mut stored = Vec::new();
    for key in &keys {
        if harness.store.has_resource(region.id(), key).await.unwrap() {
            stored.push(key.url().to_string());
        }
    }
    assert_eq!(stored.len(), 3);
    let durable = harness.store.get_status(region.id()).await.unwrap();
    assert_eq!(durable.completed_resource_count, 3);

    harness.transport.open_gate(1000);
    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;

    assert!(region.status().is_complete());
    for url in &stored {
        assert_eq!(harness.transport.requests_for(url), 1, "{url} fetched twice");
    }
}

#[tokio::test]
async fn test_pause_delivers_final_snapshot_when_enabled() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 4.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));
    assert!(region.deliver_inactive_messages());

    region.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(1);
    wait_for_completed(&region, 1).await;
    region.set_download_state(DownloadState::Inactive).await;
    harness.transport.open_gate(100);
    within(region.wait_until_idle()).await;

    let statuses = statuses(&collect_events(&mut events, IDLE).await);
    let last = statuses.last().unwrap();
    assert_eq!(last.download_state, DownloadState::Inactive);
    assert!(!last.is_complete());
    assert_eq!(
        statuses
            .iter()
            .filter(|status| status.download_state == DownloadState::Inactive)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_pause_is_silent_when_inactive_messages_disabled() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 4.0), RegionMetadata::default())
        .await
        .unwrap();
    let (observer, mut events) = ChannelObserver::channel();
    region.set_observer(Some(Arc::new(observer)));
    region.set_deliver_inactive_messages(false);

    region.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(1);
    wait_for_completed(&region, 1).await;
    region.set_download_state(DownloadState::Inactive).await;
    harness.transport.open_gate(100);
    within(region.wait_until_idle()).await;

    let events = collect_events(&mut events, IDLE).await;
    assert!(
        statuses(&events)
            .iter()
            .all(|status| status.download_state == DownloadState::Active)
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, RegionEvent::Error { .. }))
    );
}

#[tokio::test]
async fn test_abort_policy_does_not_wait_for_in_flight_fetches() {
    let config = OfflineConfig {
        max_concurrent_fetches: 2,
        pause_policy: PausePolicy::Abort,
        ..config()
    };
    let harness = Harness::new(ScriptedTransport::gated(), config).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 4.0), RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    harness.transport.open_gate(1);
    wait_for_completed(&region, 1).await;

    region.set_download_state(DownloadState::Inactive).await;
    // The gate stays closed: idle is only reachable by aborting.
    within(region.wait_until_idle()).await;

    assert_eq!(harness.store.tile_count().await.unwrap(), 0);
    assert_eq!(region.status().completed_resource_count, 1);
}

#[tokio::test]
async fn test_offline_override_holds_fetches_until_restored() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    harness.connectivity.set_connected(Some(false));
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(harness.transport.requests().is_empty());
    assert_eq!(region.download_state(), DownloadState::Active);

    harness.connectivity.set_connected(None);
    within(region.wait_until_idle()).await;
    assert!(region.status().is_complete());
}

#[tokio::test]
async fn test_pause_while_offline_ends_activation() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    harness.connectivity.set_connected(Some(false));
    let region = harness
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();

    region.set_download_state(DownloadState::Active).await;
    region.set_download_state(DownloadState::Inactive).await;
    within(region.wait_until_idle()).await;
    assert!(harness.transport.requests().is_empty());
    assert_eq!(region.download_state(), DownloadState::Inactive);
}

#[tokio::test]
async fn test_delete_refuses_active_region_unless_forced() {
    let harness = Harness::new(ScriptedTransport::gated(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 4.0), RegionMetadata::default())
        .await
        .unwrap();
    let id = region.id();

    region.set_download_state(DownloadState::Active).await;
    let busy = region.delete(false).await;
    assert!(matches!(busy, Err(RegionError::RegionBusy { .. })));

    harness.transport.open_gate(1000);
    within(region.delete(true)).await.unwrap();

    assert!(matches!(
        harness.manager.region(id).await,
        Err(RegionError::Store(StoreError::RegionNotFound { .. }))
    ));
    assert_eq!(harness.store.tile_count().await.unwrap(), 0);
    assert_eq!(harness.tile_limit.count(), 0);
}

#[tokio::test]
async fn test_delete_inactive_region_releases_tiles() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    let region = harness
        .manager
        .create_region(definition(0.0, 3.0), RegionMetadata::default())
        .await
        .unwrap();
    region.set_download_state(DownloadState::Active).await;
    within(region.wait_until_idle()).await;
    assert!(harness.tile_limit.count() > 0);

    region.delete(false).await.unwrap();
    assert_eq!(harness.tile_limit.count(), 0);
    assert!(harness.manager.list_regions().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_metadata_persists() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    let region = harness
        .manager
        .create_region(
            definition(0.0, 1.0),
            RegionMetadata::from_region_name("Lower Manhattan").unwrap(),
        )
        .await
        .unwrap();

    region
        .update_metadata(RegionMetadata::from_region_name("Midtown").unwrap())
        .await
        .unwrap();

    assert_eq!(region.metadata().region_name().as_deref(), Some("Midtown"));
    let stored = harness.store.list_regions().await.unwrap();
    assert_eq!(
        stored[0].metadata.region_name().as_deref(),
        Some("Midtown")
    );
}

#[tokio::test]
async fn test_reopen_resets_stale_active_region_and_resumes() {
    let first = Harness::new(ScriptedTransport::new(), config()).await;
    let region = first
        .manager
        .create_region(definition(0.0, 1.0), RegionMetadata::default())
        .await
        .unwrap();
    let id = region.id();
    first
        .store
        .set_download_state(id, DownloadState::Active)
        .await
        .unwrap();

    let second = Harness::with_store(ScriptedTransport::new(), config(), first.store.clone()).await;
    let reopened = second.manager.region(id).await.unwrap();
    assert_eq!(reopened.download_state(), DownloadState::Inactive);

    reopened.set_download_state(DownloadState::Active).await;
    within(reopened.wait_until_idle()).await;
    assert!(reopened.status().is_complete());
}

#[tokio::test]
async fn test_region_lookup_of_unknown_id_fails() {
    let harness = Harness::new(ScriptedTransport::new(), config()).await;
    let result = harness.manager.region(RegionId(404)).await;
    assert!(matches!(
        result,
        Err(RegionError::Store(StoreError::RegionNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_open() {
    let transport = Arc::new(ScriptedTransport::new());
    let fetcher = offline_regions::ResourceFetcher::new(
        transport,
        offline_regions::RetryPolicy::immediate(3),
    );
    let config = OfflineConfig {
        max_concurrent_fetches: 0,
        ..OfflineConfig::default()
    };
    let result = offline_regions::OfflineManager::open_with_tile_limit(
        Arc::new(offline_regions::MemoryRegionStore::new()),
        fetcher,
        config,
        Arc::new(offline_regions::Connectivity::default()),
        Arc::new(offline_regions::TileCountLimit::new(None)),
    )
    .await;
    assert!(matches!(result, Err(RegionError::Config(_))));
}
