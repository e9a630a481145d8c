//! Shared helpers for region download integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use offline_regions::{
    Connectivity, LatLngBounds, MemoryRegionStore, OfflineConfig, OfflineManager, RegionDefinition,
    RegionEvent, RegionStatus, ResourceFetcher, RetryPolicy, TileCountLimit, Transport,
    TransportError, TransportResponse,
};
use tokio::sync::{Semaphore, mpsc};

pub const STYLE_URL: &str = "https://maps.example.com/styles/streets.json";
pub const TILE_TEMPLATE: &str = "https://tiles.example.com/{z}/{x}/{y}.pbf";

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(u16, Vec<u8>),
    Timeout,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self::Body(200, body.to_vec())
    }

    pub fn status(status: u16) -> Self {
        Self::Body(status, Vec::new())
    }
}

/// In-process transport.
///
/// Scripted replies are consumed first; afterwards the style URL answers
/// with an empty style and every other URL answers with its own bytes.
/// With a gate installed, each request waits for one gate permit.
#[derive(Debug)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::default(),
            requests: Mutex::default(),
            gate: None,
        }
    }

    /// Transport whose requests block until [`open_gate`](Self::open_gate) releases them.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    pub fn open_gate(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, url: &str, _timeout: Duration) -> Result<TransportResponse, TransportError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?
                .forget();
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let next = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Reply::Body(status, body)) => Ok(TransportResponse::new(status, body)),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            None if url == STYLE_URL => Ok(TransportResponse::new(200, br#"{"version":8}"#.to_vec())),
            None => Ok(TransportResponse::new(200, url.as_bytes().to_vec())),
        }
    }
}

/// Small box near Manhattan; one tile per zoom at low zooms.
pub fn manhattan() -> LatLngBounds {
    LatLngBounds::new(40.70, -74.02, 40.80, -73.93)
}

pub fn definition(min_zoom: f64, max_zoom: f64) -> RegionDefinition {
    RegionDefinition::new(STYLE_URL, TILE_TEMPLATE, manhattan(), min_zoom, max_zoom, 1.0)
        .expect("valid definition")
}

/// Exactly ten tiles: five columns by two rows at zoom 4.
pub fn ten_tile_definition() -> RegionDefinition {
    RegionDefinition::new(
        STYLE_URL,
        TILE_TEMPLATE,
        LatLngBounds::new(-10.0, -179.9, 10.0, -67.6),
        4.0,
        4.0,
        1.0,
    )
    .expect("valid definition")
}

pub fn config() -> OfflineConfig {
    OfflineConfig {
        offline_poll_interval: Duration::from_millis(10),
        ..OfflineConfig::default()
    }
}

pub struct Harness {
    pub manager: OfflineManager,
    pub transport: Arc<ScriptedTransport>,
    pub store: Arc<MemoryRegionStore>,
    pub connectivity: Arc<Connectivity>,
    pub tile_limit: Arc<TileCountLimit>,
}

impl Harness {
    pub async fn new(transport: ScriptedTransport, config: OfflineConfig) -> Self {
        Self::with_store(transport, config, Arc::new(MemoryRegionStore::new())).await
    }

    pub async fn with_store(
        transport: ScriptedTransport,
        config: OfflineConfig,
        store: Arc<MemoryRegionStore>,
    ) -> Self {
        let transport = Arc::new(transport);
        let fetcher = ResourceFetcher::new(transport.clone(), RetryPolicy::immediate(3));
        let connectivity = Arc::new(Connectivity::default());
        let tile_limit = Arc::new(TileCountLimit::new(None));
        let manager = OfflineManager::open_with_tile_limit(
            store.clone(),
            fetcher,
            config,
            connectivity.clone(),
            tile_limit.clone(),
        )
        .await
        .expect("manager opens");
        Self {
            manager,
            transport,
            store,
            connectivity,
            tile_limit,
        }
    }
}

/// Receives events until the channel stays quiet for `idle`.
pub async fn collect_events(
    events: &mut mpsc::UnboundedReceiver<RegionEvent>,
    idle: Duration,
) -> Vec<RegionEvent> {
    let mut collected = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(idle, events.recv()).await {
        collected.push(event);
    }
    collected
}

pub fn statuses(events: &[RegionEvent]) -> Vec<RegionStatus> {
    events
        .iter()
        .filter_map(|event| match event {
            RegionEvent::StatusChanged(status) => Some(*status),
            _ => None,
        })
        .collect()
}

/// Bounds a test's wait so a hang fails instead of stalling the suite.
pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}
