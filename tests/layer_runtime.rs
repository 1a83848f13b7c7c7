//! TileLayer on a real tokio runtime with an in-memory transport

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tilefetch::prelude::*;

/// Answers after a short delay and records peak concurrency
#[derive(Default)]
struct SlowServer {
    active: AtomicUsize,
    peak: AtomicUsize,
    served: AtomicUsize,
}

#[async_trait]
impl TileFetcher for SlowServer {
    async fn fetch(&self, coord: TileCoord, _url: &str) -> std::result::Result<Vec<u8>, TileError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.served.fetch_add(1, Ordering::SeqCst);
        Ok(vec![coord.z; 64])
    }
}

fn layer(server: Arc<SlowServer>, config: TileLayerConfig) -> TileLayer {
    let source = UrlTemplateSource::new(
        [
            "https://a.tiles.test/{z}/{x}/{y}.png",
            "https://b.tiles.test/{z}/{x}/{y}.png",
        ],
        config.mirror_selection,
    )
    .unwrap();
    TileLayer::new(
        "runtime-test",
        config,
        Arc::new(source),
        server,
        Arc::new(RawDecoder),
        Arc::new(TokioSpawner::current().unwrap()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_viewport_loads_to_idle() {
    let server = Arc::new(SlowServer::default());
    let config = TileLayerConfig {
        max_requests: 3,
        ..Default::default()
    };
    let mut layer = layer(server.clone(), config);
    let events = layer.events();

    let viewport = Viewport::new(LatLng::new(51.47, -0.45), 10.0, Point::new(1024.0, 768.0));
    let needed = layer.set_viewport(&viewport).len();
    assert!(needed > 3);
    assert!(layer.is_loading());

    assert!(layer.wait_until_idle(Duration::from_secs(5)).await);
    assert_eq!(layer.ready_tiles().len(), needed);
    assert!(server.peak.load(Ordering::SeqCst) <= 3);

    let ready = events
        .try_iter()
        .filter(|event| matches!(event, TileEvent::Ready { .. }))
        .count();
    assert_eq!(ready, needed);
}

#[tokio::test]
async fn test_panning_back_reuses_cache() {
    let server = Arc::new(SlowServer::default());
    let mut layer = layer(server.clone(), TileLayerConfig::default());

    let home = Viewport::new(LatLng::new(48.85, 2.35), 12.0, Point::new(512.0, 512.0));
    let away = Viewport::new(LatLng::new(40.71, -74.0), 12.0, Point::new(512.0, 512.0));

    layer.set_viewport(&home);
    assert!(layer.wait_until_idle(Duration::from_secs(5)).await);
    let first_pass = server.served.load(Ordering::SeqCst);

    layer.set_viewport(&away);
    assert!(layer.wait_until_idle(Duration::from_secs(5)).await);
    let second_pass = server.served.load(Ordering::SeqCst);

    layer.set_viewport(&home);
    assert!(!layer.is_loading());
    assert!(layer.wait_until_idle(Duration::from_secs(1)).await);
    assert_eq!(server.served.load(Ordering::SeqCst), second_pass);
    assert!(second_pass > first_pass);
}

#[tokio::test]
async fn test_loading_banner_toggles_once_per_burst() {
    let server = Arc::new(SlowServer::default());
    let mut layer = layer(server, TileLayerConfig::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    layer.on_loading_change(move |state| sink.lock().unwrap().push(state));

    // Several quick pans while tiles are still arriving
    for lng in [0.0, 0.5, 1.0, 1.5] {
        let viewport = Viewport::new(LatLng::new(10.0, lng), 9.0, Point::new(800.0, 600.0));
        layer.set_viewport(&viewport);
        layer.pump();
    }
    assert!(layer.wait_until_idle(Duration::from_secs(5)).await);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&LoadingState::Loading));
    assert_eq!(seen.last(), Some(&LoadingState::Idle));
    assert_eq!(
        seen.iter().filter(|s| **s == LoadingState::Loading).count(),
        seen.iter().filter(|s| **s == LoadingState::Idle).count()
    );
}

#[tokio::test]
async fn test_config_from_json_drives_layer() {
    let config = TileLayerConfig::from_json_str(
        r#"{ "max_requests": 2, "max_zoom": 5, "mirror_selection": "by_coordinate" }"#,
    )
    .unwrap();
    let server = Arc::new(SlowServer::default());
    let mut layer = layer(server.clone(), config);

    let viewport = Viewport::new(LatLng::new(0.0, 0.0), 14.0, Point::new(600.0, 400.0));
    assert_eq!(layer.set_viewport(&viewport).zoom, 5);
    assert!(layer.wait_until_idle(Duration::from_secs(5)).await);
    assert!(server.peak.load(Ordering::SeqCst) <= 2);
}
