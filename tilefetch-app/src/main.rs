//! Flies a short camera path over OpenStreetMap and logs what the tile
//! engine does. Pass a JSON config file as the only argument to override
//! the defaults; `TILEFETCH_PIXEL_RATIO` picks the zoom offset otherwise.

use anyhow::Context;
use crossbeam_channel::Receiver;
use tilefetch::prelude::*;

/// How long each camera position is held before moving on
const FRAME: Duration = Duration::from_millis(250);
const TICK: Duration = Duration::from_millis(20);

fn pixel_ratio() -> f64 {
    std::env::var("TILEFETCH_PIXEL_RATIO")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0)
}

fn load_config() -> anyhow::Result<TileLayerConfig> {
    match std::env::args().nth(1) {
        Some(path) => TileLayerConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {}", path)),
        None => Ok(TileLayerConfig {
            max_requests: 20,
            ..TileLayerConfig::for_pixel_ratio(pixel_ratio())
        }),
    }
}

/// Heathrow area: pan east, zoom in, rotate, then jump back to the start
fn camera_path() -> Vec<Viewport> {
    let size = Point::new(1280.0, 720.0);
    let start = Viewport::new(LatLng::new(51.47, 0.45), 10.0, size).with_pitch(30.0);

    let mut path = vec![start.clone()];
    for step in 1..=4 {
        let lng = 0.45 + 0.1 * step as f64;
        path.push(Viewport::new(LatLng::new(51.47, lng), 10.0, size).with_pitch(30.0));
    }
    for zoom in [11.0, 12.0, 13.0] {
        path.push(Viewport::new(LatLng::new(51.47, 0.85), zoom, size).with_pitch(30.0));
    }
    path.push(
        Viewport::new(LatLng::new(51.47, 0.85), 13.0, size)
            .with_pitch(45.0)
            .with_bearing(30.0),
    );
    path.push(start);
    path
}

fn log_events(events: &Receiver<TileEvent>) {
    for event in events.try_iter() {
        match event {
            TileEvent::Ready { coord, payload } => {
                log::debug!("ready {} ({} bytes)", coord, payload.byte_len())
            }
            TileEvent::Error { coord, error } => log::warn!("tile {} failed: {}", coord, error),
            TileEvent::Evicted { coord } => log::debug!("evicted {}", coord),
            TileEvent::LoadingStateChanged(LoadingState::Loading) => log::info!("LOADING"),
            TileEvent::LoadingStateChanged(LoadingState::Idle) => log::info!("all visible tiles loaded"),
        }
    }
}

async fn replay(layer: &mut TileLayer, events: &Receiver<TileEvent>) {
    for (frame, viewport) in camera_path().iter().enumerate() {
        let needed = layer.set_viewport(viewport);
        log::info!(
            "frame {}: {:.2},{:.2} z{} needs {} tiles",
            frame,
            viewport.center.lat,
            viewport.center.lng,
            needed.zoom,
            needed.len()
        );

        let frame_end = Instant::now() + FRAME;
        while Instant::now() < frame_end {
            layer.pump();
            log_events(events);
            tokio::time::sleep(TICK).await;
        }
    }

    if !layer.wait_until_idle(Duration::from_secs(30)).await {
        log::warn!("gave up waiting for the last tiles");
    }
    log_events(events);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tilefetch::init_logging();

    let config = load_config()?;
    let mut layer = TileLayer::openstreetmap("osm", config)?;
    let events = layer.events();

    let interrupted = tokio::select! {
        _ = replay(&mut layer, &events) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if interrupted {
        log::info!("interrupted, cancelling outstanding requests");
        layer.scheduler_mut().cancel_all();
    }

    let stats = layer.scheduler().stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
