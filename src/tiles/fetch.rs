//! Tile I/O: fetching bytes and turning them into payloads

use super::TileError;
use crate::core::config::TileLayerConfig;
use crate::core::geo::TileCoord;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Shared async HTTP client with a custom User-Agent so that public tile
/// servers (e.g. OpenStreetMap) don't reject the request. Building the client
/// once avoids the cost of TLS and connection pool setup for every tile.
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(crate::core::constants::DEFAULT_USER_AGENT)
        .timeout(std::time::Duration::from_millis(
            crate::core::constants::DEFAULT_FETCH_TIMEOUT_MS,
        ))
        .pool_max_idle_per_host(16)
        .build()
        .expect("failed to build reqwest async client")
});

/// RGBA8 pixels of a decoded tile image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// What the consumer receives for a loaded tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TilePayload {
    /// Undecoded bytes as served
    Raw(Arc<Vec<u8>>),
    Image(Arc<DecodedImage>),
}

impl TilePayload {
    /// Approximate memory held by the payload
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Raw(bytes) => bytes.len(),
            Self::Image(image) => image.pixels.len(),
        }
    }

    pub fn as_image(&self) -> Option<&DecodedImage> {
        match self {
            Self::Image(image) => Some(image),
            Self::Raw(_) => None,
        }
    }
}

impl From<Vec<u8>> for TilePayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(Arc::new(bytes))
    }
}

/// Transport for tile bytes. Implementations must be cancel-safe: the
/// future may be dropped at any await point.
#[async_trait]
pub trait TileFetcher: Send + Sync {
    async fn fetch(&self, coord: TileCoord, url: &str) -> std::result::Result<Vec<u8>, TileError>;
}

/// HTTP(S) transport on `reqwest`
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Uses the process-wide client with default timeout and user agent
    pub fn shared() -> Self {
        Self {
            client: HTTP_CLIENT.clone(),
        }
    }

    /// Builds a dedicated client honouring the config's timeout and user agent
    pub fn with_config(config: &TileLayerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.fetch_timeout())
            .pool_max_idle_per_host(config.max_requests.max(1))
            .build()?;
        Ok(Self { client })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::shared()
    }
}

#[async_trait]
impl TileFetcher for HttpFetcher {
    async fn fetch(&self, coord: TileCoord, url: &str) -> std::result::Result<Vec<u8>, TileError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TileError::FetchFailed {
                coord,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TileError::HttpStatus {
                coord,
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| TileError::FetchFailed {
            coord,
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

/// Turns fetched bytes into a payload. Runs on the fetch task, never on the
/// scheduler's thread.
pub trait TileDecoder: Send + Sync {
    fn decode(&self, coord: TileCoord, bytes: Vec<u8>) -> std::result::Result<TilePayload, TileError>;
}

/// Hands bytes through untouched; empty bodies are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl TileDecoder for RawDecoder {
    fn decode(&self, coord: TileCoord, bytes: Vec<u8>) -> std::result::Result<TilePayload, TileError> {
        if bytes.is_empty() {
            return Err(TileError::DecodeFailed {
                coord,
                reason: "empty body".into(),
            });
        }
        Ok(TilePayload::from(bytes))
    }
}

/// Decodes PNG/JPEG into RGBA8 with the `image` crate
#[cfg(feature = "decode")]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

#[cfg(feature = "decode")]
impl TileDecoder for ImageDecoder {
    fn decode(&self, coord: TileCoord, bytes: Vec<u8>) -> std::result::Result<TilePayload, TileError> {
        let image = image::load_from_memory(&bytes).map_err(|e| TileError::DecodeFailed {
            coord,
            reason: e.to_string(),
        })?;
        let rgba = image.to_rgba8();
        Ok(TilePayload::Image(Arc::new(DecodedImage {
            width: rgba.width(),
            height: rgba.height(),
            pixels: rgba.into_raw(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_decoder() {
        let coord = TileCoord::new(0, 0, 0);
        let payload = RawDecoder.decode(coord, vec![1, 2, 3]).unwrap();
        assert_eq!(payload.byte_len(), 3);
        assert!(payload.as_image().is_none());
        assert!(matches!(
            RawDecoder.decode(coord, Vec::new()),
            Err(TileError::DecodeFailed { .. })
        ));
    }

    #[cfg(feature = "decode")]
    #[test]
    fn test_image_decoder() {
        use image::{ImageBuffer, ImageOutputFormat, Rgba};
        use std::io::Cursor;

        let coord = TileCoord::new(1, 1, 1);
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> = ImageBuffer::from_pixel(4, 2, Rgba([9, 8, 7, 255]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageOutputFormat::Png).unwrap();

        let payload = ImageDecoder.decode(coord, png.into_inner()).unwrap();
        let decoded = payload.as_image().unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 2));
        assert_eq!(&decoded.pixels[..4], &[9, 8, 7, 255]);
        assert_eq!(payload.byte_len(), 4 * 2 * 4);

        assert!(matches!(
            ImageDecoder.decode(coord, b"<html>rate limited</html>".to_vec()),
            Err(TileError::DecodeFailed { .. })
        ));
    }
}
