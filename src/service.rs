//! Interactive correction: detect a quadrilateral, let a person adjust it,
//! warp with the adjusted corners, then export the page.
//!
//! Request and response types mirror the JSON bodies of the web front end;
//! transport (multipart upload, routing, static files) is left to the host.

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::codec::{decode, decode_base64_payload, encode, png_data_uri};
use crate::detection::{detect_card, DetectorConfig};
use crate::error::{CardError, Result};
use crate::geometry::{OrderedQuad, Point, RawQuad};
use crate::layout::{compose, CardSpec, PageLayout};
use crate::transform::{rectify, RectifyOptions, MAX_OUTPUT_PIXELS, MAX_RECTIFIED_SIDE};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub width: u32,
    pub height: u32,
    pub quad: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarpRequest {
    pub image_base64: String,
    pub quad: Vec<[f64; 2]>,
    #[serde(default)]
    pub rotate: f64,
    #[serde(default = "default_pad")]
    pub pad_px: u32,
    #[serde(default = "default_refine")]
    pub refine: bool,
}

fn default_pad() -> u32 {
    20
}

fn default_refine() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpResponse {
    pub image_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub front_base64: String,
    pub back_base64: String,
}

/// Parse a JSON request body, mapping any shape mismatch to `InvalidPayload`
pub fn parse_request<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|err| CardError::InvalidPayload(err.to_string()))
}

/// Centred box used when detection finds nothing: 40% of the width and 30%
/// of the height either side of the centre.
pub fn default_quad(width: u32, height: u32) -> [[f64; 2]; 4] {
    let (cx, cy) = ((width / 2) as f64, (height / 2) as f64);
    let dw = (width as f64 * 0.4).floor();
    let dh = (height as f64 * 0.3).floor();
    [
        [cx - dw, cy - dh],
        [cx + dw, cy - dh],
        [cx + dw, cy + dh],
        [cx - dw, cy + dh],
    ]
}

fn to_quad(points: &[[f64; 2]]) -> Result<RawQuad> {
    let corners: [[f64; 2]; 4] = points.try_into().map_err(|_| {
        CardError::InvalidPayload(format!("quad needs 4 points, got {}", points.len()))
    })?;
    if corners.iter().flatten().any(|v| !v.is_finite()) {
        return Err(CardError::InvalidPayload("quad has non-finite coordinates".into()));
    }
    Ok(RawQuad(corners.map(|[x, y]| Point::new(x, y))))
}

/// Reject corners and padding whose output would exceed the size limits
fn check_output_size(quad: &OrderedQuad, pad_px: u32) -> Result<()> {
    let width = quad.flattened_width().round();
    let height = quad.flattened_height().round();
    let max = MAX_RECTIFIED_SIDE as f64;
    if !(width <= max && height <= max) {
        return Err(CardError::InvalidPayload(format!(
            "quad of {}x{} exceeds {} px per side",
            width, height, MAX_RECTIFIED_SIDE
        )));
    }

    let border = 2.0 * pad_px as f64;
    let pixels = (width.max(1.0) + border) * (height.max(1.0) + border);
    if pixels > MAX_OUTPUT_PIXELS as f64 {
        return Err(CardError::InvalidPayload(format!(
            "padding of {} px exceeds output limit of {} pixels",
            pad_px, MAX_OUTPUT_PIXELS
        )));
    }
    Ok(())
}

/// Stateless handler set for the interactive correction flow.
///
/// Construct one and share it across request threads; every call works on
/// its own buffers.
#[derive(Debug, Clone)]
pub struct CorrectionService {
    pub detector: DetectorConfig,
    pub card: CardSpec,
    pub page: PageLayout,
    pub max_upload_bytes: usize,
}

impl Default for CorrectionService {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            card: CardSpec::default(),
            page: PageLayout::default(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl CorrectionService {
    pub fn new(detector: DetectorConfig) -> Self {
        Self {
            detector,
            ..Self::default()
        }
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_upload_bytes {
            return Err(CardError::InvalidPayload(format!(
                "upload of {} bytes exceeds limit of {}",
                len, self.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Best-guess corners for an uploaded photo, or the centred default box
    #[instrument(skip(self, bytes), fields(bytes_len = bytes.len()))]
    pub fn detect(&self, bytes: &[u8]) -> Result<DetectResponse> {
        self.check_size(bytes.len())?;
        let img = decode(bytes)?;
        let (width, height) = img.dimensions();

        let quad = match detect_card(&img, &self.detector) {
            Some(quad) => quad.corners().map(|p| [p.x, p.y]).to_vec(),
            None => {
                warn!(width, height, "Detection missed, returning default box");
                default_quad(width, height).to_vec()
            }
        };

        Ok(DetectResponse {
            width,
            height,
            quad,
        })
    }

    /// Rectify with caller-supplied corners and return a PNG data URI
    #[instrument(skip(self, request), fields(rotate = request.rotate, pad_px = request.pad_px))]
    pub fn warp(&self, request: &WarpRequest) -> Result<WarpResponse> {
        let quad = to_quad(&request.quad)?.order();
        check_output_size(&quad, request.pad_px)?;
        let raw = decode_base64_payload(&request.image_base64)?;
        self.check_size(raw.len())?;
        let img = decode(&raw)?;

        let options = RectifyOptions {
            pad_pixels: request.pad_px,
            add_alpha: request.refine,
            landscape: false,
            rotate_degrees: request.rotate,
        };
        let warped = rectify(&img.to_rgb8(), &quad, &options);
        let png = encode(&warped, ImageFormat::Png)?;

        info!(
            width = warped.width(),
            height = warped.height(),
            png_len = png.len(),
            "Warped card"
        );
        Ok(WarpResponse {
            image_base64: png_data_uri(&png),
        })
    }

    /// Compose two rectified sides into a PDF
    #[instrument(skip(self, request))]
    pub fn export(&self, request: &ExportRequest) -> Result<Vec<u8>> {
        if request.front_base64.is_empty() || request.back_base64.is_empty() {
            return Err(CardError::InvalidPayload("missing images".into()));
        }
        let front = self.decode_side(&request.front_base64)?;
        let back = self.decode_side(&request.back_base64)?;
        Ok(compose(front, back, &self.card, &self.page))
    }

    fn decode_side(&self, payload: &str) -> Result<DynamicImage> {
        let raw = decode_base64_payload(payload)?;
        self.check_size(raw.len())?;
        decode(&raw)
    }
}
