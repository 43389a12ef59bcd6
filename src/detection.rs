use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{arc_length, contour_area, min_area_rect};
use imageproc::morphology::dilate;
use imageproc::point::Point as PixelPoint;
use tracing::{debug, info};

use crate::geometry::{approximate_closed_polygon, edge_length, OrderedQuad, Point, RawQuad};

/// Tunable parameters of the card detector.
///
/// The defaults were tuned empirically on phone photos of ID-1 cards.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Longest side of the working copy used for detection
    pub max_side: u32,
    /// Gaussian sigma applied before edge detection.
    ///
    /// `canny` blurs again internally with sigma 1.4, so the effective sigma
    /// is about `sqrt(blur_sigma² + 1.4²)`, roughly 1.8 with the default.
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Dilation radius under the L∞ norm (1 = 3×3 structuring element)
    pub dilate_radius: u8,
    /// Polygon approximation tolerance as a fraction of contour perimeter
    pub approx_epsilon_ratio: f64,
    /// Smallest accepted quadrilateral, as a fraction of the working image area
    pub min_area_ratio: f64,
    /// Accepted long-to-short side ratio of the bounding rectangle
    pub min_aspect: f64,
    pub max_aspect: f64,
    /// Weight of the edge-length term in the candidate score
    pub edge_weight: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_side: 1000,
            blur_sigma: 1.1,
            canny_low: 50.0,
            canny_high: 150.0,
            dilate_radius: 1,
            approx_epsilon_ratio: 0.02,
            min_area_ratio: 0.02,
            min_aspect: 1.2,
            max_aspect: 2.2,
            edge_weight: 0.5,
        }
    }
}

/// A quadrilateral that survived every shape filter
#[derive(Debug, Clone)]
struct Candidate {
    quad: OrderedQuad,
    score: f64,
}

/// Downscale so the longest side is at most `max_side`.
///
/// Returns the working image and the factor that maps original coordinates
/// onto it (1.0 when no resize was needed).
fn resize_for_processing(gray: &GrayImage, max_side: u32) -> (GrayImage, f64) {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);
    if longest <= max_side {
        return (gray.clone(), 1.0);
    }

    let scale = max_side as f64 / longest as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    let resized = imageops::resize(gray, new_width, new_height, FilterType::Triangle);
    (resized, scale)
}

/// Blur, Canny and dilate into a closed edge map
fn edge_map(gray: &GrayImage, config: &DetectorConfig) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, config.blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    dilate(&edges, Norm::LInf, config.dilate_radius)
}

fn to_point(p: PixelPoint<i32>) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

/// Apply the shape filters to one contour and score it
fn evaluate_contour(
    contour: &[PixelPoint<i32>],
    min_area: f64,
    config: &DetectorConfig,
) -> Option<Candidate> {
    let epsilon = config.approx_epsilon_ratio * arc_length(contour, true);
    if epsilon <= 0.0 {
        return None;
    }

    let outline: Vec<Point> = contour.iter().copied().map(to_point).collect();
    let approx: Vec<PixelPoint<i32>> = approximate_closed_polygon(&outline, epsilon)
        .iter()
        .map(|p| PixelPoint::new(p.x.round() as i32, p.y.round() as i32))
        .collect();
    if approx.len() != 4 {
        return None;
    }

    let area = contour_area(&approx);
    if area < min_area {
        return None;
    }

    let rect = min_area_rect(&approx).map(to_point);
    let rect_w = edge_length(&rect[0], &rect[1]);
    let rect_h = edge_length(&rect[1], &rect[2]);
    if rect_w == 0.0 || rect_h == 0.0 {
        return None;
    }
    let ratio = rect_w.max(rect_h) / rect_w.min(rect_h).max(1.0);
    if ratio < config.min_aspect || ratio > config.max_aspect {
        debug!(area, ratio, "Rejected quadrilateral: aspect ratio");
        return None;
    }

    let quad = RawQuad([approx[0], approx[1], approx[2], approx[3]].map(to_point)).order();
    let width = edge_length(&quad.top_left, &quad.top_right);
    let height = edge_length(&quad.top_left, &quad.bottom_left);
    let score = area + config.edge_weight * (width + height);

    debug!(area, ratio, score, "Accepted candidate quadrilateral");
    Some(Candidate { quad, score })
}

/// Locate the most card-like quadrilateral in an image.
///
/// Returns `None` when nothing passes the shape filters; that is an expected
/// outcome, not a failure. The returned corners are in original image
/// coordinates and canonically ordered.
pub fn detect_card(img: &DynamicImage, config: &DetectorConfig) -> Option<OrderedQuad> {
    let gray = img.to_luma8();
    let (working, scale) = resize_for_processing(&gray, config.max_side);
    let (width, height) = working.dimensions();

    let edges = edge_map(&working, config);

    // Only outer borders with no enclosing border: the card outline, not
    // anything printed on it
    let contours = find_contours::<i32>(&edges);
    let min_area = config.min_area_ratio * width as f64 * height as f64;

    let external: Vec<&[PixelPoint<i32>]> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| c.points.len() >= 4)
        .map(|c| c.points.as_slice())
        .collect();

    debug!(
        total = contours.len(),
        external = external.len(),
        width,
        height,
        "Extracted contours"
    );

    let best = external
        .iter()
        .filter_map(|c| evaluate_contour(c, min_area, config))
        .fold(None, |best: Option<Candidate>, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        });

    match best {
        Some(candidate) => {
            let quad = candidate.quad.unscaled(scale);
            info!(score = candidate.score, ?quad, "Detected card outline");
            Some(quad)
        }
        None => {
            info!("No card outline found");
            None
        }
    }
}
