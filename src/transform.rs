use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{
    rotate_about_center, warp_into, Interpolation, Projection,
};
use imageproc::geometry::contour_area;
use imageproc::point::Point as PixelPoint;
use tracing::{debug, warn};

use crate::geometry::OrderedQuad;

/// Post-processing applied around the perspective warp
#[derive(Debug, Clone)]
pub struct RectifyOptions {
    /// Width of the white border added on every side
    pub pad_pixels: u32,
    /// Append an opaque alpha channel (padding then becomes transparent)
    pub add_alpha: bool,
    /// Rotate portrait results by 90° so the card is wider than tall
    pub landscape: bool,
    /// Extra counter-clockwise rotation in degrees, applied before padding
    pub rotate_degrees: f64,
}

impl Default for RectifyOptions {
    fn default() -> Self {
        Self {
            pad_pixels: 20,
            add_alpha: true,
            landscape: true,
            rotate_degrees: 0.0,
        }
    }
}

/// Longest side of a rectified card before padding
pub const MAX_RECTIFIED_SIDE: u32 = 8192;

/// Largest image, in pixels, that padding may produce
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// Output dimensions of the flattened card, clamped to
/// `1..=MAX_RECTIFIED_SIDE` on each side
pub fn rectified_size(quad: &OrderedQuad) -> (u32, u32) {
    let width = quad.flattened_width().round();
    let height = quad.flattened_height().round();
    if !(width >= 1.0 && height >= 1.0) {
        warn!(width, height, "Degenerate quadrilateral, clamping output size");
    }
    let max = MAX_RECTIFIED_SIDE as f64;
    if width > max || height > max {
        warn!(width, height, max, "Oversized quadrilateral, clamping output size");
    }
    let clamp = |v: f64| if v.is_nan() { 1 } else { v.clamp(1.0, max) as u32 };
    (clamp(width), clamp(height))
}

/// Flatten the card region into an axis-aligned `w`×`h` image.
///
/// The source quadrilateral maps onto `[(0,0), (w-1,0), (w-1,h-1), (0,h-1)]`.
/// Samples that fall outside the source are black.
pub fn warp_perspective(img: &RgbImage, quad: &OrderedQuad) -> RgbImage {
    let (width, height) = rectified_size(quad);
    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let dest = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let src = quad.corners().map(|p| (p.x as f32, p.y as f32));

    let corners = quad.corners().map(|p| PixelPoint::new(p.x, p.y));
    let projection = if contour_area(&corners) < 1.0 {
        None
    } else {
        Projection::from_control_points(src, dest)
    };

    match projection {
        Some(projection) => {
            debug!(width, height, "Warping card region");
            let mut output = RgbImage::new(width, height);
            warp_into(img, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut output);
            output
        }
        None => {
            warn!(?quad, "Could not solve card homography, resizing whole image");
            imageops::resize(img, width, height, FilterType::Triangle)
        }
    }
}

/// Append a fully opaque alpha channel
pub fn add_alpha(img: RgbImage) -> RgbaImage {
    DynamicImage::ImageRgb8(img).into_rgba8()
}

/// Padded dimensions, or `None` when they overflow or exceed
/// `MAX_OUTPUT_PIXELS`
fn padded_size(width: u32, height: u32, pixels: u32) -> Option<(u32, u32)> {
    let border = pixels.checked_mul(2)?;
    let new_width = width.checked_add(border)?;
    let new_height = height.checked_add(border)?;
    if new_width as u64 * new_height as u64 > MAX_OUTPUT_PIXELS {
        return None;
    }
    Some((new_width, new_height))
}

/// Surround the image with a border `pixels` wide.
///
/// Colour channels are filled white; an alpha channel, if present, is
/// filled transparent. A border that would push the image past
/// `MAX_OUTPUT_PIXELS` is skipped.
pub fn pad(img: DynamicImage, pixels: u32) -> DynamicImage {
    if pixels == 0 {
        return img;
    }

    let (width, height) = img.dimensions();
    let Some((new_width, new_height)) = padded_size(width, height, pixels) else {
        warn!(width, height, pixels, "Padding too large, leaving image unpadded");
        return img;
    };
    let offset = pixels as i64;

    match img {
        DynamicImage::ImageRgba8(inner) => {
            let mut canvas = RgbaImage::from_pixel(new_width, new_height, Rgba([255, 255, 255, 0]));
            imageops::replace(&mut canvas, &inner, offset, offset);
            DynamicImage::ImageRgba8(canvas)
        }
        other if other.color().has_alpha() => {
            pad(DynamicImage::ImageRgba8(other.into_rgba8()), pixels)
        }
        other => {
            let mut canvas = RgbImage::from_pixel(new_width, new_height, Rgb([255, 255, 255]));
            imageops::replace(&mut canvas, &other.into_rgb8(), offset, offset);
            DynamicImage::ImageRgb8(canvas)
        }
    }
}

/// Rotate counter-clockwise by an arbitrary angle about the centre.
///
/// The canvas keeps its size; uncovered area is white, or transparent when
/// the image has alpha.
pub fn rotate(img: DynamicImage, degrees: f64) -> DynamicImage {
    if degrees == 0.0 {
        return img;
    }

    // rotate_about_center turns clockwise for positive angles
    let theta = (-degrees.to_radians()) as f32;
    if img.color().has_alpha() {
        let rgba = img.into_rgba8();
        DynamicImage::ImageRgba8(rotate_about_center(
            &rgba,
            theta,
            Interpolation::Bilinear,
            Rgba([255, 255, 255, 0]),
        ))
    } else {
        let rgb = img.into_rgb8();
        DynamicImage::ImageRgb8(rotate_about_center(
            &rgb,
            theta,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
        ))
    }
}

/// Rotate portrait images by 90° clockwise; landscape and square images
/// are returned unchanged.
pub fn normalize_landscape(img: DynamicImage) -> DynamicImage {
    if img.height() > img.width() {
        debug!(width = img.width(), height = img.height(), "Rotating portrait image");
        img.rotate90()
    } else {
        img
    }
}

/// Flatten, pad and orient the card region of `img`.
///
/// Never fails: degenerate quadrilaterals produce a best-effort image of at
/// least one pixel.
pub fn rectify(img: &RgbImage, quad: &OrderedQuad, options: &RectifyOptions) -> DynamicImage {
    let warped = warp_perspective(img, quad);

    let mut out = if options.add_alpha {
        DynamicImage::ImageRgba8(add_alpha(warped))
    } else {
        DynamicImage::ImageRgb8(warped)
    };

    out = rotate(out, options.rotate_degrees);
    out = pad(out, options.pad_pixels);

    if options.landscape {
        out = normalize_landscape(out);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, RawQuad};

    fn axis_quad(x: f64, y: f64, w: f64, h: f64) -> OrderedQuad {
        RawQuad([
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
        .order()
    }

    fn no_extras() -> RectifyOptions {
        RectifyOptions {
            pad_pixels: 0,
            add_alpha: false,
            landscape: false,
            rotate_degrees: 0.0,
        }
    }

    #[test]
    fn test_rectified_size_uses_longer_edges() {
        let quad = RawQuad([
            Point::new(10.0, 10.0),
            Point::new(310.0, 20.0),
            Point::new(300.0, 200.0),
            Point::new(20.0, 180.0),
        ])
        .order();
        let (w, h) = rectified_size(&quad);
        assert_eq!(w, quad.flattened_width().round() as u32);
        assert_eq!(h, quad.flattened_height().round() as u32);
        assert!(w as f64 >= (300.0f64 * 300.0 + 10.0 * 10.0).sqrt().round());
    }

    #[test]
    fn test_degenerate_quad_clamps_to_one_pixel() {
        let quad = axis_quad(5.0, 5.0, 0.0, 0.0);
        assert_eq!(rectified_size(&quad), (1, 1));
        let img = RgbImage::from_pixel(20, 20, Rgb([9, 9, 9]));
        let out = rectify(&img, &quad, &no_extras());
        assert_eq!(out.dimensions(), (1, 1));
    }

    #[test]
    fn test_warp_copies_axis_aligned_region() {
        let mut img = RgbImage::from_pixel(100, 80, Rgb([0, 0, 0]));
        for y in 20..60 {
            for x in 10..90 {
                img.put_pixel(x, y, Rgb([200, 50, 10]));
            }
        }
        let out = rectify(&img, &axis_quad(10.0, 20.0, 79.0, 39.0), &no_extras());
        assert_eq!(out.dimensions(), (79, 39));
        assert_eq!(out.get_pixel(40, 20), Rgba([200, 50, 10, 255]));
    }

    #[test]
    fn test_warp_trapezoid_centre() {
        // Red photo with a green patch around where the trapezoid's
        // diagonals cross, which lands on the centre of the output
        let mut img = RgbImage::from_pixel(200, 150, Rgb([220, 20, 20]));
        for y in 55..75 {
            for x in 90..110 {
                img.put_pixel(x, y, Rgb([20, 200, 20]));
            }
        }
        let quad = RawQuad([
            Point::new(50.0, 30.0),
            Point::new(150.0, 30.0),
            Point::new(180.0, 120.0),
            Point::new(20.0, 120.0),
        ])
        .order();

        let out = rectify(&img, &quad, &no_extras());
        let (w, h) = out.dimensions();
        assert_eq!((w, h), (160, 95));
        assert_eq!(out.get_pixel(w / 2, h / 2), Rgba([20, 200, 20, 255]));
        assert_eq!(out.get_pixel(3, 3), Rgba([220, 20, 20, 255]));
        assert_eq!(out.get_pixel(w - 4, h - 4), Rgba([220, 20, 20, 255]));
    }

    #[test]
    fn test_oversized_quad_is_clamped() {
        let quad = axis_quad(0.0, 0.0, 1e12, 1e12);
        assert_eq!(rectified_size(&quad), (MAX_RECTIFIED_SIDE, MAX_RECTIFIED_SIDE));
    }

    #[test]
    fn test_oversized_padding_is_skipped() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        assert_eq!(pad(img.clone(), 3_000_000_000).dimensions(), (10, 10));
        assert_eq!(pad(img, 20_000).dimensions(), (10, 10));
        assert_eq!(padded_size(10, 10, 2), Some((14, 14)));
        assert_eq!(padded_size(u32::MAX, 10, 1), None);
    }

    #[test]
    fn test_padding_is_symmetric() {
        let img = RgbImage::from_pixel(100, 80, Rgb([0, 0, 0]));
        let quad = axis_quad(10.0, 10.0, 60.0, 30.0);
        let options = RectifyOptions { pad_pixels: 7, ..no_extras() };
        let out = rectify(&img, &quad, &options);
        assert_eq!(out.dimensions(), (60 + 14, 30 + 14));
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_alpha_padding_is_transparent_white() {
        let img = RgbImage::from_pixel(100, 80, Rgb([0, 0, 0]));
        let quad = axis_quad(10.0, 10.0, 60.0, 30.0);
        let options = RectifyOptions {
            pad_pixels: 5,
            add_alpha: true,
            ..no_extras()
        };
        let out = rectify(&img, &quad, &options);
        assert!(out.color().has_alpha());
        assert_eq!(out.get_pixel(2, 2), Rgba([255, 255, 255, 0]));
        assert_eq!(out.get_pixel(30, 20), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_portrait_result_is_rotated() {
        let img = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
        let quad = axis_quad(10.0, 10.0, 30.0, 60.0);
        let options = RectifyOptions { landscape: true, ..no_extras() };
        let out = rectify(&img, &quad, &options);
        assert_eq!(out.dimensions(), (60, 30));
    }

    #[test]
    fn test_normalize_landscape_is_fixed_point() {
        let portrait = DynamicImage::ImageRgb8(RgbImage::new(30, 50));
        let once = normalize_landscape(portrait);
        assert_eq!(once.dimensions(), (50, 30));
        let twice = normalize_landscape(once.clone());
        assert_eq!(twice.dimensions(), once.dimensions());
        assert_eq!(twice.as_bytes(), once.as_bytes());
    }

    #[test]
    fn test_rotate_keeps_canvas_size() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(40, 20, Rgba([0, 0, 0, 255])));
        let out = rotate(img, 90.0);
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.get_pixel(0, 0), Rgba([255, 255, 255, 0]));
    }
}
