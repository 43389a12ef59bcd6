use image::DynamicImage;
use tracing::{info, warn};

use crate::codec::decode;
use crate::detection::{detect_card, DetectorConfig};
use crate::error::Result;
use crate::geometry::OrderedQuad;
use crate::layout::{compose, CardSpec, PageLayout};
use crate::transform::{normalize_landscape, rectify, RectifyOptions};

/// Outcome of extracting one card side from a photo
#[derive(Debug, Clone)]
pub enum Extraction {
    /// A card outline was found and flattened
    Rectified {
        image: DynamicImage,
        quad: OrderedQuad,
    },
    /// No outline was found; the whole photo was kept
    Fallback { image: DynamicImage },
}

impl Extraction {
    pub fn image(&self) -> &DynamicImage {
        match self {
            Extraction::Rectified { image, .. } | Extraction::Fallback { image } => image,
        }
    }

    pub fn into_image(self) -> DynamicImage {
        match self {
            Extraction::Rectified { image, .. } | Extraction::Fallback { image } => image,
        }
    }

    pub fn quad(&self) -> Option<&OrderedQuad> {
        match self {
            Extraction::Rectified { quad, .. } => Some(quad),
            Extraction::Fallback { .. } => None,
        }
    }
}

/// Best-effort output when no card was detected: the original photo,
/// only turned to landscape if requested.
pub fn fallback_image(img: &DynamicImage, options: &RectifyOptions) -> DynamicImage {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    if options.landscape {
        normalize_landscape(rgb)
    } else {
        rgb
    }
}

/// Detect and rectify one card side, falling back to the whole photo
pub fn extract_card(
    img: &DynamicImage,
    config: &DetectorConfig,
    options: &RectifyOptions,
) -> Extraction {
    match detect_card(img, config) {
        Some(quad) => {
            let image = rectify(&img.to_rgb8(), &quad, options);
            info!(
                width = image.width(),
                height = image.height(),
                "Rectified card"
            );
            Extraction::Rectified { image, quad }
        }
        None => {
            warn!("No card detected, using whole image");
            Extraction::Fallback {
                image: fallback_image(img, options),
            }
        }
    }
}

/// Everything needed to turn two photos into a print page
#[derive(Debug, Clone, Default)]
pub struct Converter {
    pub detector: DetectorConfig,
    pub rectify: RectifyOptions,
    pub card: CardSpec,
    pub page: PageLayout,
}

impl Converter {
    /// Extract both sides concurrently
    pub fn extract_pair(
        &self,
        front: &DynamicImage,
        back: &DynamicImage,
    ) -> (Extraction, Extraction) {
        rayon::join(
            || extract_card(front, &self.detector, &self.rectify),
            || extract_card(back, &self.detector, &self.rectify),
        )
    }

    /// Lay out two already extracted sides as a PDF page
    pub fn compose(&self, front: Extraction, back: Extraction) -> Vec<u8> {
        compose(front.into_image(), back.into_image(), &self.card, &self.page)
    }

    /// Decode two photos and produce the finished PDF.
    ///
    /// The only failure is an unreadable input image.
    pub fn convert(&self, front_bytes: &[u8], back_bytes: &[u8]) -> Result<Vec<u8>> {
        let (front, back) = rayon::join(|| decode(front_bytes), || decode(back_bytes));
        let (front, back) = (front?, back?);
        let (front, back) = self.extract_pair(&front, &back);
        Ok(self.compose(front, back))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CardError;
    use image::{GenericImageView, Rgb, RgbImage};

    #[test]
    fn test_uniform_portrait_falls_back_to_rotated_original() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 500, Rgb([90, 90, 90])));
        let out = extract_card(&img, &DetectorConfig::default(), &RectifyOptions::default());
        assert!(out.quad().is_none());
        assert_eq!(out.image().dimensions(), (500, 300));
    }

    #[test]
    fn test_fallback_respects_disabled_landscape() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 500, Rgb([90, 90, 90])));
        let options = RectifyOptions {
            landscape: false,
            ..RectifyOptions::default()
        };
        assert_eq!(fallback_image(&img, &options).dimensions(), (300, 500));
    }

    #[test]
    fn test_convert_rejects_unreadable_input() {
        let err = Converter::default().convert(b"nope", b"nope").unwrap_err();
        assert!(matches!(err, CardError::Decode(_)));
    }
}
