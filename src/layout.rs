use image::DynamicImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use tracing::{debug, info, instrument};

use crate::codec::flatten_alpha;
use crate::transform::normalize_landscape;

/// DPI at which embedded rasters are given their native size before scaling
const EMBED_DPI: f32 = 300.0;

/// Physical size of the card being printed
#[derive(Debug, Clone, Copy)]
pub struct CardSpec {
    pub width_mm: f64,
    pub height_mm: f64,
}

impl CardSpec {
    /// ISO/IEC 7810 ID-1 (ID cards, bank cards, driving licences)
    pub const ID1: CardSpec = CardSpec {
        width_mm: 85.6,
        height_mm: 54.0,
    };
}

impl Default for CardSpec {
    fn default() -> Self {
        Self::ID1
    }
}

/// Physical page and spacing between the two cards
#[derive(Debug, Clone, Copy)]
pub struct PageLayout {
    pub page_width_mm: f64,
    pub page_height_mm: f64,
    pub gap_mm: f64,
}

impl PageLayout {
    pub const A4: PageLayout = PageLayout {
        page_width_mm: 210.0,
        page_height_mm: 297.0,
        gap_mm: 10.0,
    };

    pub fn page_width_pt(&self) -> f64 {
        mm_to_pt(self.page_width_mm)
    }

    pub fn page_height_pt(&self) -> f64 {
        mm_to_pt(self.page_height_mm)
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::A4
    }
}

/// A rectangle on the page in points, origin bottom-left, y up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * 72.0 / 25.4
}

/// Positions of the front (upper) and back (lower) card, stacked and
/// centred on the page.
pub fn card_placements(card: &CardSpec, page: &PageLayout) -> (Placement, Placement) {
    let card_w = mm_to_pt(card.width_mm);
    let card_h = mm_to_pt(card.height_mm);
    let gap = mm_to_pt(page.gap_mm);

    let total_h = 2.0 * card_h + gap;
    let start_y = (page.page_height_pt() - total_h) / 2.0;
    let x = (page.page_width_pt() - card_w) / 2.0;

    let back = Placement {
        x,
        y: start_y,
        width: card_w,
        height: card_h,
    };
    let front = Placement {
        y: start_y + card_h + gap,
        ..back
    };
    (front, back)
}

/// Draw raster images at fixed page positions and serialise a one-page PDF.
///
/// Each image is stretched to exactly its placement rectangle. Alpha is
/// flattened onto white so transparent margins print as paper.
#[instrument(skip(images), fields(count = images.len()))]
pub fn render_page(title: &str, page: &PageLayout, images: &[(&DynamicImage, Placement)]) -> Vec<u8> {
    let mut doc = PdfDocument::new(title);
    let mut ops: Vec<Op> = Vec::new();

    for (img, placement) in images {
        let rgb = flatten_alpha(img);
        let (px_w, px_h) = rgb.dimensions();
        let raw = RawImage {
            pixels: RawImageData::U8(rgb.into_raw()),
            width: px_w as usize,
            height: px_h as usize,
            data_format: RawImageFormat::RGB8,
            tag: Vec::new(),
        };
        let xobject_id = doc.add_image(&raw);

        // Native size at EMBED_DPI, then stretched to the placement
        let native_w_pt = px_w as f32 / EMBED_DPI * 72.0;
        let native_h_pt = px_h as f32 / EMBED_DPI * 72.0;
        let scale_x = placement.width as f32 / native_w_pt;
        let scale_y = placement.height as f32 / native_h_pt;

        debug!(px_w, px_h, ?placement, scale_x, scale_y, "Placing image");

        ops.push(Op::UseXobject {
            id: xobject_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(placement.x as f32)),
                translate_y: Some(Pt(placement.y as f32)),
                scale_x: Some(scale_x),
                scale_y: Some(scale_y),
                dpi: Some(EMBED_DPI),
                rotate: None,
            },
        });
    }

    let page = PdfPage::new(
        Mm(page.page_width_mm as f32),
        Mm(page.page_height_mm as f32),
        ops,
    );
    doc.with_pages(vec![page]);

    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let output = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        debug!(count = warnings.len(), "PDF writer emitted warnings");
    }
    output
}

/// Lay out the front and back sides on one page at true card scale
pub fn compose(
    front: DynamicImage,
    back: DynamicImage,
    card: &CardSpec,
    page: &PageLayout,
) -> Vec<u8> {
    let front = normalize_landscape(front);
    let back = normalize_landscape(back);
    let (front_at, back_at) = card_placements(card, page);

    let pdf = render_page("ID card", page, &[(&front, front_at), (&back, back_at)]);
    info!(bytes = pdf.len(), "Composed card page");
    pdf
}
