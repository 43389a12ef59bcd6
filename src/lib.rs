pub mod cli;
pub mod codec;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod pipeline;
pub mod service;
pub mod transform;

pub use cli::Cli;
pub use detection::{detect_card, DetectorConfig};
pub use error::{CardError, Result};
pub use geometry::{edge_length, OrderedQuad, Point, RawQuad};
pub use layout::{card_placements, compose, CardSpec, PageLayout, Placement};
pub use pipeline::{extract_card, fallback_image, Converter, Extraction};
pub use service::CorrectionService;
pub use transform::{normalize_landscape, rectify, RectifyOptions};
