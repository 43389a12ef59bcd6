use clap::Parser;
use std::path::PathBuf;

use crate::transform::RectifyOptions;

#[derive(Parser, Debug)]
#[command(name = "card2page")]
#[command(version, about = "Crop ID card photos and print both sides on one A4 page at true size")]
pub struct Cli {
    /// Photo of the card front
    #[arg(long)]
    pub front: PathBuf,

    /// Photo of the card back
    #[arg(long)]
    pub back: PathBuf,

    /// Output PDF path
    #[arg(long)]
    pub out: PathBuf,

    /// White margin around each rectified card, in pixels
    #[arg(long, default_value = "20")]
    pub pad: u32,

    /// Do not add an alpha channel (padding stays opaque white)
    #[arg(long)]
    pub no_refine: bool,

    /// Keep portrait-shaped results as they are
    #[arg(long)]
    pub no_landscape: bool,

    /// Also save the rectified front as PNG
    #[arg(long)]
    pub front_png: Option<PathBuf>,

    /// Also save the rectified back as PNG
    #[arg(long)]
    pub back_png: Option<PathBuf>,

    /// Log detection details
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub fn rectify_options(&self) -> RectifyOptions {
        RectifyOptions {
            pad_pixels: self.pad,
            add_alpha: !self.no_refine,
            landscape: !self.no_landscape,
            ..RectifyOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["card2page", "--front", "f.jpg", "--back", "b.jpg", "--out", "o.pdf"]);
        let options = cli.rectify_options();
        assert_eq!(options.pad_pixels, 20);
        assert!(options.add_alpha);
        assert!(options.landscape);
    }

    #[test]
    fn test_flags_override_options() {
        let cli = Cli::parse_from([
            "card2page", "--front", "f.jpg", "--back", "b.jpg", "--out", "o.pdf", "--pad", "0",
            "--no-refine", "--no-landscape",
        ]);
        let options = cli.rectify_options();
        assert_eq!(options.pad_pixels, 0);
        assert!(!options.add_alpha);
        assert!(!options.landscape);
    }

    #[test]
    fn test_requires_both_sides() {
        assert!(Cli::try_parse_from(["card2page", "--front", "f.jpg", "--out", "o.pdf"]).is_err());
    }
}
