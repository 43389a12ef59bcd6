use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use image::{DynamicImage, ImageFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

use card2page::codec::{decode, encode};
use card2page::{Cli, Converter, Extraction};

fn load(path: &Path) -> Result<DynamicImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to open input file: {:?}", path))?;
    decode(&bytes).with_context(|| format!("Failed to decode image: {:?}", path))
}

fn save_png(extraction: &Extraction, path: &Path) -> Result<()> {
    let png = encode(extraction.image(), ImageFormat::Png)?;
    std::fs::write(path, png).with_context(|| format!("Failed to save output: {:?}", path))?;
    info!("Saved rectified side: {:?}", path);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let converter = Converter {
        rectify: cli.rectify_options(),
        ..Converter::default()
    };

    let front = load(&cli.front)?;
    let back = load(&cli.back)?;
    info!(
        front = ?(front.width(), front.height()),
        back = ?(back.width(), back.height()),
        "Loaded photos"
    );

    let (front, back) = converter.extract_pair(&front, &back);
    for (side, extraction) in [("front", &front), ("back", &back)] {
        match extraction.quad() {
            Some(quad) => info!(side, ?quad, "Card outline"),
            None => info!(side, "No card outline, kept whole photo"),
        }
    }

    if let Some(path) = &cli.front_png {
        save_png(&front, path)?;
    }
    if let Some(path) = &cli.back_png {
        save_png(&back, path)?;
    }

    let pdf = converter.compose(front, back);
    std::fs::write(&cli.out, &pdf)
        .with_context(|| format!("Failed to save output: {:?}", cli.out))?;

    println!("{}", cli.out.display());
    Ok(())
}
