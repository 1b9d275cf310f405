// Command line interface module
// Handles parsing of command line arguments and stdin input

use crate::app::{
    AppConfig, LoadSource, DEFAULT_DISPLAY_REGION, DEFAULT_NANOGRAM_THRESHOLD, MAX_DISPLAY_REGION,
};
use crate::image_loader::DropItem;
use anyhow::Result;
use clap::Parser;
use log::debug;
use std::io::{self, Read};
use std::path::PathBuf;

/// nanoview - Inspect the transparency of small images
#[derive(Parser, Debug)]
#[command(name = "nanoview")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Image files to open (PNG, JPG, JPEG or HEIC); image data can also be piped to stdin
    #[arg(value_name = "IMAGE")]
    pub images: Vec<PathBuf>,

    /// Drop a file URL onto the display region (repeatable)
    #[arg(long = "drop", value_name = "URL")]
    pub drops: Vec<String>,

    /// Drop a raw item given as TYPE=PAYLOAD, e.g. public.url=file:///tmp/a.png
    #[arg(long = "drop-item", value_name = "TYPE=PAYLOAD", value_parser = parse_drop_item)]
    pub drop_items: Vec<DropItem>,

    /// Inspect pixels of images smaller than this on both sides
    #[arg(short, long, default_value_t = DEFAULT_NANOGRAM_THRESHOLD, value_parser = parse_positive)]
    pub threshold: u32,

    /// Side of the square display region in pixels
    #[arg(short, long, default_value_t = DEFAULT_DISPLAY_REGION, value_parser = parse_region)]
    pub region: u32,

    /// Write the displayed image back out through a bitmap
    #[arg(short, long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Write the rendered display region
    #[arg(short, long, value_name = "PATH")]
    pub preview: Option<PathBuf>,
}

/// Parsed arguments with resolved image sources
#[derive(Debug)]
pub struct ParsedArgs {
    /// In the order the loads are started
    pub sources: Vec<LoadSource>,
    pub config: AppConfig,
}

/// Parse a size value and ensure it is at least 1
fn parse_positive(s: &str) -> Result<u32, String> {
    let value: u32 = s.parse().map_err(|_| format!("Invalid size value: {s}"))?;
    if value == 0 {
        return Err("Value must be at least 1".to_string());
    }
    Ok(value)
}

/// Parse a display region size, between 1 and `MAX_DISPLAY_REGION`
fn parse_region(s: &str) -> Result<u32, String> {
    let region = parse_positive(s)?;
    if region > MAX_DISPLAY_REGION {
        return Err(format!("Region must be at most {MAX_DISPLAY_REGION}"));
    }
    Ok(region)
}

/// Parse a `TYPE=PAYLOAD` drop item
fn parse_drop_item(s: &str) -> Result<DropItem, String> {
    match s.split_once('=') {
        Some((identifier, payload)) if !identifier.is_empty() => {
            Ok(DropItem::new(identifier, payload))
        }
        _ => Err("Drop items must look like TYPE=PAYLOAD".to_string()),
    }
}

/// Check if stdin has data available (is a pipe)
fn stdin_has_data() -> bool {
    !atty::is(atty::Stream::Stdin)
}

/// Read image data from stdin
fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Parse command line arguments and handle stdin input
pub fn parse_args() -> Result<ParsedArgs> {
    let args = Args::parse();

    let stdin = if stdin_has_data() {
        Some(read_stdin()?)
    } else {
        None
    };

    Ok(resolve(args, stdin))
}

/// Turn parsed arguments and optional stdin bytes into load sources
fn resolve(args: Args, stdin: Option<Vec<u8>>) -> ParsedArgs {
    let mut sources: Vec<LoadSource> = args.images.into_iter().map(LoadSource::File).collect();
    sources.extend(
        args.drops
            .iter()
            .map(|url| LoadSource::Drop(DropItem::file_url(url))),
    );
    sources.extend(args.drop_items.into_iter().map(LoadSource::Drop));

    match stdin {
        Some(data) if !data.is_empty() => sources.push(LoadSource::Bytes(data)),
        Some(_) => debug!("Ignoring empty stdin"),
        None => {}
    }

    ParsedArgs {
        sources,
        config: AppConfig {
            nanogram_threshold: args.threshold,
            display_region: args.region,
            export_path: args.export,
            preview_path: args.preview,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("nanoview").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let parsed = resolve(parse(&[]), None);
        assert!(parsed.sources.is_empty());
        assert_eq!(parsed.config.nanogram_threshold, 80);
        assert_eq!(parsed.config.display_region, 320);
        assert!(parsed.config.export_path.is_none());
    }

    #[test]
    fn sources_keep_their_order() {
        let args = parse(&[
            "a.png",
            "--drop",
            "file:///tmp/b.png",
            "--drop-item",
            "public.url=file:///tmp/c.png",
            "d.jpg",
            "-t",
            "16",
        ]);
        let parsed = resolve(args, Some(b"\x89PNG".to_vec()));
        let labels: Vec<String> = parsed.sources.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            labels,
            [
                "file a.png",
                "file d.jpg",
                "drop (public.file-url)",
                "drop (public.url)",
                "4 bytes from stdin",
            ]
        );
        assert_eq!(parsed.config.nanogram_threshold, 16);
    }

    #[test]
    fn largest_region_is_accepted() {
        let parsed = resolve(parse(&["--region", "4096"]), None);
        assert_eq!(parsed.config.display_region, MAX_DISPLAY_REGION);
    }

    #[test]
    fn empty_stdin_is_ignored() {
        assert!(resolve(parse(&[]), Some(Vec::new())).sources.is_empty());
    }

    #[test]
    fn invalid_values_are_rejected() {
        for argv in [
            vec!["nanoview", "--threshold", "0"],
            vec!["nanoview", "--region", "big"],
            vec!["nanoview", "--region", "4097"],
            vec!["nanoview", "-r", "4294967295"],
            vec!["nanoview", "--drop-item", "no-separator"],
            vec!["nanoview", "--drop-item", "=payload"],
        ] {
            assert!(Args::try_parse_from(argv.clone()).is_err(), "{argv:?}");
        }
    }
}
