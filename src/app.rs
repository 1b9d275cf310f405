// Application state module
// Single-threaded UI queue fed by background image loads

use crate::bitmap::Bitmap;
use crate::pixel::Pixel;
use crate::image_loader::{self, DropItem, LoadError};
use anyhow::{bail, Context, Result};
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::{debug, error, info, warn};
use std::fmt;
use std::io::Write;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread;

/// Images must be smaller than this on both sides to be inspected
pub const DEFAULT_NANOGRAM_THRESHOLD: u32 = 80;

/// Side of the square display region in pixels
pub const DEFAULT_DISPLAY_REGION: u32 = 320;

/// Largest display region side that will be rendered
pub const MAX_DISPLAY_REGION: u32 = 4096;

/// Shown while there is no image
pub const PLACEHOLDER: &str = "Drag and drop image file";

/// Where an image comes from
#[derive(Debug, Clone)]
pub enum LoadSource {
    /// A file picked through the file chooser
    File(PathBuf),
    /// The first item of a drop
    Drop(DropItem),
    /// Encoded bytes piped to the process
    Bytes(Vec<u8>),
}

impl LoadSource {
    /// Decode the image; runs on a worker thread
    fn load(&self) -> Result<DynamicImage, LoadError> {
        match self {
            Self::File(path) => image_loader::open_image(path),
            Self::Drop(item) => image_loader::load_dropped(item),
            Self::Bytes(data) => image_loader::load_from_bytes(data)
                .map_err(|e| LoadError::Decode(format!("{:#}", e))),
        }
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Drop(item) => write!(f, "drop ({})", item.type_identifier),
            Self::Bytes(data) => write!(f, "{} bytes from stdin", data.len()),
        }
    }
}

/// Events delivered to the UI queue
#[derive(Debug)]
pub enum AppEvent {
    Loaded {
        source: String,
        result: Result<DynamicImage, LoadError>,
    },
}

/// What the display region currently shows
#[derive(Debug, Clone, Default)]
pub enum DisplayState {
    #[default]
    Empty,
    Present(DynamicImage),
}

impl DisplayState {
    pub fn image(&self) -> Option<&DynamicImage> {
        match self {
            Self::Empty => None,
            Self::Present(image) => Some(image),
        }
    }

    /// One-line description of what a `region`-sided display shows
    pub fn describe(&self, region: u32) -> String {
        match self {
            Self::Empty => PLACEHOLDER.to_string(),
            Self::Present(image) => {
                let (width, height) = image.dimensions();
                let (fit_w, fit_h) = image_loader::fitted_size(width, height, region);
                format!("{width}x{height} image shown at {fit_w}x{fit_h}")
            }
        }
    }

    /// Render the image scaled to fit and centred in a `region`-sided square.
    ///
    /// Returns `None` while there is nothing to show. Fails if `region` is
    /// outside `1..=MAX_DISPLAY_REGION`.
    pub fn render(&self, region: u32) -> Result<Option<Bitmap>> {
        if !(1..=MAX_DISPLAY_REGION).contains(&region) {
            bail!(
                "Display region {} must be between 1 and {}",
                region,
                MAX_DISPLAY_REGION
            );
        }
        let Some(image) = self.image() else {
            return Ok(None);
        };

        let fitted = Bitmap::from_image(&image_loader::fit_within(image, region));
        let side = region as usize;
        let mut canvas = Bitmap::try_filled(side, side, Pixel::CLEAR)?;
        let x = (side.saturating_sub(fitted.width()) / 2) as isize;
        let y = (side.saturating_sub(fitted.height()) / 2) as isize;
        canvas.draw(&fitted, x, y);
        Ok(Some(canvas))
    }
}

/// Runtime options of the app
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub nanogram_threshold: u32,
    pub display_region: u32,
    /// Write the shown image back out through a bitmap
    pub export_path: Option<PathBuf>,
    /// Write the rendered display region
    pub preview_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nanogram_threshold: DEFAULT_NANOGRAM_THRESHOLD,
            display_region: DEFAULT_DISPLAY_REGION,
            export_path: None,
            preview_path: None,
        }
    }
}

/// Main application state
pub struct App {
    config: AppConfig,
    display: DisplayState,
    sender: flume::Sender<AppEvent>,
    receiver: flume::Receiver<AppEvent>,
    /// Loads spawned but not yet delivered
    pending: usize,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let (sender, receiver) = flume::unbounded();
        Self {
            config,
            display: DisplayState::Empty,
            sender,
            receiver,
            pending: 0,
        }
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    /// Start loading `source` on a worker thread.
    ///
    /// The result is queued for [`App::run`]; loads are never cancelled.
    pub fn spawn_load(&mut self, source: LoadSource) {
        debug!("Spawning load for {}", source);
        let sender = self.sender.clone();
        self.pending += 1;
        thread::spawn(move || {
            let label = source.to_string();
            report_load(label, move || source.load(), &sender);
        });
    }

    /// Drain the queue until every spawned load has reported or its worker
    /// has gone away.
    ///
    /// Events are handled in the order the loads complete, so the last one
    /// to finish successfully is what ends up displayed.
    pub fn run(&mut self, out: &mut impl Write) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }

        // Swap in a fresh channel so the queue disconnects once every worker
        // started so far has dropped its sender, reported or not.
        let (sender, receiver) = flume::unbounded();
        drop(mem::replace(&mut self.sender, sender));
        let queue = mem::replace(&mut self.receiver, receiver);

        while let Ok(event) = queue.recv() {
            self.pending = self.pending.saturating_sub(1);
            self.handle_event(event, out)?;
        }

        if self.pending > 0 {
            warn!("{} image load(s) ended without reporting", self.pending);
            self.pending = 0;
        }
        Ok(())
    }

    /// Apply one event on the UI thread
    pub fn handle_event(&mut self, event: AppEvent, out: &mut impl Write) -> Result<()> {
        match event {
            AppEvent::Loaded {
                source,
                result: Ok(image),
            } => {
                let (width, height) = image.dimensions();
                info!("Loaded {}: {}x{} pixels", source, width, height);

                if is_small(&image, self.config.nanogram_threshold) {
                    let bitmap = Bitmap::from_image(&image);
                    nanogram_check(&bitmap, out).context("Failed to write nanogram check")?;
                }
                self.display = DisplayState::Present(image);
            }
            AppEvent::Loaded {
                source,
                result: Err(e),
            } => warn!("Could not load {}: {}", source, e),
        }
        Ok(())
    }

    /// Report the final display state and write the requested outputs
    pub fn finish(&self) -> Result<()> {
        info!(
            "Display: {}",
            self.display.describe(self.config.display_region)
        );

        if let Some(path) = &self.config.export_path {
            match self.display.image() {
                Some(image) => export(&Bitmap::from_image(image), path)?,
                None => warn!("Nothing to export to {}", path.display()),
            }
        }

        if let Some(path) = &self.config.preview_path {
            match self.display.render(self.config.display_region)? {
                Some(canvas) => export(&canvas, path)?,
                None => warn!("Nothing to preview to {}", path.display()),
            }
        }
        Ok(())
    }
}

/// Run `load` and send its outcome; a panicking loader reports
/// [`LoadError::Interrupted`] instead of vanishing.
fn report_load<F>(source: String, load: F, sender: &flume::Sender<AppEvent>)
where
    F: FnOnce() -> Result<DynamicImage, LoadError>,
{
    let result = panic::catch_unwind(AssertUnwindSafe(load)).unwrap_or_else(|_| {
        error!("Loader for {} panicked", source);
        Err(LoadError::Interrupted)
    });
    // The receiver is only dropped once the app stops draining
    let _ = sender.send(AppEvent::Loaded { source, result });
}

/// Whether both sides of `image` are below `threshold`
pub fn is_small(image: &DynamicImage, threshold: u32) -> bool {
    image.width() < threshold && image.height() < threshold
}

/// Print whether each pixel is non-transparent, one `[x; y]: bool` line per
/// pixel, columns outer and rows inner.
pub fn nanogram_check(bitmap: &Bitmap, out: &mut impl Write) -> std::io::Result<()> {
    for x in 0..bitmap.width() {
        for y in 0..bitmap.height() {
            let filled = bitmap[(x, y)].alpha != 0;
            writeln!(out, "[{}; {}]: {}", x, y, filled)?;
        }
    }
    Ok(())
}

/// Save `bitmap` using the format implied by `path`, PNG by default
fn export(bitmap: &Bitmap, path: &Path) -> Result<()> {
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(image_loader::format_from_extension)
        .unwrap_or(ImageFormat::Png);

    let image = bitmap.to_image()?;
    // JPEG has no alpha channel
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => image,
    };
    image
        .save_with_format(path, format)
        .with_context(|| format!("Failed to write image: {}", path.display()))?;
    info!("Wrote {}x{} image to {}", bitmap.width(), bitmap.height(), path.display());
    Ok(())
}
