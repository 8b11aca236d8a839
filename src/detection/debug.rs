//! Optional side channel for intermediate detection frames.

use chrono::Local;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::shapes::PixelCircle;

/// An image produced while running the detector.
pub enum DebugFrame<'a> {
    /// The decoded tile as received.
    Raster(&'a RgbImage),
    /// Binary color mask.
    Mask(&'a GrayImage),
    /// The tile with accepted circles drawn on it.
    Annotated(&'a RgbImage),
}

impl DebugFrame<'_> {
    pub fn label(&self) -> &'static str {
        match self {
            DebugFrame::Raster(_) => "raster",
            DebugFrame::Mask(_) => "mask",
            DebugFrame::Annotated(_) => "annotated",
        }
    }
}

/// Callback receiving intermediate frames.
pub type FrameHook = Arc<dyn Fn(&DebugFrame<'_>) + Send + Sync>;

const ANNOTATION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Draws accepted circles on a copy of the raster.
pub fn annotate(raster: &RgbImage, circles: &[PixelCircle]) -> RgbImage {
    let mut output = raster.clone();
    for c in circles {
        let center = (c.x as i32, c.y as i32);
        // Two rings to get a 2px outline
        draw_hollow_circle_mut(&mut output, center, c.radius as i32, ANNOTATION_COLOR);
        draw_hollow_circle_mut(&mut output, center, c.radius as i32 + 1, ANNOTATION_COLOR);
    }
    output
}

/// Writes every frame as a timestamped PNG into a directory.
pub struct FrameDumper {
    dir: PathBuf,
    sequence: AtomicU32,
}

impl FrameDumper {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            sequence: AtomicU32::new(0),
        }
    }

    /// Saves one frame. Failures are logged, never propagated.
    pub fn save(&self, frame: &DebugFrame<'_>) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            log::warn!("Failed to create debug frame dir {}: {}", self.dir.display(), e);
            return;
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = self
            .dir
            .join(format!("{}_{:05}_{}.png", timestamp, seq, frame.label()));

        let result = match frame {
            DebugFrame::Raster(img) | DebugFrame::Annotated(img) => img.save(&path),
            DebugFrame::Mask(img) => img.save(&path),
        };

        match result {
            Ok(()) => log::debug!("Saved debug frame {}", path.display()),
            Err(e) => log::warn!("Failed to save debug frame {}: {}", path.display(), e),
        }
    }

    pub fn into_hook(self) -> FrameHook {
        Arc::new(move |frame| self.save(frame))
    }
}
