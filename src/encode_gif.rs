//! Animated GIF encoding through the `image` crate.
//!
//! Unlike the MP4 path this needs no external binary, so it is the
//! encoder used when a portable export is wanted. GIF has no real alpha
//! channel, so frames are flattened over a background color first.

use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};

use crate::{
    encode_ffmpeg::flatten_to_opaque_rgba8,
    error::{KinettaError, KinettaResult},
    export::{EncoderService, ExportEvent},
    raster::Surface,
};

/// Encodes frame sequences to looping animated GIFs on a worker thread.
#[derive(Clone, Debug)]
pub struct GifEncoderService {
    bg_rgba: [u8; 4],
}

impl GifEncoderService {
    pub fn new() -> Self {
        Self { bg_rgba: [0, 0, 0, 255] }
    }

    pub fn with_background(bg_rgba: [u8; 4]) -> Self {
        Self { bg_rgba }
    }
}

impl Default for GifEncoderService {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderService for GifEncoderService {
    fn encode(&self, frames: Vec<Surface>, fps: f64) -> Receiver<ExportEvent> {
        let (tx, rx) = mpsc::channel();
        let bg = self.bg_rgba;
        std::thread::spawn(move || {
            if let Err(e) = run_job(frames, fps, bg, &tx) {
                let _ = tx.send(ExportEvent::Error(e.to_string()));
            }
        });
        rx
    }
}

fn run_job(
    frames: Vec<Surface>,
    fps: f64,
    bg_rgba: [u8; 4],
    tx: &Sender<ExportEvent>,
) -> KinettaResult<()> {
    let Some(first) = frames.first() else {
        return Err(KinettaError::encode("no frames were captured for export"));
    };
    let (width, height) = (first.width, first.height);
    if width == 0 || height == 0 {
        return Err(KinettaError::encode("frame width/height must be non-zero"));
    }
    if frames.iter().any(|f| f.width != width || f.height != height) {
        return Err(KinettaError::encode("frame sizes differ within one export"));
    }
    if !fps.is_finite() || fps <= 0.0 {
        return Err(KinettaError::encode("export fps must be finite and > 0"));
    }

    let _ = tx.send(ExportEvent::Log(format!(
        "encoding {} frames at {fps} fps ({width}x{height}) to gif",
        frames.len()
    )));

    // GIF delays are in centiseconds; from_numer_denom_ms rounds for us.
    let delay = Delay::from_numer_denom_ms(1000, fps.round().max(1.0) as u32);

    let mut out = Cursor::new(Vec::new());
    {
        let mut encoder = GifEncoder::new(&mut out);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| KinettaError::encode(format!("failed to set gif loop count: {e}")))?;

        let total = frames.len();
        let mut scratch = vec![0u8; (width as usize) * (height as usize) * 4];
        for (i, frame) in frames.iter().enumerate() {
            flatten_to_opaque_rgba8(&mut scratch, &frame.data, bg_rgba)?;
            let img = RgbaImage::from_raw(width, height, scratch.clone())
                .ok_or_else(|| KinettaError::encode("frame buffer size mismatch"))?;
            encoder
                .encode_frame(Frame::from_parts(img, 0, 0, delay))
                .map_err(|e| KinettaError::encode(format!("failed to encode gif frame: {e}")))?;
            let _ = tx.send(ExportEvent::Progress(((i + 1) * 100 / total) as u8));
        }
    }

    let _ = tx.send(ExportEvent::Done(out.into_inner()));
    Ok(())
}
