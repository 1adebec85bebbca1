//! MP4 encoding through the system `ffmpeg` binary.
//!
//! The system binary is used rather than FFmpeg bindings to avoid native
//! dev header/lib requirements. Frames are flattened to opaque RGBA over a
//! background color and piped as rawvideo; the finished container is read
//! back and delivered through the job's event channel.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};

use crate::{
    error::{KinettaError, KinettaResult},
    export::{EncoderService, ExportEvent},
    raster::Surface,
};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Encodes frame sequences to H.264 MP4 on a worker thread.
#[derive(Clone, Debug)]
pub struct FfmpegEncoderService {
    bg_rgba: [u8; 4],
}

impl FfmpegEncoderService {
    pub fn new() -> Self {
        Self { bg_rgba: [0, 0, 0, 255] }
    }

    /// Frames are composited over this color before encoding; yuv420p output
    /// has no alpha channel.
    pub fn with_background(bg_rgba: [u8; 4]) -> Self {
        Self { bg_rgba }
    }
}

impl Default for FfmpegEncoderService {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderService for FfmpegEncoderService {
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
    if !width.is_multiple_of(2) || !height.is_multiple_of(2) {
        // yuv420p output needs even dimensions.
        return Err(KinettaError::encode(
            "frame width/height must be even for yuv420p mp4 output",
        ));
    }
    if frames.iter().any(|f| f.width != width || f.height != height) {
        return Err(KinettaError::encode("frame sizes differ within one export"));
    }
    if !fps.is_finite() || fps <= 0.0 {
        return Err(KinettaError::encode("export fps must be finite and > 0"));
    }
    if !is_ffmpeg_on_path() {
        return Err(KinettaError::encode(
            "ffmpeg is required for MP4 encoding, but was not found on PATH",
        ));
    }

    let out_path = temp_out_path();
    let _ = tx.send(ExportEvent::Log(format!(
        "encoding {} frames at {fps} fps ({width}x{height})",
        frames.len()
    )));

    let mut child = Command::new("ffmpeg")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "-r",
            &format!("{fps}"),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(&out_path)
        .spawn()
        .map_err(|e| KinettaError::encode(format!("failed to spawn ffmpeg: {e}")))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| KinettaError::encode("failed to open ffmpeg stdin"))?;

    let total = frames.len();
    let mut scratch = vec![0u8; (width as usize) * (height as usize) * 4];
    for (i, frame) in frames.iter().enumerate() {
        flatten_to_opaque_rgba8(&mut scratch, &frame.data, bg_rgba)?;
        stdin.write_all(&scratch).map_err(|e| {
            KinettaError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        let _ = tx.send(ExportEvent::Progress(((i + 1) * 100 / total) as u8));
    }
    drop(stdin);

    let output = child
        .wait_with_output()
        .map_err(|e| KinettaError::encode(format!("failed to wait for ffmpeg: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let _ = std::fs::remove_file(&out_path);
        return Err(KinettaError::encode(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let bytes = std::fs::read(&out_path)
        .map_err(|e| KinettaError::encode(format!("failed to read encoded output: {e}")))?;
    let _ = std::fs::remove_file(&out_path);

    let _ = tx.send(ExportEvent::Done(bytes));
    Ok(())
}

fn temp_out_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("kinetta-export-{}-{nanos}.mp4", std::process::id()))
}

/// Composites premultiplied RGBA over an opaque background.
pub(crate) fn flatten_to_opaque_rgba8(dst: &mut [u8], src: &[u8], bg_rgba: [u8; 4]) -> KinettaResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(KinettaError::encode(
            "flatten_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg = [
        u16::from(bg_rgba[0]),
        u16::from(bg_rgba[1]),
        u16::from(bg_rgba[2]),
    ];

    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let v = u16::from(s[c]) + mul_div255(bg[c], inv);
            d[c] = v.min(255) as u8;
        }
        d[3] = 255;
    }
    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_premul_over_black() {
        // Premultiplied red at 50% alpha stays 128,0,0 over black.
        let src = vec![128u8, 0, 0, 128];
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
        assert_eq!(dst, vec![128, 0, 0, 255]);
    }

    #[test]
    fn flatten_blends_background_through_transparency() {
        let src = vec![0u8, 0, 0, 0];
        let mut dst = vec![0u8; 4];
        flatten_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]).unwrap();
        assert_eq!(dst, vec![10, 20, 30, 255]);
    }

    #[test]
    fn empty_frame_list_surfaces_through_the_error_channel() {
        let service = FfmpegEncoderService::new();
        let rx = service.encode(Vec::new(), 30.0);
        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ExportEvent::Error(msg) if msg.contains("no frames")));
    }

    #[test]
    fn odd_dimensions_are_rejected_before_spawning() {
        let service = FfmpegEncoderService::new();
        let rx = service.encode(vec![Surface::new(3, 2)], 30.0);
        let events: Vec<_> = rx.iter().collect();
        assert!(matches!(&events[0], ExportEvent::Error(msg) if msg.contains("even")));
    }
}
