//! Time-based media sources and their playback synchronization.
//!
//! Video and audio clips own a [`MediaSlot`] that moves through
//! `Uninitialized -> Loading -> Ready` exactly once. A ready slot holds a
//! boxed [`MediaHandle`] that the timeline drives: play and pause happen at
//! the clip's window boundaries, and seeks happen only when the handle has
//! drifted past the tolerance.

use std::path::{Path, PathBuf};

use crate::{
    error::{KinettaError, KinettaResult},
    raster::Sprite,
};

/// Maximum drift between timeline-derived time and handle position before a
/// corrective seek is issued.
pub const SYNC_TOLERANCE_SEC: f64 = 0.05;

/// A playable media source. `current_frame` returns `None` for sources with
/// no picture (audio).
pub trait MediaHandle: Send {
    fn duration_sec(&self) -> f64;
    fn position_sec(&self) -> f64;
    fn seek(&mut self, sec: f64) -> KinettaResult<()>;
    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn current_frame(&mut self) -> KinettaResult<Option<Sprite>>;

    /// Mixer hooks; sources without an audio path ignore them.
    fn set_volume(&mut self, _volume: f64) {}
    fn set_pan(&mut self, _pan: f64) {}
}

/// Lazy-loading state for a clip's media source.
pub enum MediaSlot {
    Uninitialized { source: String },
    Loading,
    Ready(Box<dyn MediaHandle>),
}

impl std::fmt::Debug for MediaSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized { source } => {
                f.debug_struct("Uninitialized").field("source", source).finish()
            }
            Self::Loading => f.write_str("Loading"),
            Self::Ready(h) => f
                .debug_struct("Ready")
                .field("duration_sec", &h.duration_sec())
                .finish(),
        }
    }
}

impl MediaSlot {
    pub fn new(source: impl Into<String>) -> Self {
        Self::Uninitialized { source: source.into() }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Drives `Uninitialized -> Loading -> Ready` using `load`. A slot that
    /// is already loading or ready is left alone, so a handle is constructed
    /// at most once per slot.
    pub fn ensure_loaded<F>(&mut self, load: F) -> KinettaResult<()>
    where
        F: FnOnce(&str) -> KinettaResult<Box<dyn MediaHandle>>,
    {
        if let Self::Uninitialized { source } = self {
            let source = std::mem::take(source);
            *self = Self::Loading;
            match load(&source) {
                Ok(handle) => *self = Self::Ready(handle),
                Err(e) => {
                    // Failed loads go back to Uninitialized so a later pass
                    // can retry with a corrected source.
                    *self = Self::Uninitialized { source };
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    pub fn handle_mut(&mut self) -> Option<&mut Box<dyn MediaHandle>> {
        match self {
            Self::Ready(h) => Some(h),
            _ => None,
        }
    }

    /// Reconciles the handle with clip-relative time.
    ///
    /// Entering the playing state seeks first so playback starts at the
    /// timeline position. While playing, a seek is issued only when drift
    /// exceeds [`SYNC_TOLERANCE_SEC`]; constant re-seeking stutters decoders.
    pub fn sync(&mut self, target_sec: f64, should_play: bool) -> KinettaResult<()> {
        let Self::Ready(handle) = self else {
            return Ok(());
        };
        if should_play {
            if !handle.is_playing() {
                handle.seek(target_sec)?;
                handle.play();
            } else if (handle.position_sec() - target_sec).abs() > SYNC_TOLERANCE_SEC {
                handle.seek(target_sec)?;
            }
        } else if handle.is_playing() {
            handle.pause();
        }
        Ok(())
    }
}

/// In-memory handle with no backing decoder. Audio sources use it when only
/// transport state matters, and tests use it to observe sync decisions.
#[derive(Debug, Default)]
pub struct TransportHandle {
    pub duration_sec: f64,
    position_sec: f64,
    playing: bool,
    pub seek_count: u32,
}

impl TransportHandle {
    pub fn with_duration(duration_sec: f64) -> Self {
        Self { duration_sec, ..Self::default() }
    }

    /// Simulates decoder-side progress between sync calls.
    pub fn advance(&mut self, delta_sec: f64) {
        if self.playing {
            self.position_sec += delta_sec;
        }
    }
}

impl MediaHandle for TransportHandle {
    fn duration_sec(&self) -> f64 {
        self.duration_sec
    }

    fn position_sec(&self) -> f64 {
        self.position_sec
    }

    fn seek(&mut self, sec: f64) -> KinettaResult<()> {
        self.position_sec = sec.max(0.0);
        self.seek_count += 1;
        Ok(())
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn current_frame(&mut self) -> KinettaResult<Option<Sprite>> {
        Ok(None)
    }
}

#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    pub source_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub duration_sec: f64,
    pub has_audio: bool,
}

impl VideoSourceInfo {
    pub fn source_fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

/// ffmpeg-backed video handle. Frames are decoded on demand at the handle's
/// current position; transport state lives handle-side since the decoder is
/// invoked per frame.
#[cfg(feature = "media-ffmpeg")]
pub struct FfmpegVideoHandle {
    info: VideoSourceInfo,
    position_sec: f64,
    playing: bool,
}

#[cfg(feature = "media-ffmpeg")]
impl FfmpegVideoHandle {
    pub fn open(source_path: &Path) -> KinettaResult<Self> {
        let info = probe_video(source_path)?;
        Ok(Self { info, position_sec: 0.0, playing: false })
    }

    pub fn info(&self) -> &VideoSourceInfo {
        &self.info
    }
}

#[cfg(feature = "media-ffmpeg")]
impl MediaHandle for FfmpegVideoHandle {
    fn duration_sec(&self) -> f64 {
        self.info.duration_sec
    }

    fn position_sec(&self) -> f64 {
        self.position_sec
    }

    fn seek(&mut self, sec: f64) -> KinettaResult<()> {
        self.position_sec = sec.clamp(0.0, self.info.duration_sec.max(0.0));
        Ok(())
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn current_frame(&mut self) -> KinettaResult<Option<Sprite>> {
        let rgba = decode_video_frame_rgba8(&self.info, self.position_sec)?;
        // Decoded video is opaque, so the straight bytes are already valid
        // premultiplied data.
        Sprite::from_premul(self.info.width, self.info.height, rgba).map(Some)
    }
}

/// Default loader: video sources get an ffmpeg-backed handle, audio sources
/// a transport-only handle probed for duration.
pub fn open_media(source: &str) -> KinettaResult<Box<dyn MediaHandle>> {
    let path = Path::new(source);
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp3") | Some("wav") | Some("ogg") | Some("flac") | Some("m4a") => {
            let info = probe_video(path)?;
            Ok(Box::new(TransportHandle::with_duration(info.duration_sec)))
        }
        _ => open_video(path),
    }
}

#[cfg(feature = "media-ffmpeg")]
fn open_video(path: &Path) -> KinettaResult<Box<dyn MediaHandle>> {
    Ok(Box::new(FfmpegVideoHandle::open(path)?))
}

#[cfg(not(feature = "media-ffmpeg"))]
fn open_video(_path: &Path) -> KinettaResult<Box<dyn MediaHandle>> {
    Err(KinettaError::evaluation(
        "video/audio sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
pub fn probe_video(source_path: &Path) -> KinettaResult<VideoSourceInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| KinettaError::evaluation(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(KinettaError::evaluation(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| KinettaError::evaluation(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let (width, height, fps_num, fps_den) = match video_stream {
        Some(s) => {
            let width = s
                .width
                .ok_or_else(|| KinettaError::evaluation("missing video width from ffprobe"))?;
            let height = s
                .height
                .ok_or_else(|| KinettaError::evaluation("missing video height from ffprobe"))?;
            let (num, den) = parse_ff_ratio(s.r_frame_rate.as_deref().unwrap_or("0/1"))
                .ok_or_else(|| KinettaError::evaluation("invalid video r_frame_rate"))?;
            (width, height, num, den)
        }
        None => (0, 0, 0, 1),
    };

    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoSourceInfo {
        source_path: source_path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        duration_sec,
        has_audio,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_video(_source_path: &Path) -> KinettaResult<VideoSourceInfo> {
    Err(KinettaError::evaluation(
        "video/audio sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
pub fn decode_video_frame_rgba8(
    source: &VideoSourceInfo,
    source_time_sec: f64,
) -> KinettaResult<Vec<u8>> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{source_time_sec:.9}")])
        .arg("-i")
        .arg(&source.source_path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .output()
        .map_err(|e| {
            KinettaError::evaluation(format!("failed to run ffmpeg for video decode: {e}"))
        })?;

    if !out.status.success() {
        return Err(KinettaError::evaluation(format!(
            "ffmpeg video decode failed for '{}': {}",
            source.source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = source.width as usize * source.height as usize * 4;
    if expected_len == 0 {
        return Err(KinettaError::evaluation(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }
    if out.stdout.len() < expected_len {
        return Err(KinettaError::evaluation(format!(
            "ffmpeg returned no video frame for '{}'",
            source.source_path.display()
        )));
    }
    Ok(out.stdout[..expected_len].to_vec())
}

#[cfg(not(feature = "media-ffmpeg"))]
pub fn decode_video_frame_rgba8(
    _source: &VideoSourceInfo,
    _source_time_sec: f64,
) -> KinettaResult<Vec<u8>> {
    Err(KinettaError::evaluation(
        "video/audio sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.parse::<u32>().ok()?;
    let b = parts.next()?.parse::<u32>().ok()?;
    if b == 0 {
        return None;
    }
    Some((a, b))
}
