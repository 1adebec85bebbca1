//! Frame capture and export jobs.
//!
//! Exporting is a blocking frame-generation loop over the timeline followed
//! by an asynchronous encode job. Encoder services run on their own thread
//! and report exclusively through an event channel, ending with exactly one
//! terminal event (`Error` or `Done`).

use std::sync::mpsc::Receiver;

use crate::{
    assets::AssetStore,
    engine::RenderEngine,
    error::KinettaResult,
    raster::Surface,
    timeline::Timeline,
};

/// Progress and result stream of an encode job.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportEvent {
    Log(String),
    /// 0..=100.
    Progress(u8),
    Error(String),
    /// The encoded container bytes. Terminal.
    Done(Vec<u8>),
}

/// Collects rendered frames while recording is on.
#[derive(Clone, Debug, Default)]
pub struct FrameRecorder {
    recording: bool,
    frames: Vec<Surface>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Begins a fresh recording, discarding previously captured frames.
    pub fn start(&mut self) {
        self.frames.clear();
        self.recording = true;
    }

    /// Stores an owned copy of `frame`. Ignored while not recording.
    pub fn capture(&mut self, frame: &Surface) {
        if self.recording {
            self.frames.push(frame.clone());
        }
    }

    pub fn stop(&mut self) {
        self.recording = false;
    }

    pub fn frames(&self) -> &[Surface] {
        &self.frames
    }

    pub fn take_frames(&mut self) -> Vec<Surface> {
        std::mem::take(&mut self.frames)
    }
}

/// A black-box encode job: consumes an ordered frame sequence and streams
/// [`ExportEvent`]s from a worker until one terminal event.
pub trait EncoderService {
    fn encode(&self, frames: Vec<Surface>, fps: f64) -> Receiver<ExportEvent>;
}

pub struct Exporter;

impl Exporter {
    /// Renders every frame of the timeline at its frame rate, then hands the
    /// sequence to `service` and returns the job's event receiver.
    ///
    /// The timeline's play state and position are snapshotted up front and
    /// restored whether or not the frame loop succeeds.
    #[tracing::instrument(skip_all, fields(duration_ms = timeline.duration(), fps = timeline.frame_rate()))]
    pub fn export(
        timeline: &mut Timeline,
        engine: &mut RenderEngine,
        assets: &mut AssetStore,
        service: &dyn EncoderService,
    ) -> KinettaResult<Receiver<ExportEvent>> {
        let saved_time = timeline.time();
        let saved_playing = timeline.is_playing();
        timeline.pause();

        let mut recorder = FrameRecorder::new();
        recorder.start();

        let fps = timeline.frame_rate();
        let result = (|| -> KinettaResult<()> {
            let frame_count = (timeline.duration() / 1000.0 * fps).ceil().max(1.0) as u64;
            for i in 0..frame_count {
                timeline.seek(i as f64 * 1000.0 / fps);
                timeline.update(0.0)?;
                timeline.render(engine, assets)?;
                recorder.capture(engine.canvas());
            }
            Ok(())
        })();

        recorder.stop();
        timeline.seek(saved_time);
        if saved_playing {
            timeline.play();
        }
        result?;

        Ok(service.encode(recorder.take_frames(), fps))
    }
}
