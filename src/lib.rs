#![forbid(unsafe_code)]

//! Kinetta is a keyframe-driven timeline and compositing engine.
//!
//! A [`Timeline`] holds clips, transitions, and the plugin registries for
//! effect and transition types. A [`RenderEngine`] turns the timeline's
//! current time into a composited RGBA canvas, and [`Exporter`] walks the
//! timeline frame by frame, handing captured frames to an
//! [`EncoderService`] job.

pub mod assets;
pub mod blur;
pub mod clip;
pub mod ease;
pub mod effect;
pub mod encode_ffmpeg;
pub mod encode_gif;
pub mod engine;
pub mod error;
pub mod export;
pub mod keyframe;
pub mod media;
pub mod plugin;
pub mod properties;
pub mod raster;
pub mod report;
pub mod timeline;
pub mod transition;
pub mod value;

pub use assets::AssetStore;
pub use clip::{Clip, ClipId, ClipKind};
pub use ease::Ease;
pub use effect::{Effect, EffectKind};
pub use encode_ffmpeg::FfmpegEncoderService;
pub use encode_gif::GifEncoderService;
pub use engine::RenderEngine;
pub use error::{KinettaError, KinettaResult};
pub use export::{EncoderService, ExportEvent, Exporter, FrameRecorder};
pub use keyframe::{KeyTrack, Keyframe};
pub use media::{MediaHandle, MediaSlot};
pub use plugin::{Plugin, PluginManager};
pub use properties::PropertyBag;
pub use raster::{Painter, Sprite, Surface};
pub use report::{CollectingReporter, Reporter, TracingReporter};
pub use timeline::{FrameState, Timeline};
pub use transition::{Transition, TransitionId, TransitionKind, WipeDir};
pub use value::{Rgba8, Value};
