//! Transitions between two clips.
//!
//! A transition owns its participants' drawing while it is active: the
//! engine skips the participant clips during normal scene composition and
//! the transition renders both itself. Participant state is never left
//! modified after the transition draws.

use crate::{
    assets::AssetStore,
    clip::{Clip, ClipId},
    error::{KinettaError, KinettaResult},
    raster::{Painter, Surface, wipe_over},
};

pub type TransitionId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WipeDir {
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransitionKind {
    CrossFade,
    Wipe { dir: WipeDir, soft_edge: f32 },
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub from: ClipId,
    pub to: ClipId,
    /// Timeline-relative ms.
    pub start: f64,
    pub duration: f64,
    pub kind: TransitionKind,
}

impl Transition {
    /// Builds a transition over `clips`. `start` defaults to the target
    /// clip's start. Referencing a missing clip or a non-positive duration
    /// fails fast.
    pub fn new(
        clips: &[Clip],
        from: ClipId,
        to: ClipId,
        start: Option<f64>,
        duration: f64,
        kind: TransitionKind,
    ) -> KinettaResult<Self> {
        if from >= clips.len() || to >= clips.len() {
            return Err(KinettaError::validation(
                "transition references a clip that does not exist",
            ));
        }
        if from == to {
            return Err(KinettaError::validation(
                "transition endpoints must be distinct clips",
            ));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(KinettaError::validation(
                "transition duration must be finite and > 0",
            ));
        }
        let start = start.unwrap_or(clips[to].start);
        if !start.is_finite() || start < 0.0 {
            return Err(KinettaError::validation(
                "transition start must be finite and >= 0",
            ));
        }
        Ok(Self { from, to, start, duration, kind })
    }

    /// 0 before the window, 1 after, linear in between.
    pub fn progress(&self, timeline_ms: f64) -> f64 {
        ((timeline_ms - self.start) / self.duration).clamp(0.0, 1.0)
    }

    pub fn is_active(&self, timeline_ms: f64) -> bool {
        timeline_ms >= self.start && timeline_ms < self.start + self.duration
    }

    pub fn involves(&self, id: ClipId) -> bool {
        self.from == id || self.to == id
    }

    /// Draws both participants into `scene` at progress for `timeline_ms`.
    ///
    /// Each participant's CPU effects run at its own clip-relative time.
    /// Opacity values touched by the crossfade are restored before this
    /// returns, on the error path too.
    pub fn render(
        &self,
        clips: &mut [Clip],
        scene: &mut Surface,
        assets: &mut AssetStore,
        timeline_ms: f64,
    ) -> KinettaResult<()> {
        let p = self.progress(timeline_ms);
        match self.kind {
            TransitionKind::CrossFade => {
                let saved_from = clips[self.from].properties.opacity;
                let saved_to = clips[self.to].properties.opacity;

                let mut draw = |id: ClipId, opacity_scale: f64| -> KinettaResult<()> {
                    let clip = &mut clips[id];
                    let rel = timeline_ms - clip.start;
                    clip.properties.opacity *= opacity_scale;
                    clip.apply_cpu_effects(rel);
                    let mut painter = Painter::new(scene);
                    clip.render(&mut painter, assets, rel)?;
                    painter.pop()
                };

                let result = draw(self.from, 1.0 - p).and_then(|()| draw(self.to, p));

                clips[self.from].properties.opacity = saved_from;
                clips[self.to].properties.opacity = saved_to;
                result
            }
            TransitionKind::Wipe { dir, soft_edge } => {
                let mut layer_a = Surface::new(scene.width, scene.height);
                let mut layer_b = Surface::new(scene.width, scene.height);

                let mut draw =
                    |id: ClipId, target: &mut Surface| -> KinettaResult<()> {
                        let clip = &mut clips[id];
                        let rel = timeline_ms - clip.start;
                        clip.apply_cpu_effects(rel);
                        let mut painter = Painter::new(target);
                        clip.render(&mut painter, assets, rel)?;
                        painter.pop()
                    };

                draw(self.from, &mut layer_a)?;
                draw(self.to, &mut layer_b)?;
                wipe_over(scene, &layer_a, &layer_b, p as f32, dir, soft_edge)
            }
        }
    }
}

pub fn parse_crossfade(_params: &serde_json::Value) -> KinettaResult<TransitionKind> {
    Ok(TransitionKind::CrossFade)
}

pub fn parse_wipe(params: &serde_json::Value) -> KinettaResult<TransitionKind> {
    let params = if params.is_null() {
        None
    } else {
        Some(
            params
                .as_object()
                .ok_or_else(|| KinettaError::validation("wipe params must be an object"))?,
        )
    };

    let dir = match params.and_then(|p| p.get("dir")).and_then(|v| v.as_str()) {
        None => WipeDir::LeftToRight,
        Some(s) => match s.trim().to_ascii_lowercase().as_str() {
            "left_to_right" | "lefttoright" | "ltr" => WipeDir::LeftToRight,
            "right_to_left" | "righttoleft" | "rtl" => WipeDir::RightToLeft,
            "top_to_bottom" | "toptobottom" | "ttb" => WipeDir::TopToBottom,
            "bottom_to_top" | "bottomtotop" | "btt" => WipeDir::BottomToTop,
            other => {
                return Err(KinettaError::validation(format!(
                    "unknown wipe.dir '{other}'"
                )));
            }
        },
    };

    let soft_edge = match params.and_then(|p| p.get("soft_edge")).and_then(|v| v.as_f64()) {
        None => 0.0,
        Some(v) => {
            let f = v as f32;
            if !f.is_finite() {
                return Err(KinettaError::validation(
                    "wipe.soft_edge must be finite when set",
                ));
            }
            f.clamp(0.0, 1.0)
        }
    };

    Ok(TransitionKind::Wipe { dir, soft_edge })
}
