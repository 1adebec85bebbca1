//! Multi-pass render pipeline.
//!
//! Every frame runs three sequential passes over premultiplied surfaces:
//! scene composition, ping-pong post-processing, and a final blit to the
//! visible canvas. The post queue is rebuilt by active effects each frame
//! and cleared unconditionally at the end of every render.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::{
    assets::AssetStore,
    blur::{BlurDirection, blur_pass},
    effect::EffectKind,
    error::{KinettaError, KinettaResult},
    raster::{Painter, Surface},
    report::{Reporter, TracingReporter},
    timeline::Timeline,
};

/// A compiled full-frame program. The single-process analog of a fragment
/// shader: reads one surface, writes another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    Blur,
    BrightnessContrast,
    Invert,
}

impl Program {
    fn builtin(name: &str) -> Option<Self> {
        match name {
            "blur" => Some(Self::Blur),
            "brightnessContrast" => Some(Self::BrightnessContrast),
            "invert" => Some(Self::Invert),
            _ => None,
        }
    }

    fn run(self, src: &Surface, dst: &mut Surface, uniforms: &Uniforms) -> KinettaResult<()> {
        match (self, uniforms) {
            (
                Self::Blur,
                Uniforms::Blur {
                    direction,
                    radius_px,
                    sigma,
                },
            ) => blur_pass(src, dst, *radius_px, *sigma, *direction),
            (Self::BrightnessContrast, Uniforms::BrightnessContrast { brightness, contrast }) => {
                brightness_contrast_pass(src, dst, *brightness, *contrast)
            }
            (Self::Invert, Uniforms::None) => invert_pass(src, dst),
            _ => Err(KinettaError::render(
                "post pass uniforms do not match the program",
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Uniforms {
    Blur {
        direction: BlurDirection,
        radius_px: u32,
        sigma: f32,
    },
    BrightnessContrast {
        brightness: f64,
        contrast: f64,
    },
    None,
}

/// One queued full-frame pass.
#[derive(Clone, Debug, PartialEq)]
pub struct PostPass {
    pub program: String,
    pub uniforms: Uniforms,
}

/// Which ping-pong buffer holds the final image after `pass_count` passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalBuffer {
    Scene,
    Effect,
}

pub struct RenderEngine {
    scene: Surface,
    effect: Surface,
    canvas: Surface,
    programs: HashMap<String, Program>,
    queue: Vec<PostPass>,
    warned_programs: HashSet<String>,
    reporter: Arc<dyn Reporter>,
}

impl RenderEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_reporter(width, height, Arc::new(TracingReporter))
    }

    pub fn with_reporter(width: u32, height: u32, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            scene: Surface::new(width, height),
            effect: Surface::new(width, height),
            canvas: Surface::new(width, height),
            programs: HashMap::new(),
            queue: Vec::new(),
            warned_programs: HashSet::new(),
            reporter,
        }
    }

    /// The visible output of the last render.
    pub fn canvas(&self) -> &Surface {
        &self.canvas
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_pass(&mut self, pass: PostPass) {
        self.queue.push(pass);
    }

    /// Memoized program lookup: the builtin for `name` is constructed at most
    /// once and shared by later requests. Returns whether a program exists.
    pub fn ensure_program(&mut self, name: &str) -> bool {
        self.resolve_program(name).is_some()
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    fn resolve_program(&mut self, name: &str) -> Option<Program> {
        if let Some(p) = self.programs.get(name) {
            return Some(*p);
        }
        let p = Program::builtin(name)?;
        self.programs.insert(name.to_string(), p);
        Some(p)
    }

    /// Parity rule for the ping-pong chain: pass `i` reads scene when `i` is
    /// even and effect when odd, so after `pass_count` passes the final image
    /// sits in the buffer the next pass would read.
    pub fn ping_pong_final(pass_count: usize) -> FinalBuffer {
        if pass_count % 2 == 0 {
            FinalBuffer::Scene
        } else {
            FinalBuffer::Effect
        }
    }

    /// Renders the timeline's current frame into the canvas.
    #[tracing::instrument(skip_all, fields(time_ms = timeline.time()))]
    pub fn render(
        &mut self,
        timeline: &mut Timeline,
        assets: &mut AssetStore,
    ) -> KinettaResult<()> {
        let time = timeline.time();
        let state = timeline.frame_state(time);

        // Pass 1: scene composition. Standalone clips draw in layer order
        // with their CPU effects applied immediately before their own draw;
        // transition participants are drawn by their transitions afterwards.
        // Post effects register for every clip in the frame state, so a
        // participant's blur or invert keeps running through the transition.
        self.scene.clear();
        {
            let clips = timeline.clips_mut();
            for &id in &state.clips_to_process {
                let clip = &clips[id];
                let rel = time - clip.start;
                for effect in &clip.effects {
                    if effect.is_active(rel) {
                        self.enqueue_post(&effect.kind);
                    }
                }
            }
            for &id in &state.clips_to_process {
                if state.participants.contains(&id) {
                    continue;
                }
                let clip = &mut clips[id];
                let rel = time - clip.start;
                clip.apply_cpu_effects(rel);
                let mut painter = Painter::new(&mut self.scene);
                clip.render(&mut painter, assets, rel)?;
                painter.pop()?;
            }
        }

        for &idx in &state.active_transitions {
            let transition = timeline.transitions()[idx].clone();
            transition.render(timeline.clips_mut(), &mut self.scene, assets, time)?;
        }

        // Pass 2: ping-pong post-processing. An empty queue leaves the scene
        // buffer as the final image.
        let queue = std::mem::take(&mut self.queue);
        let mut pass_count = 0usize;
        for pass in &queue {
            let Some(program) = self.resolve_program(&pass.program) else {
                if self.warned_programs.insert(pass.program.clone()) {
                    self.reporter
                        .warning(&format!("skipping unknown post program '{}'", pass.program));
                }
                continue;
            };
            if pass_count % 2 == 0 {
                program.run(&self.scene, &mut self.effect, &pass.uniforms)?;
            } else {
                program.run(&self.effect, &mut self.scene, &pass.uniforms)?;
            }
            pass_count += 1;
        }

        // Pass 3: blit.
        match Self::ping_pong_final(pass_count) {
            FinalBuffer::Scene => {
                let scene = &self.scene;
                self.canvas.copy_from(scene)?;
            }
            FinalBuffer::Effect => {
                let effect = &self.effect;
                self.canvas.copy_from(effect)?;
            }
        }
        Ok(())
    }

    fn enqueue_post(&mut self, kind: &EffectKind) {
        match *kind {
            EffectKind::Blur { radius_px, sigma } => {
                self.ensure_program("blur");
                // Separable blur: horizontal first, vertical second.
                self.queue.push(PostPass {
                    program: "blur".to_string(),
                    uniforms: Uniforms::Blur {
                        direction: BlurDirection::Horizontal,
                        radius_px,
                        sigma: sigma as f32,
                    },
                });
                self.queue.push(PostPass {
                    program: "blur".to_string(),
                    uniforms: Uniforms::Blur {
                        direction: BlurDirection::Vertical,
                        radius_px,
                        sigma: sigma as f32,
                    },
                });
            }
            EffectKind::BrightnessContrast { brightness, contrast } => {
                self.ensure_program("brightnessContrast");
                self.queue.push(PostPass {
                    program: "brightnessContrast".to_string(),
                    uniforms: Uniforms::BrightnessContrast { brightness, contrast },
                });
            }
            EffectKind::Invert => {
                self.ensure_program("invert");
                self.queue.push(PostPass {
                    program: "invert".to_string(),
                    uniforms: Uniforms::None,
                });
            }
            EffectKind::FadeIn | EffectKind::FadeOut | EffectKind::Wiggle { .. } => {}
        }
    }
}

/// Brightness/contrast in straight-alpha space, re-premultiplied on write.
fn brightness_contrast_pass(
    src: &Surface,
    dst: &mut Surface,
    brightness: f64,
    contrast: f64,
) -> KinettaResult<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(KinettaError::render(
            "brightness/contrast pass surface size mismatch",
        ));
    }
    let gain = 1.0 + contrast.clamp(-1.0, 1.0);
    let lift = brightness.clamp(-1.0, 1.0);

    for (d, s) in dst.data.chunks_exact_mut(4).zip(src.data.chunks_exact(4)) {
        let a = s[3];
        if a == 0 {
            d.copy_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        let af = f64::from(a) / 255.0;
        for c in 0..3 {
            let straight = f64::from(s[c]) / 255.0 / af;
            let adjusted = ((straight - 0.5) * gain + 0.5 + lift).clamp(0.0, 1.0);
            d[c] = (adjusted * af * 255.0).round() as u8;
        }
        d[3] = a;
    }
    Ok(())
}

/// Channel inversion. In premultiplied form `a*(1-c)` is `a - c_premul`.
fn invert_pass(src: &Surface, dst: &mut Surface) -> KinettaResult<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(KinettaError::render("invert pass surface size mismatch"));
    }
    for (d, s) in dst.data.chunks_exact_mut(4).zip(src.data.chunks_exact(4)) {
        let a = s[3];
        d[0] = a.saturating_sub(s[0]);
        d[1] = a.saturating_sub(s[1]);
        d[2] = a.saturating_sub(s[2]);
        d[3] = a;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::ShapeSpec;
    use crate::clip::Clip;
    use crate::report::CollectingReporter;
    use crate::value::Rgba8;

    fn shape_clip(start: f64, duration: f64, layer: i32, color: Rgba8) -> Clip {
        Clip::shape(
            start,
            duration,
            layer,
            ShapeSpec::Rect {
                width: 8.0,
                height: 8.0,
                corner_radius: 0.0,
            },
            color,
        )
        .unwrap()
    }

    fn centered(mut clip: Clip, x: f64, y: f64) -> Clip {
        clip.set_initial("x", x).unwrap();
        clip.set_initial("y", y).unwrap();
        clip
    }

    #[test]
    fn ping_pong_parity() {
        assert_eq!(RenderEngine::ping_pong_final(0), FinalBuffer::Scene);
        assert_eq!(RenderEngine::ping_pong_final(1), FinalBuffer::Effect);
        assert_eq!(RenderEngine::ping_pong_final(2), FinalBuffer::Scene);
        assert_eq!(RenderEngine::ping_pong_final(3), FinalBuffer::Effect);
    }

    #[test]
    fn ensure_program_memoizes() {
        let mut engine = RenderEngine::new(4, 4);
        assert!(engine.ensure_program("blur"));
        assert!(engine.ensure_program("blur"));
        assert_eq!(engine.program_count(), 1);
        assert!(!engine.ensure_program("bloom"));
    }

    #[test]
    fn invert_round_trips() {
        let mut src = Surface::new(2, 1);
        src.put_pixel(0, 0, [200, 100, 50, 255]);
        src.put_pixel(1, 0, [0, 0, 0, 0]);

        let mut once = Surface::new(2, 1);
        invert_pass(&src, &mut once).unwrap();
        assert_eq!(once.pixel(0, 0), [55, 155, 205, 255]);
        assert_eq!(once.pixel(1, 0), [0, 0, 0, 0]);

        let mut twice = Surface::new(2, 1);
        invert_pass(&once, &mut twice).unwrap();
        assert_eq!(twice.pixel(0, 0), [200, 100, 50, 255]);
    }

    #[test]
    fn render_with_no_effects_blits_the_scene() {
        let mut tl = Timeline::new(5000.0, 60.0).unwrap();
        tl.add_clip(centered(
            shape_clip(0.0, 5000.0, 0, Rgba8::new(255, 0, 0, 255)),
            8.0,
            8.0,
        ));
        tl.update(0.0).unwrap();

        let mut engine = RenderEngine::new(16, 16);
        let mut assets = AssetStore::new(".");
        tl.render(&mut engine, &mut assets).unwrap();

        assert_eq!(engine.canvas().pixel(8, 8), [255, 0, 0, 255]);
        assert_eq!(engine.canvas().pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn odd_pass_count_lands_in_the_effect_buffer() {
        let mut tl = Timeline::new(5000.0, 60.0).unwrap();
        let id = tl.add_clip(centered(
            shape_clip(0.0, 5000.0, 0, Rgba8::new(200, 100, 50, 255)),
            8.0,
            8.0,
        ));
        tl.add_effect(id, "invert", 0.0, 5000.0, &serde_json::Value::Null)
            .unwrap();
        tl.update(0.0).unwrap();

        let mut engine = RenderEngine::new(16, 16);
        let mut assets = AssetStore::new(".");
        tl.render(&mut engine, &mut assets).unwrap();

        // One pass: the canvas holds the inverted scene.
        assert_eq!(engine.canvas().pixel(8, 8), [55, 155, 205, 255]);
        assert_eq!(engine.queue_len(), 0);
    }

    #[test]
    fn even_pass_count_lands_back_in_the_scene_buffer() {
        let mut tl = Timeline::new(5000.0, 60.0).unwrap();
        let id = tl.add_clip(centered(
            shape_clip(0.0, 5000.0, 0, Rgba8::new(200, 100, 50, 255)),
            8.0,
            8.0,
        ));
        tl.add_effect(id, "invert", 0.0, 5000.0, &serde_json::Value::Null)
            .unwrap();
        tl.add_effect(id, "invert", 0.0, 5000.0, &serde_json::Value::Null)
            .unwrap();
        tl.update(0.0).unwrap();

        let mut engine = RenderEngine::new(16, 16);
        let mut assets = AssetStore::new(".");
        tl.render(&mut engine, &mut assets).unwrap();

        // Two passes cancel out.
        assert_eq!(engine.canvas().pixel(8, 8), [200, 100, 50, 255]);
    }

    #[test]
    fn queue_clears_even_when_no_pass_runs() {
        let mut tl = Timeline::new(5000.0, 60.0).unwrap();
        tl.update(0.0).unwrap();

        let reporter = Arc::new(CollectingReporter::new());
        let mut engine = RenderEngine::with_reporter(8, 8, reporter.clone());
        engine.queue_pass(PostPass {
            program: "bloom".to_string(),
            uniforms: Uniforms::None,
        });

        let mut assets = AssetStore::new(".");
        tl.render(&mut engine, &mut assets).unwrap();
        assert_eq!(engine.queue_len(), 0);
        assert_eq!(reporter.len(), 1);

        // The same unknown program does not warn again.
        engine.queue_pass(PostPass {
            program: "bloom".to_string(),
            uniforms: Uniforms::None,
        });
        tl.render(&mut engine, &mut assets).unwrap();
        assert_eq!(reporter.len(), 1);
    }

    #[test]
    fn transitions_draw_their_participants() {
        let mut tl = Timeline::new(5000.0, 60.0).unwrap();
        let a = tl.add_clip(centered(
            shape_clip(0.0, 1000.0, 0, Rgba8::new(255, 0, 0, 255)),
            8.0,
            8.0,
        ));
        let b = tl.add_clip(centered(
            shape_clip(500.0, 1000.0, 1, Rgba8::new(0, 0, 255, 255)),
            8.0,
            8.0,
        ));
        tl.add_transition("crossfade", a, b, Some(500.0), 500.0, &serde_json::Value::Null)
            .unwrap()
            .unwrap();

        tl.seek(750.0);
        tl.update(0.0).unwrap();

        let mut engine = RenderEngine::new(16, 16);
        let mut assets = AssetStore::new(".");
        tl.render(&mut engine, &mut assets).unwrap();

        // At p=0.5 both participants contribute.
        let px = engine.canvas().pixel(8, 8);
        assert!(px[0] > 0, "red participant missing: {px:?}");
        assert!(px[2] > 0, "blue participant missing: {px:?}");
    }
}
