//! Clips: timed, layered pieces of content with keyframed properties.
//!
//! Every clip shares the same lifecycle. `update` resets the property bag
//! from its construction snapshot, samples every keyframe track, and runs
//! kind-specific upkeep (media sync, slideshow children). `render` pushes a
//! transform derived from the current properties and draws the kind's
//! content; the caller pops.

use std::collections::BTreeMap;

use crate::{
    assets::{AssetStore, ShapeSpec, TextSpec},
    ease::Ease,
    effect::Effect,
    error::{KinettaError, KinettaResult},
    keyframe::{KeyTrack, Keyframe},
    media::{MediaHandle, MediaSlot, open_media},
    properties::PropertyBag,
    raster::Painter,
    value::{Rgba8, Value},
};

/// Index into the timeline's clip slab. Clips are never removed, so ids stay
/// valid for the timeline's lifetime.
pub type ClipId = usize;

#[derive(Debug)]
pub enum ClipKind {
    Text {
        spec: TextSpec,
    },
    Shape {
        spec: ShapeSpec,
        color: Rgba8,
    },
    Image {
        source: String,
    },
    Video {
        source: String,
        media: MediaSlot,
    },
    Audio {
        source: String,
        media: MediaSlot,
    },
    SlideShow {
        slides: Vec<Vec<Clip>>,
        current: usize,
        /// Clip-relative ms at which the current slide was activated.
        activated_at: f64,
    },
}

#[derive(Debug)]
pub struct Clip {
    /// Timeline-relative ms.
    pub start: f64,
    pub duration: f64,
    /// Render order, ascending.
    pub layer: i32,
    /// Sprite-cache key for kinds with cacheable content.
    pub asset_key: Option<String>,
    pub properties: PropertyBag,
    initial: PropertyBag,
    tracks: BTreeMap<String, KeyTrack>,
    pub effects: Vec<Effect>,
    pub kind: ClipKind,
}

impl Clip {
    fn base(start: f64, duration: f64, layer: i32, kind: ClipKind) -> KinettaResult<Self> {
        if !start.is_finite() || start < 0.0 {
            return Err(KinettaError::validation("clip start must be finite and >= 0"));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(KinettaError::validation(
                "clip duration must be finite and > 0",
            ));
        }
        let properties = PropertyBag::new();
        let initial = properties.clone();
        Ok(Self {
            start,
            duration,
            layer,
            asset_key: None,
            properties,
            initial,
            tracks: BTreeMap::new(),
            effects: Vec::new(),
            kind,
        })
    }

    pub fn text(start: f64, duration: f64, layer: i32, spec: TextSpec) -> KinettaResult<Self> {
        if spec.content.is_empty() {
            return Err(KinettaError::validation("text content must be non-empty"));
        }
        let key = format!(
            "text:{}:{}:{}:{}",
            spec.content,
            spec.size_px,
            spec.color.css_hex(),
            spec.font_family
        );
        let mut clip = Self::base(start, duration, layer, ClipKind::Text { spec })?;
        clip.asset_key = Some(key);
        Ok(clip)
    }

    pub fn shape(
        start: f64,
        duration: f64,
        layer: i32,
        spec: ShapeSpec,
        color: Rgba8,
    ) -> KinettaResult<Self> {
        let key = format!("shape:{spec:?}:{}", color.css_hex());
        let mut clip = Self::base(start, duration, layer, ClipKind::Shape { spec, color })?;
        clip.asset_key = Some(key);
        Ok(clip)
    }

    pub fn image(start: f64, duration: f64, layer: i32, source: &str) -> KinettaResult<Self> {
        validate_media_source(source)?;
        let mut clip = Self::base(
            start,
            duration,
            layer,
            ClipKind::Image { source: source.to_string() },
        )?;
        clip.asset_key = Some(source.to_string());
        Ok(clip)
    }

    pub fn video(start: f64, duration: f64, layer: i32, source: &str) -> KinettaResult<Self> {
        validate_media_source(source)?;
        let mut clip = Self::base(
            start,
            duration,
            layer,
            ClipKind::Video {
                source: source.to_string(),
                media: MediaSlot::new(source),
            },
        )?;
        clip.declare_property("volume", Value::Number(1.0));
        Ok(clip)
    }

    pub fn audio(start: f64, duration: f64, layer: i32, source: &str) -> KinettaResult<Self> {
        validate_media_source(source)?;
        let mut clip = Self::base(
            start,
            duration,
            layer,
            ClipKind::Audio {
                source: source.to_string(),
                media: MediaSlot::new(source),
            },
        )?;
        clip.declare_property("volume", Value::Number(1.0));
        clip.declare_property("pan", Value::Number(0.0));
        Ok(clip)
    }

    pub fn slideshow(start: f64, duration: f64, layer: i32) -> KinettaResult<Self> {
        Self::base(
            start,
            duration,
            layer,
            ClipKind::SlideShow {
                slides: Vec::new(),
                current: 0,
                activated_at: 0.0,
            },
        )
    }

    /// Sets a property's construction-time value in both the live bag and
    /// the reset snapshot, so `update` preserves it.
    pub fn set_initial(&mut self, name: &str, value: impl Into<Value>) -> KinettaResult<()> {
        let value = value.into();
        self.initial.set(name, value.clone())?;
        self.properties.set(name, value)
    }

    /// Declares an extension property and folds it into the construction
    /// snapshot, so `update`'s reset keeps it.
    pub fn declare_property(&mut self, name: impl Into<String>, initial: impl Into<Value>) {
        let name = name.into();
        let initial = initial.into();
        self.properties.declare(name.clone(), initial.clone());
        self.initial.declare(name, initial);
    }

    pub fn is_active(&self, timeline_ms: f64) -> bool {
        timeline_ms >= self.start && timeline_ms < self.start + self.duration
    }

    pub fn track(&self, prop: &str) -> Option<&KeyTrack> {
        self.tracks.get(prop)
    }

    /// Adds a keyframe with an immediate re-sort. Keyframing a property that
    /// is not part of the clip's schema is an error.
    pub fn add_keyframe(
        &mut self,
        prop: &str,
        time: f64,
        value: impl Into<Value>,
        ease: Ease,
    ) -> KinettaResult<()> {
        self.keyframe_checked(prop, time)?;
        self.tracks
            .entry(prop.to_string())
            .or_default()
            .insert(Keyframe::new(time, value, ease));
        Ok(())
    }

    /// Batch-path variant: appends without sorting. The owning timeline calls
    /// [`Clip::finalize_changes`] when the batch commits.
    pub(crate) fn add_keyframe_deferred(
        &mut self,
        prop: &str,
        time: f64,
        value: Value,
        ease: Ease,
    ) -> KinettaResult<()> {
        self.keyframe_checked(prop, time)?;
        self.tracks
            .entry(prop.to_string())
            .or_default()
            .push_deferred(Keyframe::new(time, value, ease));
        Ok(())
    }

    fn keyframe_checked(&self, prop: &str, time: f64) -> KinettaResult<()> {
        if !self.properties.contains(prop) {
            return Err(KinettaError::validation(format!(
                "cannot keyframe '{prop}': not a declared property of this clip"
            )));
        }
        if !time.is_finite() || time < 0.0 {
            return Err(KinettaError::animation(
                "keyframe time must be finite and >= 0",
            ));
        }
        Ok(())
    }

    /// Restores the time ordering of every track touched by a deferred push.
    pub fn finalize_changes(&mut self) {
        for track in self.tracks.values_mut() {
            if !track.is_sorted() {
                track.finalize();
            }
        }
    }

    /// Per-frame state refresh at clip-relative `relative_ms`.
    ///
    /// `playing` is the owning timeline's transport state; media-backed kinds
    /// use it with the activity window to decide play/pause/seek.
    pub fn update(&mut self, relative_ms: f64, playing: bool) -> KinettaResult<()> {
        self.properties.reset_from(&self.initial);
        for (name, track) in &self.tracks {
            if let Some(value) = track.sample(relative_ms) {
                self.properties.set(name, value)?;
            }
        }

        let in_window = relative_ms >= 0.0 && relative_ms < self.duration;
        let should_play = playing && in_window;
        match &mut self.kind {
            ClipKind::Video { media, .. } => {
                media.ensure_loaded(open_media)?;
                media.sync(relative_ms / 1000.0, should_play)?;
                if let Some(handle) = media.handle_mut() {
                    handle.set_volume(self.properties.number_or("volume", 1.0));
                }
            }
            ClipKind::Audio { media, .. } => {
                media.ensure_loaded(open_media)?;
                media.sync(relative_ms / 1000.0, should_play)?;
                if let Some(handle) = media.handle_mut() {
                    handle.set_volume(self.properties.number_or("volume", 1.0));
                    handle.set_pan(self.properties.number_or("pan", 0.0));
                }
            }
            ClipKind::SlideShow {
                slides,
                current,
                activated_at,
            } => {
                if let Some(children) = slides.get_mut(*current) {
                    let slide_ms = relative_ms - *activated_at;
                    for child in children {
                        child.update(slide_ms - child.start, playing)?;
                    }
                }
            }
            ClipKind::Text { .. } | ClipKind::Shape { .. } | ClipKind::Image { .. } => {}
        }
        Ok(())
    }

    /// Runs the CPU effects against the current properties at clip-relative
    /// time. Called once per frame, immediately before this clip draws.
    pub fn apply_cpu_effects(&mut self, relative_ms: f64) {
        for effect in &self.effects {
            if !effect.kind.is_post() {
                effect.apply_to(&mut self.properties, relative_ms);
            }
        }
    }

    /// Draws the clip's content under its property-derived transform.
    ///
    /// Pushes exactly one painter state; the caller is responsible for the
    /// matching pop.
    pub fn render(
        &mut self,
        painter: &mut Painter<'_>,
        assets: &mut AssetStore,
        relative_ms: f64,
    ) -> KinettaResult<()> {
        painter.push();
        painter.translate(self.properties.x, self.properties.y);
        painter.rotate(self.properties.rotation);
        painter.scale(self.properties.scale);
        painter.mul_alpha(self.properties.opacity);

        match &mut self.kind {
            ClipKind::Text { spec } => {
                if let Some(key) = self.asset_key.as_deref() {
                    let sprite = assets.text(key, spec)?;
                    painter.draw_sprite(&sprite)?;
                }
            }
            ClipKind::Shape { spec, color } => {
                if let Some(key) = self.asset_key.as_deref() {
                    let sprite = assets.shape(key, spec, *color)?;
                    painter.draw_sprite(&sprite)?;
                }
            }
            ClipKind::Image { source } => {
                let sprite = assets.image(source)?;
                painter.draw_sprite(&sprite)?;
            }
            ClipKind::Video { media, .. } => {
                if let Some(handle) = media.handle_mut()
                    && let Some(frame) = handle.current_frame()?
                {
                    painter.draw_sprite(&frame)?;
                }
            }
            ClipKind::Audio { .. } => {}
            ClipKind::SlideShow {
                slides,
                current,
                activated_at,
            } => {
                if let Some(children) = slides.get_mut(*current) {
                    let slide_ms = relative_ms - *activated_at;
                    let mut order: Vec<usize> = (0..children.len()).collect();
                    order.sort_by_key(|&i| children[i].layer);
                    for idx in order {
                        let child = &mut children[idx];
                        if !child.is_active(slide_ms) {
                            continue;
                        }
                        let child_ms = slide_ms - child.start;
                        child.apply_cpu_effects(child_ms);
                        child.render(painter, assets, child_ms)?;
                        painter.pop()?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Injects a preconstructed media handle, marking the slot ready. Used
    /// for sources the host decodes itself and for tests.
    pub fn set_media_handle(&mut self, handle: Box<dyn MediaHandle>) -> KinettaResult<()> {
        match &mut self.kind {
            ClipKind::Video { media, .. } | ClipKind::Audio { media, .. } => {
                *media = MediaSlot::Ready(handle);
                Ok(())
            }
            _ => Err(KinettaError::validation(
                "only video and audio clips carry a media handle",
            )),
        }
    }

    pub fn add_slide(&mut self, children: Vec<Clip>) -> KinettaResult<usize> {
        match &mut self.kind {
            ClipKind::SlideShow { slides, .. } => {
                slides.push(children);
                Ok(slides.len() - 1)
            }
            _ => Err(KinettaError::validation("not a slideshow clip")),
        }
    }

    /// Advances to the next slide, recording `relative_ms` as the activation
    /// time so the new slide's animations start from zero. Saturates at the
    /// last slide.
    pub fn next_slide(&mut self, relative_ms: f64) -> KinettaResult<()> {
        match &mut self.kind {
            ClipKind::SlideShow {
                slides,
                current,
                activated_at,
            } => {
                if *current + 1 < slides.len() {
                    *current += 1;
                    *activated_at = relative_ms;
                }
                Ok(())
            }
            _ => Err(KinettaError::validation("not a slideshow clip")),
        }
    }

    pub fn previous_slide(&mut self, relative_ms: f64) -> KinettaResult<()> {
        match &mut self.kind {
            ClipKind::SlideShow {
                slides: _,
                current,
                activated_at,
            } => {
                if *current > 0 {
                    *current -= 1;
                    *activated_at = relative_ms;
                }
                Ok(())
            }
            _ => Err(KinettaError::validation("not a slideshow clip")),
        }
    }
}

/// Bare paths are accepted as-is; URL-style sources must use a known scheme.
fn validate_media_source(source: &str) -> KinettaResult<()> {
    if source.trim().is_empty() {
        return Err(KinettaError::validation("media source must be non-empty"));
    }
    if let Some((scheme, rest)) = source.split_once("://") {
        if rest.is_empty() {
            return Err(KinettaError::validation(format!(
                "media source '{source}' has no path after the scheme"
            )));
        }
        match scheme {
            "file" | "http" | "https" => {}
            other => {
                return Err(KinettaError::validation(format!(
                    "unsupported media source scheme '{other}'"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::effect::EffectKind;
    use crate::media::TransportHandle;
    use crate::raster::Sprite;

    fn text_clip(start: f64, duration: f64) -> Clip {
        Clip::text(
            start,
            duration,
            0,
            TextSpec {
                content: "hello".into(),
                size_px: 24.0,
                color: Rgba8::WHITE,
                font_family: "sans-serif".into(),
            },
        )
        .unwrap()
    }

    #[derive(Clone)]
    struct SharedTransport(Arc<Mutex<TransportHandle>>);

    impl MediaHandle for SharedTransport {
        fn duration_sec(&self) -> f64 {
            self.0.lock().unwrap().duration_sec()
        }
        fn position_sec(&self) -> f64 {
            self.0.lock().unwrap().position_sec()
        }
        fn seek(&mut self, sec: f64) -> KinettaResult<()> {
            self.0.lock().unwrap().seek(sec)
        }
        fn play(&mut self) {
            self.0.lock().unwrap().play()
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().pause()
        }
        fn is_playing(&self) -> bool {
            self.0.lock().unwrap().is_playing()
        }
        fn current_frame(&mut self) -> KinettaResult<Option<Sprite>> {
            Ok(None)
        }
    }

    #[test]
    fn constructor_rejects_bad_window_and_source() {
        assert!(Clip::image(0.0, 0.0, 0, "a.png").is_err());
        assert!(Clip::image(0.0, 1000.0, 0, "").is_err());
        assert!(Clip::video(0.0, 1000.0, 0, "javascript://x").is_err());
        assert!(Clip::video(0.0, 1000.0, 0, "https://cdn.example/v.mp4").is_ok());
        assert!(Clip::video(0.0, 1000.0, 0, "media/v.mp4").is_ok());
    }

    #[test]
    fn keyframing_undeclared_property_errors() {
        let mut clip = text_clip(0.0, 1000.0);
        let err = clip
            .add_keyframe("volume", 0.0, 1.0, Ease::Linear)
            .unwrap_err();
        assert!(err.to_string().contains("volume"));

        clip.declare_property("volume", Value::Number(1.0));
        clip.add_keyframe("volume", 0.0, 1.0, Ease::Linear).unwrap();
    }

    #[test]
    fn update_resets_then_samples_tracks() {
        let mut clip = text_clip(0.0, 1000.0);
        clip.add_keyframe("x", 0.0, 0.0, Ease::Linear).unwrap();
        clip.add_keyframe("x", 1000.0, 100.0, Ease::Linear).unwrap();

        // Out-of-band mutation is undone by the next update's reset.
        clip.properties.y = 55.0;
        clip.update(500.0, false).unwrap();
        assert_eq!(clip.properties.x, 50.0);
        assert_eq!(clip.properties.y, 0.0);
    }

    #[test]
    fn cpu_effects_apply_at_render_time_not_update() {
        let mut clip = text_clip(0.0, 1000.0);
        clip.effects
            .push(Effect::new(0.0, 1000.0, EffectKind::FadeOut).unwrap());

        clip.update(500.0, false).unwrap();
        assert_eq!(clip.properties.opacity, 1.0);

        clip.apply_cpu_effects(500.0);
        assert!((clip.properties.opacity - 0.5).abs() < 1e-9);

        // A second update restores the pre-effect value.
        clip.update(500.0, false).unwrap();
        assert_eq!(clip.properties.opacity, 1.0);
    }

    #[test]
    fn media_plays_only_inside_the_window() {
        let shared = SharedTransport(Arc::new(Mutex::new(TransportHandle::with_duration(30.0))));
        let mut clip = Clip::video(1000.0, 2000.0, 0, "v.mp4").unwrap();
        clip.set_media_handle(Box::new(shared.clone())).unwrap();

        clip.update(-500.0, true).unwrap();
        assert!(!shared.0.lock().unwrap().is_playing());

        clip.update(500.0, true).unwrap();
        {
            let h = shared.0.lock().unwrap();
            assert!(h.is_playing());
            assert_eq!(h.position_sec(), 0.5);
        }

        clip.update(2500.0, true).unwrap();
        assert!(!shared.0.lock().unwrap().is_playing());
    }

    #[test]
    fn media_stays_paused_while_timeline_is_paused() {
        let shared = SharedTransport(Arc::new(Mutex::new(TransportHandle::with_duration(30.0))));
        let mut clip = Clip::video(0.0, 2000.0, 0, "v.mp4").unwrap();
        clip.set_media_handle(Box::new(shared.clone())).unwrap();

        clip.update(500.0, false).unwrap();
        assert!(!shared.0.lock().unwrap().is_playing());
    }

    #[test]
    fn slideshow_children_run_relative_to_activation() {
        let mut show = Clip::slideshow(0.0, 10_000.0, 0).unwrap();

        let mut first = text_clip(0.0, 3000.0);
        first.add_keyframe("x", 0.0, 0.0, Ease::Linear).unwrap();
        first.add_keyframe("x", 1000.0, 100.0, Ease::Linear).unwrap();
        show.add_slide(vec![first]).unwrap();

        let mut second = text_clip(0.0, 3000.0);
        second.add_keyframe("x", 0.0, 0.0, Ease::Linear).unwrap();
        second.add_keyframe("x", 1000.0, 100.0, Ease::Linear).unwrap();
        show.add_slide(vec![second]).unwrap();

        show.update(500.0, true).unwrap();
        if let ClipKind::SlideShow { slides, current, .. } = &show.kind {
            assert_eq!(*current, 0);
            assert_eq!(slides[0][0].properties.x, 50.0);
        } else {
            unreachable!();
        }

        // Navigating at t=2000 restarts the new slide's animation clock.
        show.next_slide(2000.0).unwrap();
        show.update(2500.0, true).unwrap();
        if let ClipKind::SlideShow { slides, current, .. } = &show.kind {
            assert_eq!(*current, 1);
            assert_eq!(slides[1][0].properties.x, 50.0);
        } else {
            unreachable!();
        }
    }

    #[test]
    fn slideshow_navigation_saturates() {
        let mut show = Clip::slideshow(0.0, 1000.0, 0).unwrap();
        show.add_slide(Vec::new()).unwrap();
        show.previous_slide(0.0).unwrap();
        show.next_slide(100.0).unwrap();
        if let ClipKind::SlideShow { current, activated_at, .. } = &show.kind {
            assert_eq!(*current, 0);
            // Saturated navigation does not restart the slide clock.
            assert_eq!(*activated_at, 0.0);
        } else {
            unreachable!();
        }
    }
}
