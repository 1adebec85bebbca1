//! The timeline: master clock, clip slab, batching, frame state.
//!
//! Clips live in an append-only slab indexed by [`ClipId`]; a separate
//! layer-ordered id list carries the render order. Structural mutations can
//! be batched: inside a batch keyframe inserts skip their per-insert sort and
//! clip additions skip the layer re-sort, and the commit at batch end
//! restores both invariants exactly once, even when the batch body fails or
//! panics.

use std::collections::{BTreeSet, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;

use crate::{
    assets::AssetStore,
    clip::{Clip, ClipId},
    ease::Ease,
    effect::{Effect, EffectKind},
    engine::RenderEngine,
    error::{KinettaError, KinettaResult},
    plugin::{Plugin, PluginManager, builtin_plugins},
    report::{Reporter, TracingReporter},
    transition::{Transition, TransitionId, TransitionKind},
    value::Value,
};

pub type EffectCtor = fn(&serde_json::Value) -> KinettaResult<EffectKind>;
pub type TransitionCtor = fn(&serde_json::Value) -> KinettaResult<TransitionKind>;

/// What a single frame works on: the active clips (layer order, transition
/// participants included even when their own window has ended) and the active
/// transitions.
#[derive(Clone, Debug, Default)]
pub struct FrameState {
    pub clips_to_process: Vec<ClipId>,
    pub participants: BTreeSet<ClipId>,
    pub active_transitions: Vec<TransitionId>,
}

pub struct Timeline {
    clips: Vec<Clip>,
    layer_order: Vec<ClipId>,
    transitions: Vec<Transition>,
    time: f64,
    playing: bool,
    duration: f64,
    frame_rate: f64,
    batching: bool,
    dirty: BTreeSet<ClipId>,
    needs_clip_sorting: bool,
    plugins: PluginManager,
    effect_types: HashMap<String, EffectCtor>,
    transition_types: HashMap<String, TransitionCtor>,
    reporter: Arc<dyn Reporter>,
}

impl Timeline {
    /// A timeline of `duration_ms` with the builtin effect and transition
    /// plugins pre-registered (loaded lazily on first use).
    pub fn new(duration_ms: f64, frame_rate: f64) -> KinettaResult<Self> {
        Self::with_reporter(duration_ms, frame_rate, Arc::new(TracingReporter))
    }

    pub fn with_reporter(
        duration_ms: f64,
        frame_rate: f64,
        reporter: Arc<dyn Reporter>,
    ) -> KinettaResult<Self> {
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            return Err(KinettaError::validation(
                "timeline duration must be finite and > 0",
            ));
        }
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(KinettaError::validation(
                "timeline frame rate must be finite and > 0",
            ));
        }
        let mut tl = Self {
            clips: Vec::new(),
            layer_order: Vec::new(),
            transitions: Vec::new(),
            time: 0.0,
            playing: false,
            duration: duration_ms,
            frame_rate,
            batching: false,
            dirty: BTreeSet::new(),
            needs_clip_sorting: false,
            plugins: PluginManager::new(),
            effect_types: HashMap::new(),
            transition_types: HashMap::new(),
            reporter,
        };
        for plugin in builtin_plugins() {
            tl.add_plugin(plugin);
        }
        Ok(tl)
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn seek(&mut self, time_ms: f64) {
        self.time = time_ms.clamp(0.0, self.duration);
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.get(id)
    }

    pub fn clip_mut(&mut self, id: ClipId) -> Option<&mut Clip> {
        self.clips.get_mut(id)
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub(crate) fn clips_mut(&mut self) -> &mut [Clip] {
        &mut self.clips
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn add_plugin(&mut self, plugin: Plugin) -> bool {
        let reporter = Arc::clone(&self.reporter);
        self.plugins.register(plugin, reporter.as_ref())
    }

    pub fn register_effect_type(&mut self, name: &str, ctor: EffectCtor) {
        if self.effect_types.contains_key(name) {
            self.reporter.warning(&format!(
                "effect type '{name}' already registered; keeping the first"
            ));
            return;
        }
        self.effect_types.insert(name.to_string(), ctor);
    }

    pub fn register_transition_type(&mut self, name: &str, ctor: TransitionCtor) {
        if self.transition_types.contains_key(name) {
            self.reporter.warning(&format!(
                "transition type '{name}' already registered; keeping the first"
            ));
            return;
        }
        self.transition_types.insert(name.to_string(), ctor);
    }

    pub fn has_effect_type(&self, name: &str) -> bool {
        self.effect_types.contains_key(name)
    }

    pub fn has_transition_type(&self, name: &str) -> bool {
        self.transition_types.contains_key(name)
    }

    /// Runs every registered plugin's `on_load` once. Triggered by the first
    /// update or the first registry lookup, whichever comes first.
    fn ensure_plugins_loaded(&mut self) {
        if self.plugins.is_loaded() {
            return;
        }
        let mut mgr = std::mem::take(&mut self.plugins);
        mgr.load_all(self);
        self.plugins = mgr;
    }

    /// Appends a clip and returns its id. Ids are stable; clips are never
    /// removed.
    pub fn add_clip(&mut self, clip: Clip) -> ClipId {
        let id = self.clips.len();
        self.clips.push(clip);
        self.layer_order.push(id);
        if self.batching {
            self.needs_clip_sorting = true;
        } else {
            self.sort_layers();
        }
        id
    }

    fn sort_layers(&mut self) {
        let clips = &self.clips;
        self.layer_order.sort_by_key(|&id| clips[id].layer);
    }

    /// Batching-aware keyframe insert: immediate sorted insert outside a
    /// batch, deferred append plus dirty mark inside one.
    pub fn add_keyframe(
        &mut self,
        id: ClipId,
        prop: &str,
        time: f64,
        value: impl Into<Value>,
        ease: Ease,
    ) -> KinettaResult<()> {
        let batching = self.batching;
        let clip = self
            .clips
            .get_mut(id)
            .ok_or_else(|| KinettaError::validation(format!("no clip with id {id}")))?;
        if batching {
            clip.add_keyframe_deferred(prop, time, value.into(), ease)?;
            self.dirty.insert(id);
            Ok(())
        } else {
            clip.add_keyframe(prop, time, value.into(), ease)
        }
    }

    /// Attaches an effect built from a registered type. Unknown type names
    /// warn and return `false`; constructor and window errors are critical.
    pub fn add_effect(
        &mut self,
        id: ClipId,
        type_name: &str,
        start: f64,
        duration: f64,
        params: &serde_json::Value,
    ) -> KinettaResult<bool> {
        self.ensure_plugins_loaded();
        let Some(ctor) = self.effect_types.get(type_name) else {
            self.reporter
                .warning(&format!("unknown effect type '{type_name}'"));
            return Ok(false);
        };
        let kind = ctor(params)?;
        let effect = Effect::new(start, duration, kind)?;
        let clip = self
            .clips
            .get_mut(id)
            .ok_or_else(|| KinettaError::validation(format!("no clip with id {id}")))?;
        clip.effects.push(effect);
        Ok(true)
    }

    /// Adds a transition built from a registered type.
    ///
    /// An unknown type name is a soft failure: exactly one warning, `None`
    /// returned, transition list untouched. Constructor errors (missing
    /// clips, bad duration, bad params) are critical.
    pub fn add_transition(
        &mut self,
        type_name: &str,
        from: ClipId,
        to: ClipId,
        start: Option<f64>,
        duration: f64,
        params: &serde_json::Value,
    ) -> KinettaResult<Option<TransitionId>> {
        self.ensure_plugins_loaded();
        let Some(ctor) = self.transition_types.get(type_name) else {
            self.reporter
                .warning(&format!("unknown transition type '{type_name}'"));
            return Ok(None);
        };
        let kind = ctor(params)?;
        let transition = Transition::new(&self.clips, from, to, start, duration, kind)?;
        self.transitions.push(transition);
        Ok(Some(self.transitions.len() - 1))
    }

    /// Runs `f` inside a batch. Deferred sorts are committed exactly once
    /// when `f` returns, whether it succeeds, errors, or panics; the
    /// mutations made before a failure are not rolled back.
    pub fn batch<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> KinettaResult<R>,
    ) -> KinettaResult<R> {
        self.batching = true;
        let result = catch_unwind(AssertUnwindSafe(|| f(self)));
        self.batching = false;
        self.finalize_batch();
        match result {
            Ok(r) => r,
            Err(payload) => resume_unwind(payload),
        }
    }

    fn finalize_batch(&mut self) {
        for id in std::mem::take(&mut self.dirty) {
            if let Some(clip) = self.clips.get_mut(id) {
                clip.finalize_changes();
            }
        }
        if self.needs_clip_sorting {
            self.sort_layers();
            self.needs_clip_sorting = false;
        }
    }

    /// Advances the clock and refreshes every clip the frame touches.
    ///
    /// When playing, time past the end wraps with a modulo so the overflow
    /// remainder is preserved across the loop boundary.
    pub fn update(&mut self, delta_ms: f64) -> KinettaResult<()> {
        self.ensure_plugins_loaded();

        if self.playing {
            self.time += delta_ms;
            if self.time >= self.duration {
                self.time %= self.duration;
            }
        }

        let time = self.time;
        let playing = self.playing;
        let state = self.frame_state(time);
        for id in state.clips_to_process {
            let clip = &mut self.clips[id];
            clip.update(time - clip.start, playing)?;
        }
        Ok(())
    }

    /// Active clips plus the participants of active transitions, in layer
    /// order. A transition keeps its participants in the frame even after
    /// their own windows end.
    pub fn frame_state(&self, time: f64) -> FrameState {
        let mut active_transitions = Vec::new();
        let mut participants = BTreeSet::new();
        for (idx, transition) in self.transitions.iter().enumerate() {
            if transition.is_active(time) {
                active_transitions.push(idx);
                participants.insert(transition.from);
                participants.insert(transition.to);
            }
        }

        let clips_to_process = self
            .layer_order
            .iter()
            .copied()
            .filter(|&id| self.clips[id].is_active(time) || participants.contains(&id))
            .collect();

        FrameState {
            clips_to_process,
            participants,
            active_transitions,
        }
    }

    /// Renders the current frame through `engine` into its canvas.
    ///
    /// Pair each render with one preceding [`Timeline::update`]: CPU effects
    /// mutate the sampled properties during rendering, and only the next
    /// update's reset undoes those mutations. Rendering twice without an
    /// update in between compounds them.
    pub fn render(
        &mut self,
        engine: &mut RenderEngine,
        assets: &mut AssetStore,
    ) -> KinettaResult<()> {
        engine.render(self, assets)
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("clips", &self.clips.len())
            .field("transitions", &self.transitions.len())
            .field("time", &self.time)
            .field("playing", &self.playing)
            .field("duration", &self.duration)
            .finish()
    }
}
