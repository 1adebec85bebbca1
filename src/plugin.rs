//! Plugin registration.
//!
//! Plugins contribute effect and transition type constructors to a timeline.
//! Registration problems are soft: a rejected plugin or a failing `on_load`
//! is reported through the timeline's `Reporter` and never aborts the host.

use crate::{
    effect, error::KinettaResult, report::Reporter, timeline::Timeline, transition,
};

pub type LoadFn = Box<dyn Fn(&mut Timeline) -> KinettaResult<()> + Send>;

pub struct Plugin {
    pub name: String,
    pub kind: String,
    on_load: LoadFn,
}

impl Plugin {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        on_load: impl Fn(&mut Timeline) -> KinettaResult<()> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            on_load: Box::new(on_load),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct PluginManager {
    plugins: Vec<Plugin>,
    loaded: bool,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Registers a plugin. Empty name, empty kind, and duplicate names are
    /// rejected with a warning; returns whether the plugin was accepted.
    pub fn register(&mut self, plugin: Plugin, reporter: &dyn Reporter) -> bool {
        if plugin.name.trim().is_empty() {
            reporter.warning("rejected plugin with empty name");
            return false;
        }
        if plugin.kind.trim().is_empty() {
            reporter.warning(&format!("rejected plugin '{}': empty kind", plugin.name));
            return false;
        }
        if self.plugins.iter().any(|p| p.name == plugin.name) {
            reporter.warning(&format!(
                "rejected plugin '{}': name already registered",
                plugin.name
            ));
            return false;
        }
        self.plugins.push(plugin);
        true
    }

    /// Runs every plugin's `on_load` once. Each plugin runs in isolation;
    /// a failure is reported and the remaining plugins still load.
    pub(crate) fn load_all(&mut self, timeline: &mut Timeline) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        for plugin in &self.plugins {
            if let Err(e) = (plugin.on_load)(timeline) {
                timeline
                    .reporter()
                    .warning(&format!("plugin '{}' failed to load: {e}", plugin.name));
            }
        }
    }
}

/// The stock effect and transition types every timeline starts with.
pub fn builtin_plugins() -> Vec<Plugin> {
    vec![
        Plugin::new("builtin.effects", "effect", |tl: &mut Timeline| {
            tl.register_effect_type("fadeIn", effect::parse_fade_in);
            tl.register_effect_type("fadeOut", effect::parse_fade_out);
            tl.register_effect_type("wiggle", effect::parse_wiggle);
            tl.register_effect_type("blur", effect::parse_blur);
            tl.register_effect_type("brightnessContrast", effect::parse_brightness_contrast);
            tl.register_effect_type("invert", effect::parse_invert);
            Ok(())
        }),
        Plugin::new("builtin.transitions", "transition", |tl: &mut Timeline| {
            tl.register_transition_type("crossfade", transition::parse_crossfade);
            tl.register_transition_type("wipe", transition::parse_wipe);
            Ok(())
        }),
    ]
}
