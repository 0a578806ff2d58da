//! # Named Config Builders
//!
//! A prefab pairs a name and a description with a function which builds
//! a fresh config. [`StaticPreFabConfig`] lives in `static` tables;
//! [`PreFabConfig`] is the owned form, whose builder may capture user
//! overrides (see [`PreFabConfig::map_config`]).

use burn::config::Config;
use std::fmt;
use std::sync::Arc;

/// Configs which can be built by a prefab.
pub trait PreFabTarget: 'static + Config + fmt::Debug + Clone {}

impl<C> PreFabTarget for C where C: 'static + Config + fmt::Debug + Clone {}

/// A prefab with a plain function builder, for `static` tables.
pub struct StaticPreFabConfig<C: PreFabTarget> {
    /// Unique prefab name.
    pub name: &'static str,

    /// One line description.
    pub description: &'static str,

    /// Builds the config.
    pub builder: fn() -> C,
}

impl<C: PreFabTarget> StaticPreFabConfig<C> {
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// The owned [`PreFabConfig`] form.
    pub fn to_prefab(&self) -> PreFabConfig<C> {
        PreFabConfig::new(self.name, self.description, self.builder)
    }
}

impl<C: PreFabTarget> From<&StaticPreFabConfig<C>> for PreFabConfig<C> {
    fn from(prefab: &StaticPreFabConfig<C>) -> Self {
        prefab.to_prefab()
    }
}

impl<C: PreFabTarget> fmt::Debug for StaticPreFabConfig<C> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(&self.to_prefab(), f)
    }
}

/// An owned prefab; the builder may capture state.
pub struct PreFabConfig<C: PreFabTarget> {
    /// Prefab name.
    pub name: String,

    /// One line description.
    pub description: String,

    /// Builds the config.
    pub builder: Arc<dyn Fn() -> C + Send + Sync>,
}

impl<C: PreFabTarget> Clone for PreFabConfig<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            builder: Arc::clone(&self.builder),
        }
    }
}

impl<C: PreFabTarget> fmt::Debug for PreFabConfig<C> {
    /// ``{:?}`` shows the name and description; ``{:#?}`` also builds and
    /// shows the config.
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let show_config = f.alternate();
        let label = format!("PreFabConfig<{}>", std::any::type_name::<C>());
        let mut out = f.debug_struct(&label);
        out.field("name", &self.name);
        out.field("description", &self.description);
        if show_config {
            out.field("config", &self.new_config());
        }
        out.finish()
    }
}

impl<C: PreFabTarget> PreFabConfig<C> {
    /// Create a prefab.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        builder: F,
    ) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            builder: Arc::new(builder),
        }
    }

    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// A prefab with the same name, whose configs are passed through `edit`.
    pub fn map_config<F>(
        &self,
        edit: F,
    ) -> Self
    where
        F: Fn(C) -> C + Send + Sync + 'static,
    {
        let base = Arc::clone(&self.builder);
        Self::new(
            self.name.as_str(),
            self.description.as_str(),
            move || edit(base()),
        )
    }
}
