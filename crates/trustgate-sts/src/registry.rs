use std::fmt;
use std::sync::Arc;

/// Ordered plugin list. Lookup is first match in registration order.
pub struct PluginRegistry<T: ?Sized> {
    plugins: Vec<Arc<T>>,
}

impl<T: ?Sized> PluginRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    pub fn register(&mut self, plugin: Arc<T>) {
        self.plugins.push(plugin);
    }

    #[must_use]
    pub fn with(mut self, plugin: Arc<T>) -> Self {
        self.register(plugin);
        self
    }

    /// First plugin accepted by `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<&Arc<T>> {
        self.plugins.iter().find(|p| predicate(&***p))
    }

    /// Every plugin accepted by `predicate`, in registration order.
    pub fn filter<'a>(
        &'a self,
        mut predicate: impl FnMut(&T) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Arc<T>> + 'a {
        self.plugins.iter().filter(move |p| predicate(&***p))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.plugins.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl<T: ?Sized> Default for PluginRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Clone for PluginRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            plugins: self.plugins.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for PluginRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.len())
            .finish()
    }
}
