//! Registry of algorithm plugins with a single active selection.
//!
//! Plugins are keyed by manifest id. Registering an id that already exists
//! replaces the old plugin (disposing it first when it was initialized).
//! Bulk operations isolate failures per plugin and report them in a
//! [`BulkReport`] instead of aborting.

use crate::algorithm::{Algorithm, AlgorithmContext, AlgorithmManifest, Capability};
use crate::error::{EngineError, Result};
use crate::events::UserEvent;
use crate::storage::KeyValueStore;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    Registered,
    Initialized,
    Failed,
    Disposed,
}

/// Outcome of a bulk lifecycle operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    /// `(algorithm id, reason)`
    pub failed: Vec<(String, String)>,
}

impl BulkReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, id: &str, outcome: anyhow::Result<()>, action: &str) -> bool {
        match outcome {
            Ok(()) => {
                self.succeeded.push(id.to_string());
                true
            }
            Err(e) => {
                let err = EngineError::plugin(id, &e);
                warn!("Failed to {action} algorithm: {err}");
                self.failed.push((id.to_string(), format!("{e:#}")));
                false
            }
        }
    }
}

struct Registration {
    plugin: Box<dyn Algorithm>,
    state: LifecycleState,
}

impl Registration {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if self.state != LifecycleState::Initialized {
            self.state = LifecycleState::Disposed;
            return Ok(());
        }
        let outcome = self.plugin.dispose();
        self.state = LifecycleState::Disposed;
        outcome
    }
}

#[derive(Default)]
pub struct AlgorithmRegistry {
    plugins: BTreeMap<String, Registration>,
    active: Option<String>,
}

impl AlgorithmRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `plugin`, replacing any plugin with the same id. Returns `true` on replacement.
    pub fn register(&mut self, plugin: Box<dyn Algorithm>) -> bool {
        let id = plugin.manifest().id.clone();
        let registration = Registration {
            plugin,
            state: LifecycleState::Registered,
        };

        match self.plugins.insert(id.clone(), registration) {
            Some(mut replaced) => {
                warn!("Algorithm `{id}` was already registered; replacing it");
                if let Err(e) = replaced.dispose() {
                    warn!("Failed to dispose replaced algorithm `{id}`: {e:#}");
                }
                true
            }
            None => {
                info!("Registered algorithm `{id}`");
                false
            }
        }
    }

    /// Remove and dispose `id`, clearing the active selection if it pointed there.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlgorithmNotFound`] for unknown ids.
    pub fn unregister(&mut self, id: &str) -> Result<Box<dyn Algorithm>> {
        let mut registration = self
            .plugins
            .remove(id)
            .ok_or_else(|| EngineError::AlgorithmNotFound(id.to_string()))?;

        if self.active.as_deref() == Some(id) {
            self.active = None;
            info!("Cleared active algorithm `{id}`");
        }
        if let Err(e) = registration.dispose() {
            warn!("Failed to dispose algorithm `{id}`: {e:#}");
        }
        info!("Unregistered algorithm `{id}`");
        Ok(registration.plugin)
    }

    /// # Errors
    ///
    /// Returns [`EngineError::AlgorithmNotFound`] if `id` is not registered.
    pub fn set_active(&mut self, id: &str) -> Result<()> {
        if !self.plugins.contains_key(id) {
            return Err(EngineError::AlgorithmNotFound(id.to_string()));
        }
        debug!("Active algorithm is now `{id}`");
        self.active = Some(id.to_string());
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    #[must_use]
    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Algorithm> {
        self.plugins.get(id).map(|r| r.plugin.as_ref())
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Box<dyn Algorithm>> {
        self.plugins.get_mut(id).map(|r| &mut r.plugin)
    }

    /// Active plugin, for dispatch.
    pub fn active_mut(&mut self) -> Option<&mut Box<dyn Algorithm>> {
        let id = self.active.as_deref()?;
        self.plugins.get_mut(id).map(|r| &mut r.plugin)
    }

    #[must_use]
    pub fn active_supports(&self, capability: Capability) -> bool {
        self.active
            .as_deref()
            .and_then(|id| self.get(id))
            .is_some_and(|plugin| plugin.manifest().supports(capability))
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<LifecycleState> {
        self.plugins.get(id).map(|r| r.state)
    }

    #[must_use]
    pub fn manifests(&self) -> Vec<AlgorithmManifest> {
        self.plugins.values().map(|r| r.plugin.manifest().clone()).collect()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Initialize one plugin with its namespaced storage.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlgorithmNotFound`] for unknown ids and
    /// [`EngineError::Plugin`] if the plugin's hook fails.
    pub fn initialize(&mut self, id: &str, store: &Arc<dyn KeyValueStore>) -> Result<()> {
        let registration = self
            .plugins
            .get_mut(id)
            .ok_or_else(|| EngineError::AlgorithmNotFound(id.to_string()))?;

        match registration.plugin.initialize(AlgorithmContext::new(Arc::clone(store), id)) {
            Ok(()) => {
                registration.state = LifecycleState::Initialized;
                Ok(())
            }
            Err(e) => {
                registration.state = LifecycleState::Failed;
                Err(EngineError::plugin(id, &e))
            }
        }
    }

    /// Initialize every plugin not yet initialized.
    pub fn initialize_all(&mut self, store: &Arc<dyn KeyValueStore>) -> BulkReport {
        let mut report = BulkReport::default();
        for (id, registration) in &mut self.plugins {
            if registration.state == LifecycleState::Initialized {
                continue;
            }
            let outcome = registration.plugin.initialize(AlgorithmContext::new(Arc::clone(store), id));
            registration.state = if report.record(id, outcome, "initialize") {
                LifecycleState::Initialized
            } else {
                LifecycleState::Failed
            };
        }
        report
    }

    /// Dispose every plugin; they stay registered.
    pub fn dispose_all(&mut self) -> BulkReport {
        let mut report = BulkReport::default();
        for (id, registration) in &mut self.plugins {
            if registration.state == LifecycleState::Disposed {
                continue;
            }
            let outcome = registration.dispose();
            report.record(id, outcome, "dispose");
        }
        report
    }

    /// Fan `event` out to every live plugin advertising [`Capability::UserEvents`].
    pub fn dispatch_user_event(&mut self, event: &UserEvent) -> BulkReport {
        let mut report = BulkReport::default();
        for (id, registration) in &mut self.plugins {
            let live = matches!(registration.state, LifecycleState::Registered | LifecycleState::Initialized);
            if !live || !registration.plugin.manifest().supports(Capability::UserEvents) {
                continue;
            }
            let outcome = registration.plugin.on_user_event(event);
            report.record(id, outcome, "deliver event to");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{ScoringCandidate, ScoringContext};
    use crate::storage::MemoryStore;
    use crate::track::ScoredTrack;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        disposed: AtomicUsize,
        events: AtomicUsize,
    }

    struct Probe {
        manifest: AlgorithmManifest,
        counters: Arc<Counters>,
        fail_init: bool,
        fail_events: bool,
    }

    impl Probe {
        fn boxed(id: &str, counters: &Arc<Counters>) -> Box<dyn Algorithm> {
            Box::new(Self {
                manifest: AlgorithmManifest::new(id, id, "1").with_capability(Capability::UserEvents),
                counters: Arc::clone(counters),
                fail_init: false,
                fail_events: false,
            })
        }
    }

    impl Algorithm for Probe {
        fn manifest(&self) -> &AlgorithmManifest {
            &self.manifest
        }

        fn initialize(&mut self, _ctx: AlgorithmContext) -> anyhow::Result<()> {
            if self.fail_init {
                anyhow::bail!("init exploded");
            }
            Ok(())
        }

        fn dispose(&mut self) -> anyhow::Result<()> {
            self.counters.disposed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn score_track(&mut self, _: &ScoringCandidate, _: &ScoringContext) -> anyhow::Result<f64> {
            Ok(50.0)
        }

        fn rank_candidates(&mut self, _: &[ScoringCandidate], _: &ScoringContext) -> anyhow::Result<Vec<ScoredTrack>> {
            Ok(Vec::new())
        }

        fn on_user_event(&mut self, _: &UserEvent) -> anyhow::Result<()> {
            if self.fail_events {
                anyhow::bail!("event rejected");
            }
            self.counters.events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_register_replace_disposes_initialized_plugin() {
        let counters = Arc::new(Counters::default());
        let mut registry = AlgorithmRegistry::new();
        assert!(!registry.register(Probe::boxed("a", &counters)));
        registry.initialize("a", &store()).expect("Initialize");

        assert!(registry.register(Probe::boxed("a", &counters)), "Same id replaces");
        assert_eq!(registry.len(), 1);
        assert_eq!(counters.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.state("a"), Some(LifecycleState::Registered));
    }

    #[test]
    fn test_unregister_active_clears_pointer() {
        let counters = Arc::new(Counters::default());
        let mut registry = AlgorithmRegistry::new();
        registry.register(Probe::boxed("a", &counters));
        registry.register(Probe::boxed("b", &counters));
        registry.set_active("a").expect("Registered");
        assert_eq!(registry.active_id(), Some("a"));

        registry.unregister("a").expect("Registered");
        assert_eq!(registry.active_id(), None);
        assert!(registry.active_mut().is_none());

        assert!(matches!(registry.unregister("a"), Err(EngineError::AlgorithmNotFound(_))));
        assert!(matches!(registry.set_active("zzz"), Err(EngineError::AlgorithmNotFound(_))));
    }

    #[test]
    fn test_initialize_all_isolates_failures() {
        let counters = Arc::new(Counters::default());
        let mut registry = AlgorithmRegistry::new();
        registry.register(Probe::boxed("good", &counters));
        registry.register(Box::new(Probe {
            manifest: AlgorithmManifest::new("bad", "bad", "1"),
            counters: Arc::clone(&counters),
            fail_init: true,
            fail_events: false,
        }));

        let report = registry.initialize_all(&store());
        assert_eq!(report.succeeded, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert!(report.failed[0].1.contains("init exploded"));
        assert_eq!(registry.state("bad"), Some(LifecycleState::Failed));

        let disposed = registry.dispose_all();
        assert!(disposed.is_clean());
        assert_eq!(counters.disposed.load(Ordering::SeqCst), 1, "Only initialized plugins run dispose");
    }

    #[test]
    fn test_dispatch_user_event_skips_failures() {
        let counters = Arc::new(Counters::default());
        let mut registry = AlgorithmRegistry::new();
        registry.register(Probe::boxed("a", &counters));
        registry.register(Box::new(Probe {
            manifest: AlgorithmManifest::new("b", "b", "1").with_capability(Capability::UserEvents),
            counters: Arc::clone(&counters),
            fail_init: false,
            fail_events: true,
        }));
        registry.register(Box::new(Probe {
            manifest: AlgorithmManifest::new("deaf", "deaf", "1"),
            counters: Arc::clone(&counters),
            fail_init: false,
            fail_events: false,
        }));

        let event = UserEvent::Play {
            track_id: "t".into(),
            timestamp_ms: 0,
        };
        let report = registry.dispatch_user_event(&event);
        assert_eq!(report.succeeded, vec!["a".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(counters.events.load(Ordering::SeqCst), 1, "Plugins without the capability are skipped");
    }
}
