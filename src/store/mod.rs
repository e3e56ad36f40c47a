pub mod sqlite;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::{MurmurError, Result};
use crate::domain::{Pattern, SelectorSpec};

pub use sqlite::SqliteBackend;

/// Durable storage for a full pattern snapshot
pub trait PatternBackend {
    fn load_all(&self) -> Result<Vec<Pattern>>;
    fn save_all(&self, patterns: &[Pattern]) -> Result<()>;
}

/// Confidence scoring parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Weight of the latest outcome in the moving average
    pub ema_alpha: f64,
    pub seed_confidence: f64,
    pub retire_threshold: f64,
    /// Attempts before a pattern may be retired
    pub min_attempts: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            ema_alpha: 0.3,
            seed_confidence: 0.5,
            retire_threshold: 0.15,
            min_attempts: 5,
        }
    }
}

/// Learned extraction patterns keyed by site shape.
///
/// Every mutation happens under one lock and no lock is held across an await.
pub struct PatternStore {
    config: LearningConfig,
    shapes: Mutex<HashMap<String, Vec<Pattern>>>,
    dirty: AtomicBool,
    backend: Option<Arc<dyn PatternBackend + Send + Sync>>,
}

impl PatternStore {
    pub fn new(config: LearningConfig, backend: Arc<dyn PatternBackend + Send + Sync>) -> Self {
        Self {
            config,
            shapes: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            backend: Some(backend),
        }
    }

    /// A store with nothing behind it; `persist` and `load` are no-ops
    pub fn in_memory(config: LearningConfig) -> Self {
        Self {
            config,
            shapes: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            backend: None,
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Pattern>>>> {
        self.shapes
            .lock()
            .map_err(|e| MurmurError::CorruptPatternStore(format!("lock poisoned: {}", e)))
    }

    fn sort(patterns: &mut [Pattern]) {
        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.last_used_at.cmp(&a.last_used_at))
        });
    }

    /// Patterns for a shape, best first
    pub fn lookup(&self, site_shape_id: &str) -> Result<Vec<Pattern>> {
        let shapes = self.lock()?;
        Ok(shapes.get(site_shape_id).cloned().unwrap_or_default())
    }

    /// Fold one extraction outcome into a pattern's confidence.
    ///
    /// Returns the updated pattern, or `None` when the id is unknown or the
    /// pattern was retired by this update.
    pub fn record_outcome(&self, pattern_id: &str, success: bool) -> Result<Option<Pattern>> {
        let mut shapes = self.lock()?;

        let Some((shape_id, index)) = shapes.iter().find_map(|(shape, patterns)| {
            patterns
                .iter()
                .position(|p| p.id == pattern_id)
                .map(|i| (shape.clone(), i))
        }) else {
            debug!("Ignoring outcome for unknown pattern {}", pattern_id);
            return Ok(None);
        };

        let Some(patterns) = shapes.get_mut(&shape_id) else {
            return Ok(None);
        };
        let alpha = self.config.ema_alpha;
        let outcome = if success { 1.0 } else { 0.0 };

        let pattern = &mut patterns[index];
        let before = pattern.confidence;
        pattern.confidence = (alpha * outcome + (1.0 - alpha) * pattern.confidence).clamp(0.0, 1.0);
        if success {
            pattern.success_count += 1;
        } else {
            pattern.failure_count += 1;
        }
        pattern.last_used_at = Utc::now();

        debug!(
            pattern = %pattern.id,
            success,
            before,
            after = pattern.confidence,
            "Recorded pattern outcome"
        );

        let retired = pattern.confidence < self.config.retire_threshold
            && pattern.attempts() >= self.config.min_attempts;
        let updated = if retired {
            let removed = patterns.remove(index);
            info!(
                "Retired pattern {} for shape {} (confidence {:.3} after {} attempts)",
                removed.id,
                shape_id,
                removed.confidence,
                removed.attempts()
            );
            if patterns.is_empty() {
                shapes.remove(&shape_id);
            }
            None
        } else {
            let updated = pattern.clone();
            Self::sort(patterns);
            Some(updated)
        };

        self.dirty.store(true, Ordering::SeqCst);
        Ok(updated)
    }

    /// Add a candidate spec for a shape, merging with an existing equal spec
    pub fn add_pattern(&self, site_shape_id: &str, selector_spec: SelectorSpec) -> Result<Pattern> {
        let mut shapes = self.lock()?;
        let patterns = shapes.entry(site_shape_id.to_string()).or_default();

        if let Some(existing) = patterns
            .iter()
            .find(|p| p.selector_spec.structurally_eq(&selector_spec))
        {
            debug!("Spec already known for shape {} as {}", site_shape_id, existing.id);
            return Ok(existing.clone());
        }

        let pattern = Pattern::new(site_shape_id, selector_spec, self.config.seed_confidence);
        debug!("Added pattern {} for shape {}", pattern.id, site_shape_id);
        patterns.push(pattern.clone());
        Self::sort(patterns);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(pattern)
    }

    /// Every stored pattern, grouped by shape
    pub fn all(&self) -> Result<Vec<Pattern>> {
        let shapes = self.lock()?;
        Ok(Self::snapshot(&shapes))
    }

    fn snapshot(shapes: &HashMap<String, Vec<Pattern>>) -> Vec<Pattern> {
        let mut keys: Vec<&String> = shapes.keys().collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|k| shapes[k].iter().cloned())
            .collect()
    }

    /// Drop every pattern for a shape, returning how many were removed
    pub fn forget_shape(&self, site_shape_id: &str) -> Result<usize> {
        let mut shapes = self.lock()?;
        let removed = shapes.remove(site_shape_id).map_or(0, |p| p.len());
        if removed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.lock()
            .map(|shapes| shapes.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether there are changes not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Write a snapshot of every pattern to the backend
    pub fn persist(&self) -> Result<()> {
        let Some(ref backend) = self.backend else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        };

        // Cleared together with the snapshot, so changes made while the
        // backend writes stay dirty
        let snapshot = {
            let shapes = self.lock()?;
            self.dirty.store(false, Ordering::SeqCst);
            Self::snapshot(&shapes)
        };

        if let Err(e) = backend.save_all(&snapshot) {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        info!("Persisted {} patterns", snapshot.len());
        Ok(())
    }

    /// Replace the in-memory state with the backend's contents.
    ///
    /// A store that cannot be decoded loads as empty; nothing is half-applied.
    pub fn load(&self) -> Result<usize> {
        let Some(ref backend) = self.backend else {
            return Ok(0);
        };

        let patterns = match backend.load_all() {
            Ok(patterns) => patterns,
            Err(MurmurError::CorruptPatternStore(e)) => {
                warn!("Pattern store unreadable, starting empty: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut loaded: HashMap<String, Vec<Pattern>> = HashMap::new();
        for pattern in patterns {
            let group = loaded.entry(pattern.site_shape_id.clone()).or_default();
            if group
                .iter()
                .any(|p| p.selector_spec.structurally_eq(&pattern.selector_spec))
            {
                debug!("Skipping duplicate stored pattern {}", pattern.id);
                continue;
            }
            group.push(pattern);
        }
        for group in loaded.values_mut() {
            Self::sort(group);
        }

        let count = loaded.values().map(Vec::len).sum();
        *self.lock()? = loaded;
        self.dirty.store(false, Ordering::SeqCst);
        info!("Loaded {} patterns", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::{OnceLock, Weak};

    fn store() -> PatternStore {
        PatternStore::in_memory(LearningConfig::default())
    }

    fn spec(item: &str) -> SelectorSpec {
        SelectorSpec::new(item).with_text("p")
    }

    #[test]
    fn test_add_then_lookup() {
        let store = store();
        let p = store.add_pattern("shape", spec("div.c")).unwrap();
        assert_eq!(p.confidence, 0.5);

        let found = store.lookup("shape").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, p.id);
        assert!(store.lookup("other").unwrap().is_empty());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_add_merges_structurally_equal_specs() {
        let store = store();
        let a = store.add_pattern("shape", spec("div.c")).unwrap();
        store.record_outcome(&a.id, true).unwrap();

        let b = store
            .add_pattern("shape", SelectorSpec::new("  div.c ").with_text(" p"))
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.success_count, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_spec_on_other_shape_is_separate() {
        let store = store();
        let a = store.add_pattern("shape-1", spec("div.c")).unwrap();
        let b = store.add_pattern("shape-2", spec("div.c")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_success_raises_confidence() {
        let store = store();
        let p = store.add_pattern("shape", spec("div.c")).unwrap();
        let updated = store.record_outcome(&p.id, true).unwrap().unwrap();
        assert!((updated.confidence - 0.65).abs() < 1e-9);
        assert_eq!(updated.success_count, 1);
    }

    #[test]
    fn test_failures_decay_confidence() {
        let store = store();
        let p = store.add_pattern("shape", spec("div.c")).unwrap();

        let mut expected = 0.5;
        for _ in 0..4 {
            expected *= 0.7;
            let updated = store.record_outcome(&p.id, false).unwrap().unwrap();
            assert!((updated.confidence - expected).abs() < 1e-9);
        }
        // 0.5 * 0.7^4 = 0.12 but only four attempts: not retired yet
        assert_eq!(store.lookup("shape").unwrap().len(), 1);
    }

    #[test]
    fn test_retired_after_min_attempts() {
        let store = store();
        let p = store.add_pattern("shape", spec("div.c")).unwrap();
        for _ in 0..4 {
            assert!(store.record_outcome(&p.id, false).unwrap().is_some());
        }
        assert_eq!(store.record_outcome(&p.id, false).unwrap(), None);
        assert!(store.lookup("shape").unwrap().is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_lookup_orders_by_confidence() {
        let store = store();
        let a = store.add_pattern("shape", spec("div.a")).unwrap();
        let b = store.add_pattern("shape", spec("div.b")).unwrap();
        store.record_outcome(&a.id, false).unwrap();
        store.record_outcome(&b.id, true).unwrap();

        let found = store.lookup("shape").unwrap();
        assert_eq!(found[0].id, b.id);
        assert_eq!(found[1].id, a.id);
    }

    #[test]
    fn test_ties_prefer_recently_used() {
        let mut older = Pattern::new("shape", spec("div.old"), 0.5);
        older.last_used_at = Utc::now() - Duration::hours(1);
        let newer = Pattern::new("shape", spec("div.new"), 0.5);
        let mut group = vec![older.clone(), newer.clone()];
        PatternStore::sort(&mut group);
        assert_eq!(group[0].id, newer.id);
    }

    #[test]
    fn test_unknown_pattern_is_ignored() {
        let store = store();
        assert_eq!(store.record_outcome("missing", true).unwrap(), None);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let store = store();
        let p = store.add_pattern("shape", spec("div.c")).unwrap();
        for _ in 0..50 {
            let updated = store.record_outcome(&p.id, true).unwrap().unwrap();
            assert!(updated.confidence <= 1.0);
        }
    }

    #[test]
    fn test_forget_shape() {
        let store = store();
        store.add_pattern("shape", spec("div.a")).unwrap();
        store.add_pattern("shape", spec("div.b")).unwrap();
        store.add_pattern("other", spec("div.a")).unwrap();

        assert_eq!(store.forget_shape("shape").unwrap(), 2);
        assert_eq!(store.forget_shape("shape").unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let backend = Arc::new(SqliteBackend::in_memory().unwrap());
        let store = PatternStore::new(LearningConfig::default(), backend.clone());
        let a = store.add_pattern("shape", spec("div.a")).unwrap();
        store.add_pattern("shape", spec("div.b")).unwrap();
        store.record_outcome(&a.id, true).unwrap();
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let reloaded = PatternStore::new(LearningConfig::default(), backend);
        assert_eq!(reloaded.load().unwrap(), 2);
        let found = reloaded.lookup("shape").unwrap();
        assert_eq!(found, store.lookup("shape").unwrap());
    }

    struct CorruptBackend;

    impl PatternBackend for CorruptBackend {
        fn load_all(&self) -> Result<Vec<Pattern>> {
            Err(MurmurError::CorruptPatternStore("garbage".into()))
        }

        fn save_all(&self, _patterns: &[Pattern]) -> Result<()> {
            Ok(())
        }
    }

    /// Records an outcome on the store while a snapshot is being written
    #[derive(Default)]
    struct ConcurrentWriterBackend {
        store: OnceLock<Weak<PatternStore>>,
        pattern_id: OnceLock<String>,
    }

    impl PatternBackend for ConcurrentWriterBackend {
        fn load_all(&self) -> Result<Vec<Pattern>> {
            Ok(Vec::new())
        }

        fn save_all(&self, _patterns: &[Pattern]) -> Result<()> {
            let store = self.store.get().and_then(Weak::upgrade);
            if let (Some(store), Some(id)) = (store, self.pattern_id.get()) {
                store.record_outcome(id, true)?;
            }
            Ok(())
        }
    }

    #[test]
    fn test_change_during_persist_stays_dirty() {
        let backend = Arc::new(ConcurrentWriterBackend::default());
        let store = Arc::new(PatternStore::new(LearningConfig::default(), backend.clone()));
        let p = store.add_pattern("shape", spec("div.a")).unwrap();
        backend.store.set(Arc::downgrade(&store)).unwrap();
        backend.pattern_id.set(p.id.clone()).unwrap();

        store.persist().unwrap();
        assert!(store.is_dirty());
        assert_eq!(store.lookup("shape").unwrap()[0].success_count, 1);
    }

    struct FailingBackend;

    impl PatternBackend for FailingBackend {
        fn load_all(&self) -> Result<Vec<Pattern>> {
            Ok(Vec::new())
        }

        fn save_all(&self, _patterns: &[Pattern]) -> Result<()> {
            Err(MurmurError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn test_failed_persist_stays_dirty() {
        let store = PatternStore::new(LearningConfig::default(), Arc::new(FailingBackend));
        store.add_pattern("shape", spec("div.a")).unwrap();
        assert!(store.persist().is_err());
        assert!(store.is_dirty());
    }

    #[test]
    fn test_corrupt_backend_loads_empty() {
        let store = PatternStore::new(LearningConfig::default(), Arc::new(CorruptBackend));
        store.add_pattern("shape", spec("div.a")).unwrap();
        assert_eq!(store.load().unwrap(), 0);
        assert!(store.is_empty());
    }
}
