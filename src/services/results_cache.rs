use crate::types::{
    ComputedValueResult, Entity, ExecutionLog, ObjectId, Value, ValueResultKey, ValueSpecification,
    ValueType, ViewResultModel,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct CacheItem {
    value: Value,
    history: VecDeque<Value>,
    last_changed: u64,
    log: ExecutionLog,
}

struct EntityItem {
    entity: Entity,
    last_changed: u64,
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub value: Value,
    /// Declared type, falling back to the type of the value itself.
    pub value_type: ValueType,
    pub history: Vec<Value>,
    /// Changed by the most recent update.
    pub updated: bool,
    /// Update ID of the last change, 0 if never set.
    pub last_changed: u64,
    pub log: Option<ExecutionLog>,
}

/// Cached entity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub entity: Entity,
    pub last_changed: u64,
}

/// Latest computed values with bounded history and change tracking.
///
/// Every `put_results`/`put_entity`/`put_entities` call is one update with a
/// new update ID. A key is "updated" when the update that last changed it is
/// the most recent one, so the flag is stable across reads.
pub struct ResultsCache {
    results: DashMap<ValueResultKey, CacheItem>,
    entities: DashMap<ObjectId, EntityItem>,
    update_id: AtomicU64,
    history_capacity: usize,
}

impl ResultsCache {
    pub fn new(history_capacity: usize) -> Arc<Self> {
        Arc::new(Self::with_capacity(history_capacity))
    }

    pub fn with_capacity(history_capacity: usize) -> Self {
        Self {
            results: DashMap::new(),
            entities: DashMap::new(),
            update_id: AtomicU64::new(0),
            history_capacity: history_capacity.max(1),
        }
    }

    /// ID of the most recent update.
    pub fn update_id(&self) -> u64 {
        self.update_id.load(Ordering::SeqCst)
    }

    fn next_update_id(&self) -> u64 {
        self.update_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Ingest a full cycle.
    pub fn put_results(&self, results: &ViewResultModel) {
        let update_id = self.next_update_id();
        let mut changed = 0usize;
        for (calc_config, values) in &results.results {
            for result in values {
                if self.put_one(calc_config, result, update_id) {
                    changed += 1;
                }
            }
        }
        debug!(
            "Cycle {} cached as update {}: {} of {} values changed",
            results.cycle_id,
            update_id,
            changed,
            results.len()
        );
    }

    /// Add values outside a cycle, e.g. intermediate values of a dependency
    /// graph. They count as part of the current update.
    pub fn put_values(&self, calc_config: &str, results: &[ComputedValueResult]) {
        let update_id = self.update_id();
        for result in results {
            self.put_one(calc_config, result, update_id);
        }
    }

    /// Returns true if the stored value changed.
    fn put_one(&self, calc_config: &str, result: &ComputedValueResult, update_id: u64) -> bool {
        let key = ValueResultKey::new(calc_config, result.spec.clone());
        let capacity = self.history_capacity;

        match self.results.entry(key) {
            Entry::Occupied(mut entry) => {
                let item = entry.get_mut();
                item.log = result.log.clone();
                if item.value == result.value {
                    return false;
                }
                item.value = result.value.clone();
                item.last_changed = update_id;
                append_history(&mut item.history, &result.value, capacity);
                true
            }
            Entry::Vacant(entry) => {
                let mut history = VecDeque::with_capacity(capacity);
                append_history(&mut history, &result.value, capacity);
                entry.insert(CacheItem {
                    value: result.value.clone(),
                    history,
                    last_changed: update_id,
                    log: result.log.clone(),
                });
                true
            }
        }
    }

    /// Store a changed entity as its own update.
    pub fn put_entity(&self, entity: Entity) {
        self.put_entities(std::iter::once(entity));
    }

    /// Store several entities as one update.
    pub fn put_entities(&self, entities: impl IntoIterator<Item = Entity>) {
        let update_id = self.next_update_id();
        for entity in entities {
            match self.entities.entry(entity.object_id().clone()) {
                Entry::Occupied(mut entry) => {
                    let item = entry.get_mut();
                    if item.entity != entity {
                        item.entity = entity;
                        item.last_changed = update_id;
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(EntityItem {
                        entity,
                        last_changed: update_id,
                    });
                }
            }
        }
    }

    /// Evict an entity and every result computed on it.
    pub fn remove(&self, object_id: &ObjectId) {
        self.entities.remove(object_id);
        self.results.retain(|key, _| &key.spec.target.id != object_id);
    }

    pub fn result(&self, calc_config: &str, spec: &ValueSpecification, expected_type: ValueType) -> CachedResult {
        let key = ValueResultKey::new(calc_config, spec.clone());
        let current = self.update_id();

        match self.results.get(&key) {
            Some(item) => CachedResult {
                value: item.value.clone(),
                value_type: resolve_type(&item.value, expected_type),
                history: item.history.iter().cloned().collect(),
                updated: item.last_changed == current,
                last_changed: item.last_changed,
                log: (!item.log.is_empty()).then(|| item.log.clone()),
            },
            None => CachedResult {
                value: Value::pending(),
                value_type: expected_type,
                history: Vec::new(),
                updated: false,
                last_changed: 0,
                log: None,
            },
        }
    }

    pub fn entity(&self, object_id: &ObjectId) -> Option<CachedEntity> {
        self.entities.get(object_id).map(|item| CachedEntity {
            entity: item.entity.clone(),
            last_changed: item.last_changed,
        })
    }

    pub fn contains_entity(&self, object_id: &ObjectId) -> bool {
        self.entities.contains_key(object_id)
    }

    /// Number of cached results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

fn append_history(history: &mut VecDeque<Value>, value: &Value, capacity: usize) {
    if value.is_missing() || history.back() == Some(value) {
        return;
    }
    if history.len() == capacity {
        history.pop_front();
    }
    history.push_back(value.clone());
}

fn resolve_type(value: &Value, expected: ValueType) -> ValueType {
    if expected != ValueType::Unknown || value.is_missing() {
        expected
    } else {
        value.value_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, Security, TargetSpec, ValueProperties};

    fn spec(target: &str) -> ValueSpecification {
        ValueSpecification::new("PV", TargetSpec::position(target), ValueProperties::new())
    }

    fn cycle(id: u64, values: &[(&str, f64)]) -> ViewResultModel {
        let mut model = ViewResultModel::new(id);
        for (target, v) in values {
            model.add("Default", ComputedValueResult::new(spec(target), Value::Double(*v)));
        }
        model
    }

    // =========================================================================
    // Change detection
    // =========================================================================

    #[test]
    fn test_first_put_is_updated() {
        let cache = ResultsCache::with_capacity(5);
        cache.put_results(&cycle(1, &[("a", 5.0)]));

        let result = cache.result("Default", &spec("a"), ValueType::Double);
        assert_eq!(result.value, Value::Double(5.0));
        assert!(result.updated);
        assert_eq!(result.history, vec![Value::Double(5.0)]);
    }

    #[test]
    fn test_same_value_not_updated_and_not_reappended() {
        let cache = ResultsCache::with_capacity(5);
        cache.put_results(&cycle(1, &[("a", 5.0)]));
        cache.put_results(&cycle(2, &[("a", 5.0)]));

        let result = cache.result("Default", &spec("a"), ValueType::Double);
        assert!(!result.updated);
        assert_eq!(result.history, vec![Value::Double(5.0)]);
    }

    #[test]
    fn test_updated_flag_stable_across_reads() {
        let cache = ResultsCache::with_capacity(5);
        cache.put_results(&cycle(1, &[("a", 1.0)]));
        let first = cache.result("Default", &spec("a"), ValueType::Double);
        let second = cache.result("Default", &spec("a"), ValueType::Double);
        assert_eq!(first.updated, second.updated);
        assert!(second.updated);
    }

    #[test]
    fn test_unchanged_key_in_later_cycle_not_updated() {
        let cache = ResultsCache::with_capacity(5);
        cache.put_results(&cycle(1, &[("a", 1.0), ("b", 1.0)]));
        cache.put_results(&cycle(2, &[("a", 2.0), ("b", 1.0)]));

        assert!(cache.result("Default", &spec("a"), ValueType::Double).updated);
        assert!(!cache.result("Default", &spec("b"), ValueType::Double).updated);
    }

    // =========================================================================
    // History
    // =========================================================================

    #[test]
    fn test_history_evicts_oldest() {
        let cache = ResultsCache::with_capacity(3);
        for i in 0..5 {
            cache.put_results(&cycle(i, &[("a", i as f64)]));
        }
        let result = cache.result("Default", &spec("a"), ValueType::Double);
        assert_eq!(
            result.history,
            vec![Value::Double(2.0), Value::Double(3.0), Value::Double(4.0)]
        );
    }

    #[test]
    fn test_missing_values_tracked_but_not_in_history() {
        let cache = ResultsCache::with_capacity(3);
        cache.put_results(&cycle(1, &[("a", 1.0)]));

        let mut failed = ViewResultModel::new(2);
        failed.add("Default", ComputedValueResult::new(spec("a"), Value::failed("boom")));
        cache.put_results(&failed);

        let result = cache.result("Default", &spec("a"), ValueType::Double);
        assert!(result.updated);
        assert!(result.value.is_error());
        assert_eq!(result.history, vec![Value::Double(1.0)]);
    }

    // =========================================================================
    // Absent keys, entities, removal
    // =========================================================================

    #[test]
    fn test_absent_key_returns_pending() {
        let cache = ResultsCache::with_capacity(3);
        let result = cache.result("Default", &spec("nope"), ValueType::Double);
        assert_eq!(result.value, Value::pending());
        assert!(!result.updated);
        assert_eq!(result.value_type, ValueType::Double);
    }

    #[test]
    fn test_put_entity_only_marks_real_changes() {
        let cache = ResultsCache::with_capacity(3);
        let pos = Position::new("p1", 10.0, Security::fungible("s1", "ACME"));
        cache.put_entity(Entity::Position(pos.clone()));
        let first = cache.entity(&ObjectId::from("p1")).unwrap();
        assert_eq!(first.last_changed, cache.update_id());

        cache.put_entity(Entity::Position(pos.clone()));
        let second = cache.entity(&ObjectId::from("p1")).unwrap();
        assert_eq!(second.last_changed, first.last_changed);
        assert!(cache.update_id() > first.last_changed);
    }

    #[test]
    fn test_remove_evicts_entity_and_results() {
        let cache = ResultsCache::with_capacity(3);
        cache.put_entity(Entity::Position(Position::new(
            "a",
            1.0,
            Security::fungible("s", "S"),
        )));
        cache.put_results(&cycle(1, &[("a", 1.0), ("b", 2.0)]));

        cache.remove(&ObjectId::from("a"));

        assert!(cache.entity(&ObjectId::from("a")).is_none());
        let removed = cache.result("Default", &spec("a"), ValueType::Double);
        assert_eq!(removed.value, Value::pending());
        assert!(!removed.updated);
        assert!(cache.result("Default", &spec("b"), ValueType::Double).updated);
    }
}
