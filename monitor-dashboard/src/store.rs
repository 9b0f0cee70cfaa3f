//! Insertion-ordered endpoint state.

use indexmap::IndexMap;
use monitor_core::EndpointRecord;

/// Mapping of endpoint id to its latest known record, iterated in insertion
/// order. Replacing an existing id keeps its position.
#[derive(Debug, Default, Clone)]
pub struct StateStore {
    records: IndexMap<String, EndpointRecord>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record at `record.id`. Returns `true` when the
    /// id was not present before.
    pub fn upsert(&mut self, record: EndpointRecord) -> bool {
        self.records.insert(record.id.clone(), record).is_none()
    }

    /// Clears the store and inserts `records` in the given order.
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = EndpointRecord>) {
        self.records.clear();
        for record in records {
            self.upsert(record);
        }
    }

    /// Removes the record for `id`, if any. Later records move up one place.
    pub fn remove(&mut self, id: &str) -> Option<EndpointRecord> {
        self.records.shift_remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&EndpointRecord> {
        self.records.get(id)
    }

    pub fn values(&self) -> impl ExactSizeIterator<Item = &EndpointRecord> + '_ {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn record(id: &str, name: &str, status: &str) -> EndpointRecord {
    EndpointRecord {
        id: id.to_string(),
        name: name.to_string(),
        url: format!("https://{}.example.com/health", id),
        method: "GET".to_string(),
        interval_seconds: 30,
        timeout_seconds: 10,
        status: status.to_string(),
        status_code: None,
        response_time_ms: None,
        last_check: None,
        error: None,
        labels: Default::default(),
        probe_type: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(store: &StateStore) -> Vec<&str> {
        store.values().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn upsert_appends_new_ids() {
        let mut store = StateStore::new();
        assert!(store.upsert(record("a", "A", "up")));
        assert!(store.upsert(record("b", "B", "up")));
        assert_eq!(ids(&store), vec!["a", "b"]);
    }

    #[test]
    fn upsert_preserves_position_of_existing_id() {
        let mut store = StateStore::new();
        store.replace_all(vec![record("a", "A", "up"), record("b", "B", "up")]);

        let replaced = store.upsert(record("a", "A prime", "down"));

        assert!(!replaced);
        assert_eq!(ids(&store), vec!["a", "b"]);
        let first = store.values().next().unwrap();
        assert_eq!(first.name, "A prime");
        assert_eq!(first.status, "down");
    }

    #[test]
    fn replace_all_overwrites_everything() {
        let mut store = StateStore::new();
        store.replace_all(vec![record("a", "A", "up"), record("b", "B", "up")]);
        store.replace_all(vec![record("c", "C", "pending")]);

        assert_eq!(ids(&store), vec!["c"]);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_none());
    }

    #[test]
    fn replace_all_collapses_duplicate_ids() {
        let mut store = StateStore::new();
        store.replace_all(vec![
            record("a", "first", "up"),
            record("b", "B", "up"),
            record("a", "second", "down"),
        ]);

        assert_eq!(ids(&store), vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().name, "second");
    }

    #[test]
    fn remove_is_idempotent() {
        let mut once = StateStore::new();
        once.replace_all(vec![record("a", "A", "up"), record("b", "B", "up")]);
        let mut twice = once.clone();

        assert!(once.remove("a").is_some());
        assert!(twice.remove("a").is_some());
        assert!(twice.remove("a").is_none());

        assert!(once.values().eq(twice.values()));
        assert_eq!(ids(&twice), vec!["b"]);
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut store = StateStore::new();
        store.replace_all(vec![
            record("a", "A", "up"),
            record("b", "B", "up"),
            record("c", "C", "up"),
        ]);

        store.remove("a");
        store.upsert(record("c", "C prime", "down"));
        store.upsert(record("d", "D", "up"));

        assert_eq!(ids(&store), vec!["b", "c", "d"]);
        assert_eq!(store.get("c").unwrap().name, "C prime");
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn remove_unknown_id_is_noop() {
        let mut store = StateStore::new();
        assert!(store.remove("missing").is_none());
        assert!(store.is_empty());
    }
}
