// ── Keyed reactive collection ──
//
// Incrementally mutated by streamed changes and page writes. Every
// effective mutation bumps a version counter; the map itself sits behind an
// `Arc` so subscriber snapshots stay cheap and writes copy on demand.

use std::collections::HashMap;
use std::sync::Arc;

use bosync_api::{Change, ChangeType};

use super::meta::{HasMeta, ResourceMeta};
use super::remote::{RemoteCell, RemoteResource};

/// Derives the map key for an item.
pub type IdFn<V> = Arc<dyn Fn(&V) -> String + Send + Sync>;

/// Snapshot of a [`ResourceCollection`].
#[derive(Debug)]
pub struct CollectionState<V> {
    pub meta: ResourceMeta,
    /// Entries by id. Keys are unique; order is irrelevant.
    pub value: Arc<HashMap<String, Arc<V>>>,
    /// Bumped on every effective mutation.
    pub version: u64,
}

impl<V> Clone for CollectionState<V> {
    fn clone(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            value: Arc::clone(&self.value),
            version: self.version,
        }
    }
}

impl<V> Default for CollectionState<V> {
    fn default() -> Self {
        Self {
            meta: ResourceMeta::default(),
            value: Arc::new(HashMap::new()),
            version: 0,
        }
    }
}

impl<V> HasMeta for CollectionState<V> {
    fn meta(&self) -> &ResourceMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ResourceMeta {
        &mut self.meta
    }
}

impl<V> CollectionState<V> {
    pub fn get(&self, id: &str) -> Option<&Arc<V>> {
        self.value.get(id)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Insert or overwrite one entry.
    pub(crate) fn upsert(&mut self, id: String, item: V) {
        Arc::make_mut(&mut self.value).insert(id, Arc::new(item));
        self.version += 1;
    }

    /// Drop every entry, keeping meta untouched.
    pub(crate) fn clear(&mut self) {
        if !self.value.is_empty() {
            self.value = Arc::new(HashMap::new());
            self.version += 1;
        }
    }
}

/// Apply one streamed change by id. Returns `true` if the map changed.
///
/// ADD, UPDATE and REPLACE write `new_value`; REMOVE deletes. An UPDATE
/// that renames the entry also drops the entry under the old id.
pub fn set_collection<V, F>(state: &mut CollectionState<V>, change: Change<V>, id_fn: F) -> bool
where
    F: Fn(&V) -> String,
{
    let Some(id) = change.subject().map(&id_fn) else {
        return false;
    };

    match change.change_type {
        ChangeType::Add | ChangeType::Update | ChangeType::Replace => {
            let Some(new_value) = change.new_value else {
                return false;
            };
            if let Some(old_id) = change.old_value.as_ref().map(&id_fn) {
                if old_id != id {
                    Arc::make_mut(&mut state.value).remove(&old_id);
                }
            }
            state.upsert(id, new_value);
            true
        }
        ChangeType::Remove => {
            if !state.value.contains_key(&id) {
                return false;
            }
            Arc::make_mut(&mut state.value).remove(&id);
            state.version += 1;
            true
        }
    }
}

/// A keyed collection of server-pushed items.
pub struct ResourceCollection<V: Send + Sync + 'static> {
    cell: Arc<RemoteCell<CollectionState<V>>>,
    id_fn: IdFn<V>,
}

impl<V: Send + Sync + 'static> ResourceCollection<V> {
    pub fn new(id_fn: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
        Self {
            cell: Arc::new(RemoteCell::new(CollectionState::default())),
            id_fn: Arc::new(id_fn),
        }
    }

    pub fn id_fn(&self) -> &IdFn<V> {
        &self.id_fn
    }

    pub fn id_of(&self, item: &V) -> String {
        (self.id_fn)(item)
    }

    /// Look up an entry by id.
    pub fn get(&self, id: &str) -> Option<Arc<V>> {
        self.cell.state.borrow().value.get(id).cloned()
    }

    /// All entries, in no particular order.
    pub fn items(&self) -> Vec<Arc<V>> {
        self.cell.state.borrow().value.values().cloned().collect()
    }

    /// Cheap snapshot of the map.
    pub fn snapshot(&self) -> Arc<HashMap<String, Arc<V>>> {
        Arc::clone(&self.cell.state.borrow().value)
    }

    pub fn state(&self) -> CollectionState<V> {
        self.cell.state.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.cell.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cell.state.borrow().is_empty()
    }

    pub fn version(&self) -> u64 {
        self.cell.state.borrow().version
    }

    /// Apply one change and notify subscribers if anything changed.
    pub fn apply_change(&self, change: Change<V>) -> bool {
        self.apply_changes(std::iter::once(change))
    }

    /// Apply a batch of changes in order as one observable update.
    pub fn apply_changes(&self, changes: impl IntoIterator<Item = Change<V>>) -> bool {
        let id_fn = &self.id_fn;
        self.cell.state.send_if_modified(|state| {
            let mut changed = false;
            for change in changes {
                changed |= set_collection(state, change, |v| id_fn(v));
            }
            if changed {
                state.meta.touch();
            }
            changed
        })
    }

    /// Remove every entry. Stream and meta are left alone.
    pub fn clear(&self) {
        self.cell.state.send_if_modified(|state| {
            let had_items = !state.is_empty();
            state.clear();
            had_items
        });
    }
}

impl<V: Send + Sync + 'static> RemoteResource for ResourceCollection<V> {
    type State = CollectionState<V>;

    fn remote(&self) -> &Arc<RemoteCell<CollectionState<V>>> {
        &self.cell
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        id: &'static str,
        label: &'static str,
    }

    fn row(id: &'static str, label: &'static str) -> Row {
        Row { id, label }
    }

    fn rows() -> ResourceCollection<Row> {
        ResourceCollection::new(|r: &Row| r.id.to_owned())
    }

    fn labels(col: &ResourceCollection<Row>) -> Vec<(String, &'static str)> {
        let mut out: Vec<_> = col
            .snapshot()
            .iter()
            .map(|(k, v)| (k.clone(), v.label))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn add_inserts_by_id() {
        let col = rows();
        assert!(col.apply_change(Change::add(row("a", "first"))));
        assert_eq!(col.get("a").unwrap().label, "first");
        assert_eq!(col.len(), 1);
    }

    #[test]
    fn add_twice_is_idempotent() {
        let once = rows();
        once.apply_change(Change::add(row("a", "x")));

        let twice = rows();
        twice.apply_change(Change::add(row("a", "x")));
        twice.apply_change(Change::add(row("a", "x")));

        assert_eq!(labels(&once), labels(&twice));
    }

    #[test]
    fn update_replaces_entry() {
        let col = rows();
        col.apply_change(Change::add(row("a", "old")));
        col.apply_change(Change::update(row("a", "old"), row("a", "new")));
        assert_eq!(labels(&col), vec![("a".to_owned(), "new")]);
    }

    #[test]
    fn update_with_changed_id_drops_old_entry() {
        let col = rows();
        col.apply_change(Change::add(row("a", "v1")));
        col.apply_change(Change::update(row("a", "v1"), row("b", "v2")));
        assert!(col.get("a").is_none());
        assert_eq!(col.get("b").unwrap().label, "v2");
    }

    #[test]
    fn remove_deletes_by_old_value_id() {
        let col = rows();
        col.apply_change(Change::add(row("a", "x")));
        col.apply_change(Change::add(row("b", "y")));
        assert!(col.apply_change(Change::remove(row("a", "ignored"))));
        assert_eq!(labels(&col), vec![("b".to_owned(), "y")]);
    }

    #[test]
    fn remove_of_unknown_id_is_not_a_change() {
        let col = rows();
        let before = col.version();
        assert!(!col.apply_change(Change::remove(row("zzz", ""))));
        assert_eq!(col.version(), before);
        assert!(col.meta().update_time.is_none());
    }

    #[test]
    fn batch_applies_in_order() {
        let col = rows();
        col.apply_changes(vec![
            Change::add(row("a", "1")),
            Change::update(row("a", "1"), row("a", "2")),
            Change::add(row("b", "3")),
            Change::remove(row("b", "3")),
        ]);
        assert_eq!(labels(&col), vec![("a".to_owned(), "2")]);
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let col = rows();
        col.apply_change(Change::add(row("a", "x")));
        let snap = col.snapshot();
        col.apply_change(Change::add(row("b", "y")));
        assert_eq!(snap.len(), 1);
        assert_eq!(col.len(), 2);
    }

    #[test]
    fn clear_empties_everything() {
        let col = rows();
        col.apply_change(Change::add(row("a", "x")));
        col.apply_change(Change::add(row("b", "y")));
        col.clear();
        assert!(col.is_empty());
        assert!(col.items().is_empty());
    }
}
