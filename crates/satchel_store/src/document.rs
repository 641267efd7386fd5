//! Per-collection materialized cache of the latest known documents.

use crate::error::StoreResult;
use crate::now_millis;
use parking_lot::RwLock;
use satchel_storage::KeyValueBackend;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The current materialized view of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalDocument {
    /// Document id.
    pub id: String,
    /// Opaque document body. The store never interprets it.
    pub data: Value,
    /// Local timestamp of the last write, local or pulled.
    pub updated_at: i64,
}

/// Per-collection cache of the latest known state of each document.
///
/// The read path for the application. Collections are persisted as one
/// backend value each (`docs/<collection>`); an in-memory image keeps
/// reads synchronous and available while a sync cycle is in flight.
///
/// Pairing with the change log is enforced one level up, in
/// [`crate::LocalStore`] - this type is the raw materialized cache.
pub struct DocumentStore {
    backend: Arc<dyn KeyValueBackend>,
    cache: RwLock<HashMap<String, BTreeMap<String, LocalDocument>>>,
}

impl DocumentStore {
    /// Creates a document store over the given backend.
    ///
    /// Collections are loaded lazily on first access.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Returns all documents in a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded from storage.
    pub fn documents(&self, collection: &str) -> StoreResult<Vec<LocalDocument>> {
        let mut cache = self.cache.write();
        let docs = self.collection_mut(&mut cache, collection)?;
        Ok(docs.values().cloned().collect())
    }

    /// Returns one document, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be loaded from storage.
    pub fn get(&self, collection: &str, id: &str) -> StoreResult<Option<LocalDocument>> {
        let mut cache = self.cache.write();
        let docs = self.collection_mut(&mut cache, collection)?;
        Ok(docs.get(id).cloned())
    }

    /// Upserts a document, stamping `updated_at` with the current time.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the previous state
    /// is restored in that case.
    pub fn put(&self, collection: &str, id: &str, data: Value) -> StoreResult<LocalDocument> {
        let mut cache = self.cache.write();
        let docs = self.collection_mut(&mut cache, collection)?;

        let doc = LocalDocument {
            id: id.to_string(),
            data,
            updated_at: now_millis(),
        };
        let previous = docs.insert(id.to_string(), doc.clone());
        if let Err(e) = Self::persist(&self.backend, collection, docs) {
            match previous {
                Some(p) => {
                    docs.insert(id.to_string(), p);
                }
                None => {
                    docs.remove(id);
                }
            }
            return Err(e);
        }
        Ok(doc)
    }

    /// Removes a document. Returns true if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the durable write fails; the previous state
    /// is restored in that case.
    pub fn delete(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let mut cache = self.cache.write();
        let docs = self.collection_mut(&mut cache, collection)?;

        let Some(previous) = docs.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = Self::persist(&self.backend, collection, docs) {
            docs.insert(id.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    fn collection_mut<'c>(
        &self,
        cache: &'c mut HashMap<String, BTreeMap<String, LocalDocument>>,
        collection: &str,
    ) -> StoreResult<&'c mut BTreeMap<String, LocalDocument>> {
        match cache.entry(collection.to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                let loaded = match self.backend.read(&collection_key(collection))? {
                    Some(bytes) => serde_json::from_slice(&bytes)?,
                    None => BTreeMap::new(),
                };
                Ok(vacant.insert(loaded))
            }
        }
    }

    fn persist(
        backend: &Arc<dyn KeyValueBackend>,
        collection: &str,
        docs: &BTreeMap<String, LocalDocument>,
    ) -> StoreResult<()> {
        let bytes = serde_json::to_vec(docs)?;
        backend.write(&collection_key(collection), &bytes)?;
        Ok(())
    }
}

fn collection_key(collection: &str) -> String {
    format!("docs/{collection}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use satchel_storage::MemoryBackend;
    use serde_json::json;

    fn open_store() -> (Arc<MemoryBackend>, DocumentStore) {
        let backend = Arc::new(MemoryBackend::new());
        let store = DocumentStore::new(Arc::clone(&backend) as Arc<dyn KeyValueBackend>);
        (backend, store)
    }

    #[test]
    fn put_then_get() {
        let (_, store) = open_store();

        store.put("notes", "n1", json!({"title": "hello"})).unwrap();

        let doc = store.get("notes", "n1").unwrap().unwrap();
        assert_eq!(doc.id, "n1");
        assert_eq!(doc.data, json!({"title": "hello"}));
        assert!(doc.updated_at > 0);
    }

    #[test]
    fn documents_ordered_by_id() {
        let (_, store) = open_store();

        store.put("notes", "b", json!(2)).unwrap();
        store.put("notes", "a", json!(1)).unwrap();
        store.put("notes", "c", json!(3)).unwrap();

        let ids: Vec<_> = store
            .documents("notes")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn put_overwrites() {
        let (_, store) = open_store();

        store.put("notes", "n1", json!({"v": 1})).unwrap();
        store.put("notes", "n1", json!({"v": 2})).unwrap();

        assert_eq!(store.documents("notes").unwrap().len(), 1);
        let doc = store.get("notes", "n1").unwrap().unwrap();
        assert_eq!(doc.data, json!({"v": 2}));
    }

    #[test]
    fn delete_removes() {
        let (_, store) = open_store();

        store.put("notes", "n1", json!(1)).unwrap();
        assert!(store.delete("notes", "n1").unwrap());
        assert!(!store.delete("notes", "n1").unwrap());
        assert_eq!(store.get("notes", "n1").unwrap(), None);
    }

    #[test]
    fn collections_are_independent() {
        let (_, store) = open_store();

        store.put("notes", "x", json!(1)).unwrap();
        store.put("templates", "x", json!(2)).unwrap();

        assert_eq!(store.get("notes", "x").unwrap().unwrap().data, json!(1));
        assert_eq!(store.get("templates", "x").unwrap().unwrap().data, json!(2));
    }

    #[test]
    fn failed_put_restores_previous() {
        let (backend, store) = open_store();

        store.put("notes", "n1", json!({"v": 1})).unwrap();
        backend.set_fail_writes(true);

        assert!(store.put("notes", "n1", json!({"v": 2})).is_err());
        assert!(store.put("notes", "n2", json!({"v": 3})).is_err());

        backend.set_fail_writes(false);
        assert_eq!(
            store.get("notes", "n1").unwrap().unwrap().data,
            json!({"v": 1})
        );
        assert_eq!(store.get("notes", "n2").unwrap(), None);
    }

    #[test]
    fn reopen_restores_documents() {
        let backend = Arc::new(MemoryBackend::new());
        {
            let store = DocumentStore::new(Arc::clone(&backend) as Arc<dyn KeyValueBackend>);
            store.put("notes", "n1", json!({"kept": true})).unwrap();
        }

        let store = DocumentStore::new(backend);
        let doc = store.get("notes", "n1").unwrap().unwrap();
        assert_eq!(doc.data, json!({"kept": true}));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(String, u64),
        Delete(String),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let id = prop::sample::select(vec!["a", "b", "c", "d", "e"]);
        prop_oneof![
            (id.clone(), any::<u64>()).prop_map(|(i, v)| Op::Put(i.to_string(), v)),
            id.prop_map(|i| Op::Delete(i.to_string())),
        ]
    }

    proptest! {
        // The store after N mutations equals the fold of those mutations
        // applied in order: no lost writes.
        #[test]
        fn store_matches_fold_of_mutations(ops in prop::collection::vec(op_strategy(), 0..40)) {
            let (_, store) = open_store();
            let mut model: HashMap<String, u64> = HashMap::new();

            for op in &ops {
                match op {
                    Op::Put(id, v) => {
                        store.put("notes", id, json!(v)).unwrap();
                        model.insert(id.clone(), *v);
                    }
                    Op::Delete(id) => {
                        store.delete("notes", id).unwrap();
                        model.remove(id);
                    }
                }
            }

            let docs = store.documents("notes").unwrap();
            prop_assert_eq!(docs.len(), model.len());
            for doc in docs {
                let expected = model.get(&doc.id).copied();
                prop_assert_eq!(Some(doc.data), expected.map(|v| json!(v)));
            }
        }
    }
}
