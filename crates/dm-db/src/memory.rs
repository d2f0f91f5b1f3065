//! In-memory document store for tests.
//!
//! Supports equality filters (dotted paths allowed), `$set`/`$unset`/`$inc`
//! updates, `$match`/`$limit` pipelines and unique indexes. Anything else
//! returns [`DbError::NotImplemented`].

use crate::error::{DbError, DbResult};
use crate::traits::{Document, DocumentStore};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard};

const BACKEND: &str = "memory";

#[derive(Debug, Clone)]
struct Index {
    name: String,
    fields: Vec<String>,
    unique: bool,
}

#[derive(Debug, Default)]
struct Collection {
    docs: Vec<Document>,
    indexes: Vec<Index>,
}

impl Collection {
    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> DbResult<()> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key: Vec<Option<&Value>> =
                index.fields.iter().map(|f| get_path(candidate, f)).collect();
            let clash = self
                .docs
                .iter()
                .enumerate()
                .filter(|(pos, _)| Some(*pos) != skip)
                .any(|(_, doc)| {
                    index
                        .fields
                        .iter()
                        .map(|f| get_path(doc, f))
                        .eq(key.iter().copied())
                });
            if clash {
                return Err(DbError::DuplicateKey(format!(
                    "index '{}' already contains this key",
                    index.name
                )));
            }
        }
        Ok(())
    }
}

/// Document store that keeps every collection in process memory
#[derive(Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<BTreeMap<String, Collection>>,
    offline: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When offline every call fails with a connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, AtomicOrdering::SeqCst);
    }

    /// All documents of a collection in insertion order.
    pub fn documents(&self, collection: &str) -> DbResult<Vec<Document>> {
        let guard = self.lock()?;
        Ok(guard
            .get(collection)
            .map(|c| c.docs.clone())
            .unwrap_or_default())
    }

    /// Index names of a collection.
    pub fn index_names(&self, collection: &str) -> DbResult<Vec<String>> {
        let guard = self.lock()?;
        Ok(guard
            .get(collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default())
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, BTreeMap<String, Collection>>> {
        if self.offline.load(AtomicOrdering::SeqCst) {
            return Err(DbError::ConnectionError("memory store is offline".into()));
        }
        self.collections
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }
}

fn not_implemented(feature: impl Into<String>) -> DbError {
    DbError::NotImplemented {
        backend: BACKEND.to_string(),
        feature: feature.into(),
    }
}

fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(child) = entry {
                set_path(child, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(child)) = doc.get_mut(head) {
                remove_path(child, rest);
            }
        }
    }
}

fn matches(doc: &Document, filter: &Document) -> DbResult<bool> {
    for (path, expected) in filter {
        if path.starts_with('$') {
            return Err(not_implemented(format!("filter operator {}", path)));
        }
        if let Value::Object(inner) = expected {
            if let Some(op) = inner.keys().find(|k| k.starts_with('$')) {
                return Err(not_implemented(format!("filter operator {}", op)));
            }
        }
        if get_path(doc, path) != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn apply_update(doc: &mut Document, update: &Document) -> DbResult<()> {
    for (op, fields) in update {
        let fields = fields
            .as_object()
            .ok_or_else(|| DbError::InvalidDocument(format!("{} expects an object", op)))?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone());
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    remove_path(doc, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let current = get_path(doc, path).cloned().unwrap_or(Value::from(0));
                    let next = match (current.as_i64(), delta.as_i64()) {
                        (Some(c), Some(d)) => Value::from(c + d),
                        _ => {
                            let c = current.as_f64().ok_or_else(|| {
                                DbError::InvalidDocument(format!("{} is not numeric", path))
                            })?;
                            let d = delta.as_f64().ok_or_else(|| {
                                DbError::InvalidDocument(format!("$inc of {} is not numeric", path))
                            })?;
                            Value::from(c + d)
                        }
                    };
                    set_path(doc, path, next);
                }
            }
            other if other.starts_with('$') => {
                return Err(not_implemented(format!("update operator {}", other)))
            }
            other => {
                return Err(DbError::InvalidDocument(format!(
                    "update field '{}' is not an operator",
                    other
                )))
            }
        }
    }
    Ok(())
}

fn default_index_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, dir)| format!("{}_{}", field, dir))
        .collect::<Vec<_>>()
        .join("_")
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> DbResult<()> {
        self.lock().map(|_| ())
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str, _options: &Document) -> DbResult<()> {
        let mut guard = self.lock()?;
        if guard.contains_key(name) {
            return Err(DbError::DocumentError(format!(
                "collection '{}' already exists",
                name
            )));
        }
        guard.insert(name.to_string(), Collection::default());
        Ok(())
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: &Document,
        options: &Document,
    ) -> DbResult<String> {
        if keys.is_empty() {
            return Err(DbError::InvalidDocument("index has no keys".into()));
        }
        let name = options
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_index_name(keys));
        let unique = options
            .get("unique")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut guard = self.lock()?;
        let coll = guard.entry(collection.to_string()).or_default();
        if coll.indexes.iter().any(|i| i.name == name) {
            return Ok(name);
        }
        let index = Index {
            name: name.clone(),
            fields: keys.keys().cloned().collect(),
            unique,
        };
        if unique {
            let mut seen = Collection {
                docs: Vec::with_capacity(coll.docs.len()),
                indexes: vec![index.clone()],
            };
            for doc in &coll.docs {
                seen.check_unique(doc, None)?;
                seen.docs.push(doc.clone());
            }
        }
        coll.indexes.push(index);
        Ok(name)
    }

    async fn insert_one(&self, collection: &str, document: &Document) -> DbResult<()> {
        let mut guard = self.lock()?;
        let coll = guard.entry(collection.to_string()).or_default();
        coll.check_unique(document, None)?;
        coll.docs.push(document.clone());
        Ok(())
    }

    async fn insert_many(&self, collection: &str, documents: &[Document]) -> DbResult<u64> {
        let mut guard = self.lock()?;
        let coll = guard.entry(collection.to_string()).or_default();
        // Ordered insert: documents before a duplicate stay inserted.
        let mut inserted = 0u64;
        for document in documents {
            coll.check_unique(document, None)?;
            coll.docs.push(document.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        update: &Value,
        options: &Document,
    ) -> DbResult<u64> {
        let update = match update {
            Value::Object(map) => map,
            Value::Array(_) => return Err(not_implemented("update pipelines")),
            other => {
                return Err(DbError::InvalidDocument(format!(
                    "update must be an object or a pipeline, got {}",
                    other
                )))
            }
        };
        if options.get("upsert").and_then(Value::as_bool) == Some(true) {
            return Err(not_implemented("upsert"));
        }

        let mut guard = self.lock()?;
        let Some(coll) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let mut modified = 0u64;
        for pos in 0..coll.docs.len() {
            if !matches(&coll.docs[pos], filter)? {
                continue;
            }
            let mut next = coll.docs[pos].clone();
            apply_update(&mut next, update)?;
            if next != coll.docs[pos] {
                coll.check_unique(&next, Some(pos))?;
                coll.docs[pos] = next;
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_many(&self, collection: &str, filter: &Document) -> DbResult<u64> {
        let mut guard = self.lock()?;
        let Some(coll) = guard.get_mut(collection) else {
            return Ok(0);
        };
        let mut kept = Vec::with_capacity(coll.docs.len());
        let mut deleted = 0u64;
        for doc in coll.docs.drain(..) {
            // an unsupported filter fails before any document is removed
            if matches(&doc, filter)? {
                deleted += 1;
            } else {
                kept.push(doc);
            }
        }
        coll.docs = kept;
        Ok(deleted)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Document]) -> DbResult<u64> {
        let guard = self.lock()?;
        let mut docs: Vec<&Document> = guard
            .get(collection)
            .map(|c| c.docs.iter().collect())
            .unwrap_or_default();
        for stage in pipeline {
            let (op, arg) = match (stage.len(), stage.iter().next()) {
                (1, Some(entry)) => entry,
                _ => {
                    return Err(DbError::InvalidDocument(
                        "pipeline stage must have exactly one operator".into(),
                    ))
                }
            };
            match op.as_str() {
                "$match" => {
                    let filter = arg.as_object().ok_or_else(|| {
                        DbError::InvalidDocument("$match expects an object".into())
                    })?;
                    let mut kept = Vec::with_capacity(docs.len());
                    for doc in docs {
                        if matches(doc, filter)? {
                            kept.push(doc);
                        }
                    }
                    docs = kept;
                }
                "$limit" => {
                    let n = arg.as_u64().ok_or_else(|| {
                        DbError::InvalidDocument("$limit expects a positive integer".into())
                    })?;
                    docs.truncate(usize::try_from(n).unwrap_or(usize::MAX));
                }
                other => return Err(not_implemented(format!("pipeline stage {}", other))),
            }
        }
        Ok(docs.len() as u64)
    }

    async fn find_sorted(
        &self,
        collection: &str,
        filter: &Document,
        sort: &Document,
        limit: Option<i64>,
    ) -> DbResult<Vec<Document>> {
        let guard = self.lock()?;
        let Some(coll) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for doc in &coll.docs {
            if matches(doc, filter)? {
                found.push(doc.clone());
            }
        }
        found.sort_by(|a, b| {
            sort.iter()
                .map(|(field, dir)| {
                    let ord = compare_values(get_path(a, field), get_path(b, field));
                    if dir.as_i64() == Some(-1) {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        if let Some(limit) = limit.filter(|l| *l > 0) {
            found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(found)
    }

    async fn drop_collection(&self, name: &str) -> DbResult<()> {
        self.lock()?.remove(name);
        Ok(())
    }

    fn store_type(&self) -> &'static str {
        BACKEND
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
