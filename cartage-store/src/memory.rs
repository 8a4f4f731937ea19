use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use cartage_core::store::{Document, DocumentStore, FieldOp, QueryOp, StoreError, WriteBatch};

/// In-memory document store used by tests and the default wiring.
///
/// Matches the external store's semantics where the engine depends on them:
/// per-document updates are atomic, increments never lose writes, server
/// timestamps resolve at apply time, and a batch either applies fully or not
/// at all.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> dashmap::mapref::one::RefMut<'_, String, DashMap<String, Value>> {
        self.collections.entry(name.to_string()).or_default()
    }

    fn apply_fields(doc: &mut Value, fields: &[(String, FieldOp)]) {
        let map = match doc {
            Value::Object(map) => map,
            other => {
                *other = Value::Object(Map::new());
                other.as_object_mut().unwrap()
            }
        };

        for (name, op) in fields {
            match op {
                FieldOp::Set(value) => {
                    map.insert(name.clone(), value.clone());
                }
                FieldOp::Delete => {
                    map.remove(name);
                }
                FieldOp::ServerTimestamp => {
                    map.insert(name.clone(), serde_json::json!(Utc::now()));
                }
                FieldOp::Increment(delta) => {
                    let current = map.get(name).and_then(Value::as_f64).unwrap_or(0.0);
                    let next = current + delta;
                    let number = if next.fract() == 0.0 && next.abs() < i64::MAX as f64 {
                        Number::from(next as i64)
                    } else {
                        Number::from_f64(next).unwrap_or_else(|| Number::from(0))
                    };
                    map.insert(name.clone(), Value::Number(number));
                }
            }
        }
    }

    fn matches(doc_value: &Value, op: QueryOp, expected: &Value) -> bool {
        match op {
            QueryOp::Eq => doc_value == expected,
            _ => {
                let ordering = match (doc_value, expected) {
                    (Value::Number(a), Value::Number(b)) => a
                        .as_f64()
                        .zip(b.as_f64())
                        .and_then(|(a, b)| a.partial_cmp(&b)),
                    (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
                    _ => None,
                };
                let Some(ordering) = ordering else { return false };
                match op {
                    QueryOp::Lt => ordering.is_lt(),
                    QueryOp::Lte => ordering.is_le(),
                    QueryOp::Gt => ordering.is_gt(),
                    QueryOp::Gte => ordering.is_ge(),
                    QueryOp::Eq => unreachable!(),
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id).map(|doc| doc.clone())))
    }

    async fn query(
        &self,
        collection: &str,
        field: &str,
        op: QueryOp,
        value: Value,
    ) -> Result<Vec<Document>, StoreError> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut results: Vec<Document> = docs
            .iter()
            .filter(|entry| Self::matches(&entry.value()[field], op, &value))
            .map(|entry| Document {
                id: entry.key().clone(),
                data: entry.value().clone(),
            })
            .collect();

        // Deterministic order for callers and tests.
        results.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(results)
    }

    /// Inserts a document. An embedded string `id` field is honored as the
    /// document id; otherwise one is generated.
    async fn add(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = data["id"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.collection(collection).insert(id.clone(), data);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Vec<(String, FieldOp)>,
    ) -> Result<(), StoreError> {
        let docs = self.collection(collection);
        let mut doc = docs.get_mut(id).ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })?;
        Self::apply_fields(doc.value_mut(), &fields);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        // Validate every target first so the batch is all-or-nothing.
        for entry in &batch.entries {
            let exists = self
                .collections
                .get(&entry.collection)
                .map(|docs| docs.contains_key(&entry.id))
                .unwrap_or(false);
            if !exists {
                return Err(StoreError::NotFound {
                    collection: entry.collection.clone(),
                    id: entry.id.clone(),
                });
            }
        }

        for entry in batch.entries {
            self.update(&entry.collection, &entry.id, entry.fields).await?;
        }
        Ok(())
    }
}
