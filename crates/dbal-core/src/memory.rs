//! An in-memory adapter.
//!
//! Records are kept per entity in insertion order. Nothing is persisted.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    Adapter, AdapterCapabilities, ListOptions, ListResult, Record, SortDirection, StorageError,
    StorageResult,
};

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 20;

/// Entities whose primary key is not `id`.
const ID_FIELDS: &[(&str, &str)] = &[
    ("Credential", "username"),
    ("InstalledPackage", "packageId"),
    ("PackageData", "packageId"),
];

fn id_field(entity: &str) -> &'static str {
    ID_FIELDS
        .iter()
        .find(|(name, _)| *name == entity)
        .map(|(_, field)| *field)
        .unwrap_or("id")
}

fn record_id(entity: &str, data: &Record) -> StorageResult<String> {
    let field = id_field(entity);

    match data.get(field) {
        Some(Value::String(m)) if !m.trim().is_empty() => Ok(m.clone()),
        _ => Err(
            StorageError::validation(format!("{entity} {field} is required")).with_details(
                serde_json::json!([{ "field": field, "error": format!("{field} is required") }]),
            ),
        ),
    }
}

fn matches(record: &Record, filter: Option<&Record>) -> bool {
    filter
        .map(|f| f.iter().all(|(k, v)| record.get(k) == Some(v)))
        .unwrap_or(true)
}

fn compare(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    match (left, right) {
        (Some(Value::String(l)), Some(Value::String(r))) => l.cmp(r),
        (Some(Value::Number(l)), Some(Value::Number(r))) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(l, r)| l.partial_cmp(&r))
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(l)), Some(Value::Bool(r))) => l.cmp(r),
        _ => Ordering::Equal,
    }
}

fn merge(mut record: Record, data: Record) -> Record {
    record.extend(data);
    record
}

#[derive(Debug, Default)]
struct EntityStore {
    records: Vec<(String, Record)>,
}

impl EntityStore {
    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|(m, _)| m == id)
    }

    fn position_by(&self, field: &str, value: &Value) -> Option<usize> {
        self.records
            .iter()
            .position(|(_, record)| record.get(field) == Some(value))
    }
}

/// An adapter that keeps all records in memory.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    store: Mutex<HashMap<String, EntityStore>>,
}

impl MemoryAdapter {
    /// Creates an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entity<F, T>(&self, entity: &str, f: F) -> T
    where
        F: FnOnce(&mut EntityStore) -> T,
    {
        let mut store = self.store.lock();
        f(store.entry(entity.to_string()).or_default())
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    type Error = StorageError;

    async fn create(&self, entity: &str, data: Record) -> StorageResult<Value> {
        let id = record_id(entity, &data)?;

        self.with_entity(entity, |store| {
            if store.position(&id).is_some() {
                return Err(StorageError::conflict(format!(
                    "{entity} already exists: {id}"
                )));
            }

            store.records.push((id, data.clone()));
            Ok(Value::Object(data))
        })
    }

    async fn read(&self, entity: &str, id: &str) -> StorageResult<Option<Value>> {
        Ok(self.with_entity(entity, |store| {
            store
                .position(id)
                .map(|i| Value::Object(store.records[i].1.clone()))
        }))
    }

    async fn update(&self, entity: &str, id: &str, data: Record) -> StorageResult<Value> {
        self.with_entity(entity, |store| {
            let i = store
                .position(id)
                .ok_or_else(|| StorageError::not_found(format!("{entity} not found: {id}")))?;

            let (_, record) = &mut store.records[i];
            *record = merge(std::mem::take(record), data);

            Ok(Value::Object(record.clone()))
        })
    }

    async fn delete(&self, entity: &str, id: &str) -> StorageResult<bool> {
        Ok(self.with_entity(entity, |store| {
            store
                .position(id)
                .map(|i| store.records.remove(i))
                .is_some()
        }))
    }

    async fn list(&self, entity: &str, options: Option<ListOptions>) -> StorageResult<ListResult> {
        let options = options.unwrap_or_default();
        let page = options.page.unwrap_or(DEFAULT_PAGE).max(1);
        let limit = options.limit.unwrap_or(DEFAULT_LIMIT);

        let mut filtered = self.with_entity(entity, |store| {
            store
                .records
                .iter()
                .filter(|(_, record)| matches(record, options.filter.as_ref()))
                .map(|(_, record)| record.clone())
                .collect::<Vec<_>>()
        });

        if let Some((key, direction)) = options.sort.as_ref().and_then(|m| m.iter().next()) {
            filtered.sort_by(|l, r| {
                let ordering = compare(l.get(key), r.get(key));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let total = filtered.len() as u64;
        let start = (page - 1).saturating_mul(limit);
        let data = filtered
            .into_iter()
            .skip(usize::try_from(start).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .map(Value::Object)
            .collect();

        Ok(ListResult {
            data,
            total,
            page,
            limit,
            has_more: start.saturating_add(limit) < total,
        })
    }

    async fn find_first(
        &self,
        entity: &str,
        filter: Option<Record>,
    ) -> StorageResult<Option<Value>> {
        Ok(self.with_entity(entity, |store| {
            store
                .records
                .iter()
                .find(|(_, record)| matches(record, filter.as_ref()))
                .map(|(_, record)| Value::Object(record.clone()))
        }))
    }

    async fn find_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
    ) -> StorageResult<Option<Value>> {
        let mut filter = Record::new();
        filter.insert(field.to_string(), value);

        self.find_first(entity, Some(filter)).await
    }

    async fn upsert(
        &self,
        entity: &str,
        unique_field: &str,
        unique_value: Value,
        create_data: Record,
        update_data: Record,
    ) -> StorageResult<Value> {
        let mut payload = create_data;
        payload.insert(unique_field.to_string(), unique_value.clone());
        let id = record_id(entity, &payload);

        // looked up and inserted under one lock.
        self.with_entity(entity, |store| {
            if let Some(i) = store.position_by(unique_field, &unique_value) {
                let (_, record) = &mut store.records[i];
                *record = merge(std::mem::take(record), update_data);

                return Ok(Value::Object(record.clone()));
            }

            let id = id?;
            if store.position(&id).is_some() {
                return Err(StorageError::conflict(format!(
                    "{entity} already exists: {id}"
                )));
            }

            store.records.push((id, payload.clone()));
            Ok(Value::Object(payload))
        })
    }

    async fn update_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
        data: Record,
    ) -> StorageResult<Value> {
        self.with_entity(entity, |store| {
            let i = store
                .position_by(field, &value)
                .ok_or_else(|| StorageError::not_found(format!("{entity} not found")))?;

            let (_, record) = &mut store.records[i];
            *record = merge(std::mem::take(record), data);

            Ok(Value::Object(record.clone()))
        })
    }

    async fn delete_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
    ) -> StorageResult<bool> {
        Ok(self.with_entity(entity, |store| {
            store
                .position_by(field, &value)
                .map(|i| store.records.remove(i))
                .is_some()
        }))
    }

    async fn create_many(&self, entity: &str, data: Vec<Record>) -> StorageResult<u64> {
        let records = data
            .into_iter()
            .map(|m| record_id(entity, &m).map(|id| (id, m)))
            .collect::<StorageResult<Vec<_>>>()?;

        self.with_entity(entity, |store| {
            if let Some((id, _)) = records.iter().find(|(id, _)| store.position(id).is_some()) {
                return Err(StorageError::conflict(format!(
                    "{entity} already exists: {id}"
                )));
            }

            // a later record of the batch replaces an earlier one with the same id.
            let created = records.len() as u64;
            for (id, record) in records {
                match store.position(&id) {
                    Some(i) => store.records[i].1 = record,
                    None => store.records.push((id, record)),
                }
            }

            Ok(created)
        })
    }

    async fn update_many(&self, entity: &str, filter: Record, data: Record) -> StorageResult<u64> {
        Ok(self.with_entity(entity, |store| {
            let mut updated = 0;

            for (_, record) in store
                .records
                .iter_mut()
                .filter(|(_, record)| matches(record, Some(&filter)))
            {
                *record = merge(std::mem::take(record), data.clone());
                updated += 1;
            }

            updated
        }))
    }

    async fn delete_many(&self, entity: &str, filter: Option<Record>) -> StorageResult<u64> {
        Ok(self.with_entity(entity, |store| {
            let before = store.records.len();
            store
                .records
                .retain(|(_, record)| !matches(record, filter.as_ref()));

            (before - store.records.len()) as u64
        }))
    }

    async fn get_capabilities(&self) -> StorageResult<AdapterCapabilities> {
        Ok(AdapterCapabilities::default())
    }

    async fn close(&self) -> StorageResult<()> {
        self.store.lock().clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ErrorCode;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let adapter = MemoryAdapter::new();

        adapter
            .create("User", record(json!({"id": "u1", "name": "a"})))
            .await
            .unwrap();
        assert_eq!(
            adapter.read("User", "u1").await.unwrap(),
            Some(json!({"id": "u1", "name": "a"}))
        );

        let updated = adapter
            .update("User", "u1", record(json!({"name": "b"})))
            .await
            .unwrap();
        assert_eq!(updated, json!({"id": "u1", "name": "b"}));

        assert!(adapter.delete("User", "u1").await.unwrap());
        assert!(!adapter.delete("User", "u1").await.unwrap());
        assert_eq!(adapter.read("User", "u1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn create_rejects_missing_id_and_duplicates() {
        let adapter = MemoryAdapter::new();

        let err = adapter
            .create("User", record(json!({"name": "a"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::VALIDATION);

        adapter
            .create("Credential", record(json!({"username": "root"})))
            .await
            .unwrap();
        let err = adapter
            .create("Credential", record(json!({"username": "root"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let adapter = MemoryAdapter::new();

        let err = adapter
            .update("User", "ghost", Record::new())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_filters_sorts_and_paginates() {
        let adapter = MemoryAdapter::new();
        let users = [("u1", 30, "admin"), ("u2", 10, "user"), ("u3", 20, "user")]
            .into_iter()
            .map(|(id, age, role)| record(json!({"id": id, "age": age, "role": role})))
            .collect();
        assert_eq!(adapter.create_many("User", users).await.unwrap(), 3);

        let options = ListOptions {
            filter: Some(record(json!({"role": "user"}))),
            sort: Some([("age".to_string(), SortDirection::Desc)].into()),
            page: Some(1),
            limit: Some(1),
        };
        let page = adapter.list("User", Some(options)).await.unwrap();

        assert_eq!(page.total, 2);
        assert!(page.has_more);
        assert_eq!(page.data, vec![json!({"id": "u3", "age": 20, "role": "user"})]);
    }

    #[tokio::test]
    async fn create_many_is_all_or_nothing() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("Tag", record(json!({"id": "b"})))
            .await
            .unwrap();

        let batch = vec![record(json!({"id": "a"})), record(json!({"id": "b"}))];
        let err = adapter.create_many("Tag", batch).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::CONFLICT);
        assert_eq!(adapter.list("Tag", None).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn create_many_keeps_last_of_repeated_ids() {
        let adapter = MemoryAdapter::new();
        let batch = vec![
            record(json!({"id": "a", "n": 1})),
            record(json!({"id": "c"})),
            record(json!({"id": "a", "n": 2})),
        ];

        assert_eq!(adapter.create_many("Tag", batch).await.unwrap(), 3);

        let page = adapter.list("Tag", None).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.data[0], json!({"id": "a", "n": 2}));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_update_instead_of_conflicting() {
        let adapter = std::sync::Arc::new(MemoryAdapter::new());

        let upserts: Vec<_> = (0..16)
            .map(|n| {
                let adapter = adapter.clone();
                tokio::spawn(async move {
                    adapter
                        .upsert(
                            "User",
                            "id",
                            json!("u1"),
                            record(json!({"n": n})),
                            record(json!({"n": n})),
                        )
                        .await
                })
            })
            .collect();

        for upsert in upserts {
            upsert.await.unwrap().unwrap();
        }

        assert_eq!(adapter.list("User", None).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn upsert_and_field_operations() {
        let adapter = MemoryAdapter::new();

        let created = adapter
            .upsert(
                "User",
                "id",
                json!("u1"),
                record(json!({"name": "new"})),
                record(json!({"name": "updated"})),
            )
            .await
            .unwrap();
        assert_eq!(created, json!({"id": "u1", "name": "new"}));

        let updated = adapter
            .upsert(
                "User",
                "id",
                json!("u1"),
                record(json!({"name": "new"})),
                record(json!({"name": "updated"})),
            )
            .await
            .unwrap();
        assert_eq!(updated, json!({"id": "u1", "name": "updated"}));

        adapter
            .update_by_field("User", "name", json!("updated"), record(json!({"age": 3})))
            .await
            .unwrap();
        assert_eq!(
            adapter
                .find_by_field("User", "age", json!(3))
                .await
                .unwrap(),
            Some(json!({"id": "u1", "name": "updated", "age": 3}))
        );

        assert_eq!(
            adapter
                .update_many("User", record(json!({"age": 3})), record(json!({"age": 4})))
                .await
                .unwrap(),
            1
        );
        assert!(adapter
            .delete_by_field("User", "age", json!(4))
            .await
            .unwrap());
        assert_eq!(adapter.delete_many("User", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_clears_the_store() {
        let adapter = MemoryAdapter::new();
        adapter
            .create("User", record(json!({"id": "u1"})))
            .await
            .unwrap();

        adapter.close().await.unwrap();

        assert_eq!(adapter.read("User", "u1").await.unwrap(), None);
        assert_eq!(
            adapter.get_capabilities().await.unwrap(),
            AdapterCapabilities::default()
        );
    }
}
