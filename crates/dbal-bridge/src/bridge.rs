use std::fmt;

use async_trait::async_trait;
use dbal_core::{Adapter, AdapterCapabilities, ListOptions, ListResult, Method, Record};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::links::Link;
use crate::{BridgeError, BridgeResult};

/// The Bridge.
///
/// Every adapter operation becomes exactly one call on the link, with the operation name as the
/// method and the arguments, in declared order, as the params.
pub struct Bridge<L> {
    pub(crate) link: L,
}

impl<L> Clone for Bridge<L>
where
    L: Clone,
{
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
        }
    }
}

impl<L> fmt::Debug for Bridge<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").finish_non_exhaustive()
    }
}

fn param<T>(value: T) -> BridgeResult<Value>
where
    T: Serialize,
{
    serde_json::to_value(value).map_err(BridgeError::Encoding)
}

impl<L> Bridge<L>
where
    L: Link,
{
    /// Creates a new Bridge.
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Returns the link used by current instance.
    pub fn link(&self) -> &L {
        &self.link
    }

    async fn call<T>(&self, method: Method, params: Vec<Value>) -> BridgeResult<T>
    where
        T: DeserializeOwned,
    {
        let output = self.link.call(method, params).await?;

        serde_json::from_value(output).map_err(BridgeError::Encoding)
    }
}

#[async_trait]
impl<L> Adapter for Bridge<L>
where
    L: Link,
{
    type Error = BridgeError;

    async fn create(&self, entity: &str, data: Record) -> BridgeResult<Value> {
        self.call(Method::Create, vec![param(entity)?, param(data)?]).await
    }

    async fn read(&self, entity: &str, id: &str) -> BridgeResult<Option<Value>> {
        self.call(Method::Read, vec![param(entity)?, param(id)?]).await
    }

    async fn update(&self, entity: &str, id: &str, data: Record) -> BridgeResult<Value> {
        self.call(Method::Update, vec![param(entity)?, param(id)?, param(data)?]).await
    }

    async fn delete(&self, entity: &str, id: &str) -> BridgeResult<bool> {
        self.call(Method::Delete, vec![param(entity)?, param(id)?]).await
    }

    async fn list(&self, entity: &str, options: Option<ListOptions>) -> BridgeResult<ListResult> {
        self.call(Method::List, vec![param(entity)?, param(options)?]).await
    }

    async fn find_first(
        &self,
        entity: &str,
        filter: Option<Record>,
    ) -> BridgeResult<Option<Value>> {
        self.call(Method::FindFirst, vec![param(entity)?, param(filter)?]).await
    }

    async fn find_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
    ) -> BridgeResult<Option<Value>> {
        self.call(Method::FindByField, vec![param(entity)?, param(field)?, value]).await
    }

    async fn upsert(
        &self,
        entity: &str,
        unique_field: &str,
        unique_value: Value,
        create_data: Record,
        update_data: Record,
    ) -> BridgeResult<Value> {
        self.call(
            Method::Upsert,
            vec![
                param(entity)?,
                param(unique_field)?,
                unique_value,
                param(create_data)?,
                param(update_data)?,
            ],
        )
        .await
    }

    async fn update_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
        data: Record,
    ) -> BridgeResult<Value> {
        self.call(
            Method::UpdateByField,
            vec![param(entity)?, param(field)?, value, param(data)?],
        )
        .await
    }

    async fn delete_by_field(&self, entity: &str, field: &str, value: Value) -> BridgeResult<bool> {
        self.call(Method::DeleteByField, vec![param(entity)?, param(field)?, value]).await
    }

    async fn create_many(&self, entity: &str, data: Vec<Record>) -> BridgeResult<u64> {
        self.call(Method::CreateMany, vec![param(entity)?, param(data)?]).await
    }

    async fn update_many(&self, entity: &str, filter: Record, data: Record) -> BridgeResult<u64> {
        self.call(
            Method::UpdateMany,
            vec![param(entity)?, param(filter)?, param(data)?],
        )
        .await
    }

    async fn delete_many(&self, entity: &str, filter: Option<Record>) -> BridgeResult<u64> {
        self.call(Method::DeleteMany, vec![param(entity)?, param(filter)?]).await
    }

    async fn get_capabilities(&self) -> BridgeResult<AdapterCapabilities> {
        self.call(Method::GetCapabilities, Vec::new()).await
    }

    async fn close(&self) -> BridgeResult<()> {
        let outcome = self.call::<Value>(Method::Close, Vec::new()).await;
        self.link.shutdown().await;

        outcome.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dbal_core::memory::MemoryAdapter;
    use dbal_core::ErrorCode;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::links::LocalLink;
    use crate::ErrorKind;

    /// Records every call and answers with a canned value.
    #[derive(Debug, Default, Clone)]
    struct RecordingLink {
        calls: Arc<Mutex<Vec<(Method, Vec<Value>)>>>,
        shutdowns: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Link for RecordingLink {
        async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value> {
            self.calls.lock().push((method, params));

            Ok(match method {
                Method::DeleteMany | Method::CreateMany | Method::UpdateMany => json!(0),
                Method::Delete | Method::DeleteByField => json!(true),
                _ => Value::Null,
            })
        }

        async fn shutdown(&self) {
            *self.shutdowns.lock() += 1;
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn params_follow_declared_order() {
        let link = RecordingLink::default();
        let bridge = Bridge::new(link.clone());

        bridge
            .upsert(
                "User",
                "email",
                json!("a@b.c"),
                record(json!({"id": "u1"})),
                record(json!({"name": "a"})),
            )
            .await
            .unwrap();
        bridge.delete_many("User", None).await.unwrap();

        let calls = link.calls.lock().clone();
        assert_eq!(
            calls,
            vec![
                (
                    Method::Upsert,
                    vec![
                        json!("User"),
                        json!("email"),
                        json!("a@b.c"),
                        json!({"id": "u1"}),
                        json!({"name": "a"}),
                    ]
                ),
                (Method::DeleteMany, vec![json!("User"), Value::Null]),
            ]
        );
    }

    #[tokio::test]
    async fn close_calls_daemon_then_shuts_link_down() {
        let link = RecordingLink::default();
        let bridge = Bridge::new(link.clone());

        bridge.close().await.unwrap();

        assert_eq!(link.calls.lock().clone(), vec![(Method::Close, vec![])]);
        assert_eq!(*link.shutdowns.lock(), 1);
    }

    #[tokio::test]
    async fn local_bridge_behaves_like_its_adapter() {
        let bridge = Bridge::new(LocalLink::new(MemoryAdapter::new()));

        let created = bridge
            .create("User", record(json!({"id": "u1", "name": "a"})))
            .await
            .unwrap();
        assert_eq!(created, json!({"id": "u1", "name": "a"}));

        assert_eq!(
            bridge.read("User", "u1").await.unwrap(),
            Some(json!({"id": "u1", "name": "a"}))
        );
        assert_eq!(bridge.read("User", "u2").await.unwrap(), None);

        let page = bridge.list("User", None).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(!page.has_more);

        let err = bridge
            .create("User", record(json!({"id": "u1"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);
        assert_eq!(err.code(), Some(ErrorCode::CONFLICT));

        assert_eq!(
            bridge.get_capabilities().await.unwrap(),
            AdapterCapabilities::default()
        );
        assert!(bridge.delete("User", "u1").await.unwrap());
    }
}
