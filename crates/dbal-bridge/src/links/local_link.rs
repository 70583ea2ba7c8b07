use std::fmt;
use std::sync::Arc;
use std::vec;

use async_trait::async_trait;
use dbal_core::{Adapter, Method, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::Link;
use crate::{BridgeError, BridgeResult};

/// A Link that resolves calls with a local adapter.
///
/// This is used by the daemon to answer remote calls, and to wire a [`Bridge`](crate::Bridge) to
/// an adapter in the same process.
pub struct LocalLink<A> {
    adapter: Arc<A>,
}

impl<A> fmt::Debug for LocalLink<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalLink").finish_non_exhaustive()
    }
}

impl<A> Clone for LocalLink<A> {
    fn clone(&self) -> Self {
        Self {
            adapter: self.adapter.clone(),
        }
    }
}

impl<A> LocalLink<A> {
    /// Creates a link that resolves calls with `adapter`.
    pub fn new(adapter: A) -> Self {
        Self::from_shared(Arc::new(adapter))
    }

    /// Creates a link that resolves calls with an adapter shared with other owners.
    pub fn from_shared(adapter: Arc<A>) -> Self {
        Self { adapter }
    }

    /// Returns the adapter used by current instance.
    pub fn adapter(&self) -> &Arc<A> {
        &self.adapter
    }
}

/// Positional parameters of one call.
struct Params {
    method: Method,
    position: usize,
    inner: vec::IntoIter<Value>,
}

impl Params {
    fn new(method: Method, params: Vec<Value>) -> Self {
        Self {
            method,
            position: 0,
            inner: params.into_iter(),
        }
    }

    /// Takes the next parameter, absent parameters decode as `null`.
    fn next<T>(&mut self) -> BridgeResult<T>
    where
        T: DeserializeOwned,
    {
        let position = self.position;
        self.position += 1;

        let value = self.inner.next().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            StorageError::validation(format!(
                "invalid parameter {position} for {}: {e}",
                self.method
            ))
            .into()
        })
    }
}

fn encode<T, E>(output: Result<T, E>) -> BridgeResult<Value>
where
    T: Serialize,
    E: Into<StorageError>,
{
    let output = output.map_err(|e| BridgeError::Remote(e.into()))?;

    serde_json::to_value(output).map_err(BridgeError::Encoding)
}

#[async_trait]
impl<A> Link for LocalLink<A>
where
    A: 'static + Adapter,
    A::Error: Into<StorageError>,
{
    async fn call(&self, method: Method, params: Vec<Value>) -> BridgeResult<Value> {
        let adapter = &self.adapter;
        let mut p = Params::new(method, params);

        match method {
            Method::Create => {
                let (entity, data): (String, _) = (p.next()?, p.next()?);
                encode(adapter.create(&entity, data).await)
            }
            Method::Read => {
                let (entity, id): (String, String) = (p.next()?, p.next()?);
                encode(adapter.read(&entity, &id).await)
            }
            Method::Update => {
                let (entity, id, data): (String, String, _) = (p.next()?, p.next()?, p.next()?);
                encode(adapter.update(&entity, &id, data).await)
            }
            Method::Delete => {
                let (entity, id): (String, String) = (p.next()?, p.next()?);
                encode(adapter.delete(&entity, &id).await)
            }
            Method::List => {
                let (entity, options): (String, _) = (p.next()?, p.next()?);
                encode(adapter.list(&entity, options).await)
            }
            Method::FindFirst => {
                let (entity, filter): (String, _) = (p.next()?, p.next()?);
                encode(adapter.find_first(&entity, filter).await)
            }
            Method::FindByField => {
                let (entity, field, value): (String, String, _) =
                    (p.next()?, p.next()?, p.next()?);
                encode(adapter.find_by_field(&entity, &field, value).await)
            }
            Method::Upsert => {
                let (entity, unique_field, unique_value): (String, String, _) =
                    (p.next()?, p.next()?, p.next()?);
                let (create_data, update_data) = (p.next()?, p.next()?);
                encode(
                    adapter
                        .upsert(
                            &entity,
                            &unique_field,
                            unique_value,
                            create_data,
                            update_data,
                        )
                        .await,
                )
            }
            Method::UpdateByField => {
                let (entity, field, value, data): (String, String, _, _) =
                    (p.next()?, p.next()?, p.next()?, p.next()?);
                encode(adapter.update_by_field(&entity, &field, value, data).await)
            }
            Method::DeleteByField => {
                let (entity, field, value): (String, String, _) =
                    (p.next()?, p.next()?, p.next()?);
                encode(adapter.delete_by_field(&entity, &field, value).await)
            }
            Method::CreateMany => {
                let (entity, data): (String, _) = (p.next()?, p.next()?);
                encode(adapter.create_many(&entity, data).await)
            }
            Method::UpdateMany => {
                let (entity, filter, data): (String, _, _) = (p.next()?, p.next()?, p.next()?);
                encode(adapter.update_many(&entity, filter, data).await)
            }
            Method::DeleteMany => {
                let (entity, filter): (String, _) = (p.next()?, p.next()?);
                encode(adapter.delete_many(&entity, filter).await)
            }
            Method::GetCapabilities => encode(adapter.get_capabilities().await),
            Method::Close => encode(adapter.close().await),
        }
    }

    async fn shutdown(&self) {}
}
