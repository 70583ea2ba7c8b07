use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{AdapterCapabilities, ListOptions, ListResult, Record};

/// The generic storage adapter contract.
///
/// Consumers written against this trait do not care whether records live in process or behind a
/// remote daemon.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The error returned by every operation.
    type Error: 'static + std::error::Error + Send + Sync;

    /// Creates a record.
    async fn create(&self, entity: &str, data: Record) -> Result<Value, Self::Error>;

    /// Reads a record by id.
    async fn read(&self, entity: &str, id: &str) -> Result<Option<Value>, Self::Error>;

    /// Merges `data` into an existing record.
    async fn update(&self, entity: &str, id: &str, data: Record) -> Result<Value, Self::Error>;

    /// Deletes a record by id, returns whether a record was deleted.
    async fn delete(&self, entity: &str, id: &str) -> Result<bool, Self::Error>;

    /// Lists a page of records.
    async fn list(
        &self,
        entity: &str,
        options: Option<ListOptions>,
    ) -> Result<ListResult, Self::Error>;

    /// Returns the first record matching `filter`.
    async fn find_first(
        &self,
        entity: &str,
        filter: Option<Record>,
    ) -> Result<Option<Value>, Self::Error>;

    /// Returns the first record whose `field` equals `value`.
    async fn find_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
    ) -> Result<Option<Value>, Self::Error>;

    /// Updates the record whose `unique_field` equals `unique_value`, or creates it.
    async fn upsert(
        &self,
        entity: &str,
        unique_field: &str,
        unique_value: Value,
        create_data: Record,
        update_data: Record,
    ) -> Result<Value, Self::Error>;

    /// Merges `data` into the first record whose `field` equals `value`.
    async fn update_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
        data: Record,
    ) -> Result<Value, Self::Error>;

    /// Deletes the first record whose `field` equals `value`.
    async fn delete_by_field(
        &self,
        entity: &str,
        field: &str,
        value: Value,
    ) -> Result<bool, Self::Error>;

    /// Creates records in bulk, returns the number created.
    async fn create_many(&self, entity: &str, data: Vec<Record>) -> Result<u64, Self::Error>;

    /// Merges `data` into every record matching `filter`, returns the number updated.
    async fn update_many(
        &self,
        entity: &str,
        filter: Record,
        data: Record,
    ) -> Result<u64, Self::Error>;

    /// Deletes every record matching `filter`, returns the number deleted.
    async fn delete_many(&self, entity: &str, filter: Option<Record>) -> Result<u64, Self::Error>;

    /// Returns the features supported by this adapter.
    async fn get_capabilities(&self) -> Result<AdapterCapabilities, Self::Error>;

    /// Releases the adapter.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// The name of an adapter operation, as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum Method {
    Create,
    Read,
    Update,
    Delete,
    List,
    FindFirst,
    FindByField,
    Upsert,
    UpdateByField,
    DeleteByField,
    CreateMany,
    UpdateMany,
    DeleteMany,
    GetCapabilities,
    Close,
}

impl Method {
    /// Every operation of the adapter contract.
    pub const ALL: [Method; 15] = [
        Method::Create,
        Method::Read,
        Method::Update,
        Method::Delete,
        Method::List,
        Method::FindFirst,
        Method::FindByField,
        Method::Upsert,
        Method::UpdateByField,
        Method::DeleteByField,
        Method::CreateMany,
        Method::UpdateMany,
        Method::DeleteMany,
        Method::GetCapabilities,
        Method::Close,
    ];

    /// Returns the wire name of this method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::FindFirst => "findFirst",
            Self::FindByField => "findByField",
            Self::Upsert => "upsert",
            Self::UpdateByField => "updateByField",
            Self::DeleteByField => "deleteByField",
            Self::CreateMany => "createMany",
            Self::UpdateMany => "updateMany",
            Self::DeleteMany => "deleteMany",
            Self::GetCapabilities => "getCapabilities",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing a method name that is not part of the contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown method: {0}")]
pub struct UnknownMethod(pub String);

impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_match_serde() {
        for method in Method::ALL {
            let encoded = serde_json::to_value(method).unwrap();
            assert_eq!(encoded, Value::String(method.as_str().to_string()));
            assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert_eq!(
            "dropTable".parse::<Method>(),
            Err(UnknownMethod("dropTable".to_string()))
        );
    }
}
