//! Typed per-namespace handle over a [`DataService`].

use std::marker::PhantomData;

use serde::{de::DeserializeOwned, Serialize};

use crate::cache::Filters;
use crate::data::cancel::Fetch;
use crate::data::service::{DataService, MutationOptions, QueryOptions};
use crate::error::DataResult;

/// Rows of one namespace decoded as `T`.
pub struct Table<'a, T> {
    service: &'a DataService,
    namespace: String,
    _row: PhantomData<fn() -> T>,
}

impl<'a, T> Table<'a, T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub(crate) fn new(service: &'a DataService, namespace: String) -> Self {
        Self {
            service,
            namespace,
            _row: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub async fn query(
        &self,
        filters: Option<Filters>,
        options: &QueryOptions,
    ) -> DataResult<Vec<T>> {
        self.service.query(&self.namespace, filters, options).await
    }

    pub async fn query_latest(
        &self,
        filters: Option<Filters>,
        options: &QueryOptions,
    ) -> DataResult<Fetch<Vec<T>>> {
        self.service.query_latest(&self.namespace, filters, options).await
    }

    pub async fn get(&self, id: &str, options: &QueryOptions) -> DataResult<Option<T>> {
        self.service.get_by_id(&self.namespace, id, options).await
    }

    pub async fn insert(&self, record: &T) -> DataResult<T> {
        self.service
            .insert(&self.namespace, record, MutationOptions::default())
            .await
    }

    pub async fn update<P: Serialize + ?Sized>(&self, id: &str, patch: &P) -> DataResult<T> {
        self.service
            .update(&self.namespace, id, patch, MutationOptions::default())
            .await
    }

    pub async fn delete(&self, id: &str) -> DataResult<()> {
        self.service
            .delete(&self.namespace, id, MutationOptions::default())
            .await
    }

    pub async fn upsert(&self, record: &T) -> DataResult<T> {
        self.service
            .upsert(&self.namespace, record, MutationOptions::default())
            .await
    }
}

impl<T> std::fmt::Debug for Table<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("namespace", &self.namespace)
            .finish()
    }
}
