// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::error::CloudStatus;
use std::io::{Read, Write};

/// External object store trait
///
/// The engine stores segments as `(bucket, key)` blobs through this seam;
/// the host supplies the real client. All operations are synchronous.
pub trait ObjectStore {
    /// Streams an object into `sink`.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the store's status if the operation fails.
    fn get(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<(), CloudStatus>;

    /// Stores an object. `length` is authoritative: `source` supplies
    /// exactly that many bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the store's status if the operation fails.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        length: u64,
        source: &mut dyn Read,
    ) -> Result<(), CloudStatus>;

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the store's status if the operation fails.
    fn delete(&self, bucket: &str, key: &str) -> Result<(), CloudStatus>;

    /// Lists all bucket names.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the store's status if the operation fails.
    fn list_buckets(&self) -> Result<Vec<String>, CloudStatus>;

    /// Creates a bucket.
    ///
    /// # Errors
    ///
    /// Will return `Err` with the store's status if the operation fails.
    fn create_bucket(&self, name: &str) -> Result<(), CloudStatus>;
}

/// Thin typed facade over the object store.
///
/// Maps every non-OK status to [`crate::Error::Cloud`], so errno mapping
/// happens in exactly one place at the host boundary.
pub(crate) struct CloudGateway<S: ObjectStore> {
    store: S,
}

impl<S: ObjectStore> CloudGateway<S> {
    pub(crate) fn new(store: S) -> Self {
        Self { store }
    }

    pub(crate) fn get<W: Write>(&self, bucket: &str, key: &str, sink: &mut W) -> crate::Result<()> {
        log::trace!("cloud get {bucket}/{key}");
        self.store.get(bucket, key, sink).map_err(crate::Error::Cloud)
    }

    pub(crate) fn put<R: Read>(
        &self,
        bucket: &str,
        key: &str,
        length: u64,
        source: &mut R,
    ) -> crate::Result<()> {
        log::trace!("cloud put {bucket}/{key}, {length} bytes");
        self.store
            .put(bucket, key, length, source)
            .map_err(crate::Error::Cloud)
    }

    pub(crate) fn delete(&self, bucket: &str, key: &str) -> crate::Result<()> {
        log::trace!("cloud delete {bucket}/{key}");
        self.store.delete(bucket, key).map_err(crate::Error::Cloud)
    }

    pub(crate) fn bucket_exists(&self, name: &str) -> crate::Result<bool> {
        let buckets = self.store.list_buckets().map_err(crate::Error::Cloud)?;
        Ok(buckets.iter().any(|b| b == name))
    }

    /// Creates the bucket if it does not exist yet.
    pub(crate) fn ensure_bucket(&self, name: &str) -> crate::Result<()> {
        if !self.bucket_exists(name)? {
            log::debug!("creating bucket {name}");
            self.store.create_bucket(name).map_err(crate::Error::Cloud)?;
        }
        Ok(())
    }
}
