// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{error::CloudStatus, gateway::ObjectStore};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;
type MemoryCloudInner = RwLock<Buckets>;

/// Mock in-memory object store
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Default)]
pub struct MemoryCloud {
    buckets: Arc<MemoryCloudInner>,
    fail_puts: Arc<AtomicBool>,
}

impl MemoryCloud {
    /// Makes every following `put` fail, for failure-path tests.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::Relaxed);
    }

    /// Number of objects across all buckets.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.buckets
            .read()
            .expect("lock is poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Returns the stored body of an object.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .expect("lock is poisoned")
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
    }
}

impl ObjectStore for MemoryCloud {
    fn get(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<(), CloudStatus> {
        let buckets = self.buckets.read().expect("lock is poisoned");

        let body = buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .ok_or_else(|| CloudStatus("NoSuchKey".into()))?;

        sink.write_all(body)
            .map_err(|e| CloudStatus(e.to_string()))?;

        Ok(())
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        length: u64,
        source: &mut dyn Read,
    ) -> Result<(), CloudStatus> {
        if self.fail_puts.load(Ordering::Relaxed) {
            return Err(CloudStatus("InternalError".into()));
        }

        let mut body = Vec::with_capacity(length as usize);
        let read = source
            .take(length)
            .read_to_end(&mut body)
            .map_err(|e| CloudStatus(e.to_string()))?;

        if read as u64 != length {
            return Err(CloudStatus("IncompleteBody".into()));
        }

        let mut buckets = self.buckets.write().expect("lock is poisoned");
        let bucket = buckets
            .get_mut(bucket)
            .ok_or_else(|| CloudStatus("NoSuchBucket".into()))?;

        bucket.insert(key.into(), body);

        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<(), CloudStatus> {
        let mut buckets = self.buckets.write().expect("lock is poisoned");

        buckets
            .get_mut(bucket)
            .and_then(|b| b.remove(key))
            .map(|_| ())
            .ok_or_else(|| CloudStatus("NoSuchKey".into()))
    }

    fn list_buckets(&self) -> Result<Vec<String>, CloudStatus> {
        Ok(self
            .buckets
            .read()
            .expect("lock is poisoned")
            .keys()
            .cloned()
            .collect())
    }

    fn create_bucket(&self, name: &str) -> Result<(), CloudStatus> {
        self.buckets
            .write()
            .expect("lock is poisoned")
            .entry(name.into())
            .or_default();

        Ok(())
    }
}
