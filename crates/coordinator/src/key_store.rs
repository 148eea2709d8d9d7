// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Durable key→context store on an embedded RocksDB, one column family per
//! table namespace.

use std::collections::HashMap;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, WriteBatch, WriteOptions};
use tracing::{debug, info};

use strata_types::config::KeyValueStoreOptions;
use strata_types::storage::CodecError;
use strata_types::{MessageContext, PrimaryKey, TableName};

type RawDb = rocksdb::DBWithThreadMode<rocksdb::MultiThreaded>;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("failed to open key-value store: {0}")]
    Open(rocksdb::Error),
    #[error("stored context is corrupt: {0}")]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Rocks(#[from] rocksdb::Error),
}

/// Embedded store of the current winning context per primary key.
///
/// `multi_put` is an atomic batch; once it returns, every subsequent
/// `multi_get` observes the written contexts. Tables map to column families
/// and are created on first use.
#[derive(Clone)]
pub struct KeyContextStore {
    db: Arc<RawDb>,
    sync_writes: bool,
}

impl KeyContextStore {
    pub fn open(options: &KeyValueStoreOptions) -> Result<Self, KvError> {
        let mut db_options = rocksdb::Options::default();
        db_options.create_if_missing(true);
        db_options.create_missing_column_families(true);

        // If listing fails the db does not exist yet and will be created with
        // just the default column family.
        let existing_cfs = RawDb::list_cf(&db_options, options.data_dir()).unwrap_or_else(|err| {
            debug!("could not list column families, assuming a fresh db: {err}");
            vec!["default".to_owned()]
        });

        let db = RawDb::open_cf(&db_options, options.data_dir(), existing_cfs)
            .map_err(KvError::Open)?;
        info!(
            data_dir = %options.data_dir().display(),
            "opened key-value store"
        );
        Ok(Self {
            db: Arc::new(db),
            sync_writes: options.sync_writes(),
        })
    }

    /// Namespaced handle for one table, creating its column family on first
    /// use.
    pub fn table(&self, table: &TableName) -> Result<KeyContextTable<'_>, KvError> {
        if self.db.cf_handle(table.as_str()).is_none() {
            self.db
                .create_cf(table.as_str(), &rocksdb::Options::default())?;
            debug!(table = %table, "created key-context column family");
        }
        let cf = self
            .db
            .cf_handle(table.as_str())
            .expect("column family was just created");
        Ok(KeyContextTable {
            store: self,
            cf,
        })
    }
}

/// Handle on one table's key→context mapping.
pub struct KeyContextTable<'a> {
    store: &'a KeyContextStore,
    cf: Arc<BoundColumnFamily<'a>>,
}

impl KeyContextTable<'_> {
    /// Fetches the stored context of every given key; absent keys are
    /// omitted from the result.
    pub fn multi_get<'k>(
        &self,
        keys: impl IntoIterator<Item = &'k PrimaryKey>,
    ) -> Result<HashMap<PrimaryKey, MessageContext>, KvError> {
        let keys: Vec<_> = keys.into_iter().collect();
        let values = self
            .store
            .db
            .batched_multi_get_cf(&self.cf, keys.iter().map(|k| k.as_bytes()), false);

        let mut contexts = HashMap::with_capacity(keys.len());
        for (key, value) in keys.into_iter().zip(values) {
            if let Some(slice) = value? {
                contexts.insert(key.clone(), MessageContext::from_slice(&slice)?);
            }
        }
        Ok(contexts)
    }

    /// Writes all entries as one atomic batch and waits until it is durable.
    pub fn multi_put(
        &self,
        entries: &HashMap<PrimaryKey, MessageContext>,
    ) -> Result<(), KvError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();
        for (key, context) in entries {
            batch.put_cf(&self.cf, key.as_bytes(), context.to_bytes());
        }
        let mut write_options = WriteOptions::default();
        write_options.set_sync(self.store.sync_writes);
        self.store.db.write_opt(batch, &write_options)?;
        Ok(())
    }
}
