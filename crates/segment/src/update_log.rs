// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Durable append-only log of update entries, one file per (table, segment).

use std::path::PathBuf;

use bytes::BytesMut;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use strata_types::config::UpdateLogOptions;
use strata_types::storage::CodecError;
use strata_types::{SegmentName, TableName, UpdateLogEntry};

#[derive(Debug, thiserror::Error)]
pub enum UpdateLogError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt update log record: {0}")]
    Codec(#[from] CodecError),
}

/// Per-(table, segment) append log of update events.
///
/// Writes are visible to subsequent scans. Entries are fixed width; there is
/// no ordering guarantee within one source offset, which is absorbed by the
/// idempotent virtual-column update policy.
#[derive(Debug)]
pub struct UpdateLogStore {
    root: PathBuf,
}

impl UpdateLogStore {
    pub fn new(options: &UpdateLogOptions) -> Self {
        Self {
            root: options.data_dir().clone(),
        }
    }

    fn segment_path(&self, table: &TableName, segment: &SegmentName) -> PathBuf {
        self.root
            .join(table.as_str())
            .join(format!("{}.ulog", segment.as_str()))
    }

    /// Appends a batch of entries and syncs them to disk.
    pub async fn append(
        &self,
        table: &TableName,
        segment: &SegmentName,
        entries: &[UpdateLogEntry],
    ) -> Result<(), UpdateLogError> {
        if entries.is_empty() {
            return Ok(());
        }
        let path = self.segment_path(table, segment);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut buf = BytesMut::with_capacity(entries.len() * UpdateLogEntry::ENCODED_LEN);
        for entry in entries {
            entry.encode(&mut buf);
        }

        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        file.write_all(&buf).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Reads back every entry appended for `(table, segment)`, in append
    /// order.
    ///
    /// A torn trailing record (crash mid-append) is dropped with a warning
    /// rather than failing the scan; everything before it is intact because
    /// records are fixed width.
    pub async fn scan(
        &self,
        table: &TableName,
        segment: &SegmentName,
    ) -> Result<Vec<UpdateLogEntry>, UpdateLogError> {
        let path = self.segment_path(table, segment);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(table = %table, segment = %segment, "no update log on disk yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let complete = bytes.len() - bytes.len() % UpdateLogEntry::ENCODED_LEN;
        if complete != bytes.len() {
            warn!(
                table = %table,
                segment = %segment,
                "dropping {} trailing bytes of a torn update-log record",
                bytes.len() - complete
            );
        }

        let mut entries = Vec::with_capacity(complete / UpdateLogEntry::ENCODED_LEN);
        let mut slice = &bytes[..complete];
        while !slice.is_empty() {
            entries.push(UpdateLogEntry::decode(&mut slice)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use strata_types::config::UpdateLogOptionsBuilder;
    use strata_types::UpdateKind;
    use tempfile::tempdir;

    fn store_at(dir: &std::path::Path) -> UpdateLogStore {
        let options = UpdateLogOptionsBuilder::default()
            .data_dir(dir.to_path_buf())
            .build()
            .unwrap();
        UpdateLogStore::new(&options)
    }

    #[tokio::test]
    async fn append_then_scan() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        let table = TableName::from("orders");
        let segment = SegmentName::from("orders__0__1__x");

        let first = vec![
            UpdateLogEntry::new(100, 100, UpdateKind::Insert),
            UpdateLogEntry::new(100, 110, UpdateKind::Delete),
        ];
        let second = vec![UpdateLogEntry::new(102, 102, UpdateKind::Insert)];
        store.append(&table, &segment, &first).await.unwrap();
        store.append(&table, &segment, &second).await.unwrap();

        let scanned = store.scan(&table, &segment).await.unwrap();
        assert_eq!(scanned, [first, second].concat());
    }

    #[tokio::test]
    async fn missing_log_scans_empty() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        let entries = store
            .scan(&TableName::from("t"), &SegmentName::from("t__0__1__x"))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        let table = TableName::from("t");
        let segment = SegmentName::from("t__0__1__x");

        let entry = UpdateLogEntry::new(7, 7, UpdateKind::Insert);
        store.append(&table, &segment, &[entry]).await.unwrap();

        // Simulate a crash mid-append.
        let path = store.segment_path(&table, &segment);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe]);
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(store.scan(&table, &segment).await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn logs_are_isolated_per_segment() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        let table = TableName::from("t");
        let s1 = SegmentName::from("t__0__1__x");
        let s2 = SegmentName::from("t__1__1__x");

        store
            .append(&table, &s1, &[UpdateLogEntry::new(1, 1, UpdateKind::Insert)])
            .await
            .unwrap();
        assert!(store.scan(&table, &s2).await.unwrap().is_empty());
    }
}
