// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The sealed segment specialization that accepts supersession updates.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tracing::{error, info};

use strata_types::{SegmentName, TableName, UpdateLogEntry};

use crate::column::ColumnIndexContainer;
use crate::error::{LookupError, SegmentOpenError};
use crate::metric_definitions::{SEGMENT_REPLAYED_ENTRIES, SEGMENT_UPDATES_APPLIED};
use crate::offset_index::OffsetIndex;
use crate::update_log::{UpdateLogError, UpdateLogStore};
use crate::virtual_column::VirtualColumn;
use crate::watermark::WatermarkManager;

/// Metadata a segment is constructed with.
#[derive(Debug, Clone)]
pub struct SegmentMetadata {
    pub table: TableName,
    pub name: SegmentName,
    pub total_docs: u32,
    /// Name of the column holding each row's source offset.
    pub offset_column: String,
    /// Whether the table schema enables upsert for this segment.
    pub upsert_enabled: bool,
}

/// A sealed segment extended with the upsert capability: offset→docId lookup,
/// in-place virtual-column updates and watermark advancement.
///
/// Base row reads and column indexes stay with the generic sealed segment;
/// this type only binds the upsert pieces on top of the registered indexes.
/// Callers must serialize updates per segment; different segments may be
/// updated concurrently.
#[derive(Debug)]
pub struct UpsertSegment {
    table: TableName,
    name: SegmentName,
    offset_index: OffsetIndex,
    writers: Vec<Arc<VirtualColumn>>,
    watermarks: Arc<WatermarkManager>,
    update_log: Arc<UpdateLogStore>,
}

impl UpsertSegment {
    /// Validates the metadata and binds the segment's indexes.
    ///
    /// Fails fast when the schema is not upsert-enabled, when the offset
    /// column is missing, or when its forward index does not expose a typed
    /// u64 reader. Historical updates are not applied here; call
    /// [`Self::init_virtual_columns`] afterwards.
    pub fn open(
        metadata: SegmentMetadata,
        columns: &HashMap<String, ColumnIndexContainer>,
        watermarks: Arc<WatermarkManager>,
        update_log: Arc<UpdateLogStore>,
    ) -> Result<Self, SegmentOpenError> {
        if !metadata.upsert_enabled {
            return Err(SegmentOpenError::SchemaNotUpsert(metadata.table));
        }

        let offset_container = columns.get(&metadata.offset_column).ok_or_else(|| {
            SegmentOpenError::MissingOffsetColumn {
                segment: metadata.name.clone(),
                column: metadata.offset_column.clone(),
            }
        })?;
        let offset_reader = offset_container.forward().as_u64_reader().ok_or_else(|| {
            SegmentOpenError::UnsupportedOffsetColumn {
                segment: metadata.name.clone(),
                column: metadata.offset_column.clone(),
            }
        })?;

        let offset_index =
            OffsetIndex::build(metadata.name.clone(), offset_reader, metadata.total_docs)?;

        let writers: Vec<_> = columns
            .values()
            .filter_map(|container| container.forward().as_virtual().cloned())
            .collect();

        Ok(Self {
            table: metadata.table,
            name: metadata.name,
            offset_index,
            writers,
            watermarks,
            update_log,
        })
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn name(&self) -> &SegmentName {
        &self.name
    }

    pub fn offset_index(&self) -> &OffsetIndex {
        &self.offset_index
    }

    /// Replays the durable update log into the virtual columns.
    ///
    /// Entries are grouped by source offset and applied in arrival order per
    /// populated row; only the last entry of an applied group is forwarded to
    /// the watermark registry, which is enough because watermarks are
    /// monotonic. Offsets without a row (holes in the segment) are dropped.
    pub async fn init_virtual_columns(&self) -> Result<(), UpdateLogError> {
        let start = Instant::now();
        let entries = self.update_log.scan(&self.table, &self.name).await?;

        let mut by_offset: HashMap<u64, Vec<UpdateLogEntry>> = HashMap::new();
        for entry in &entries {
            by_offset.entry(entry.source_offset).or_default().push(*entry);
        }

        for (offset, doc_id) in self.offset_index.iter_rows() {
            let Some(group) = by_offset.get(&offset) else {
                continue;
            };
            let mut updated = false;
            let mut last = None;
            for entry in group {
                updated |= self.apply_to_writers(doc_id, entry);
                last = Some(entry);
            }
            if updated {
                let last = last.expect("group is never empty");
                self.watermarks
                    .observe(&self.table, &self.name, last.source_offset);
            }
        }

        counter!(SEGMENT_REPLAYED_ENTRIES).increment(entries.len() as u64);
        info!(
            table = %self.table,
            segment = %self.name,
            "replayed {} update log entries in {:?}",
            entries.len(),
            start.elapsed()
        );
        Ok(())
    }

    /// Applies a batch of streamed updates.
    ///
    /// Entries are processed best-effort: a lookup failure is recorded and the
    /// remaining entries are still applied, then the first error is returned.
    pub fn apply_updates(&self, entries: &[UpdateLogEntry]) -> Result<(), LookupError> {
        let mut first_error = None;
        let mut applied = 0u64;
        for entry in entries {
            let doc_id = match self.offset_index.doc_id_of(entry.source_offset) {
                Ok(doc_id) => doc_id,
                Err(err) => {
                    error!(
                        table = %self.table,
                        segment = %self.name,
                        "cannot apply update: {err}"
                    );
                    first_error.get_or_insert(err);
                    continue;
                }
            };
            applied += 1;
            if self.apply_to_writers(doc_id, entry) {
                self.watermarks
                    .observe(&self.table, &self.name, entry.source_offset);
            }
        }
        counter!(SEGMENT_UPDATES_APPLIED).increment(applied);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Debug view of the virtual-column values recorded for `offset`.
    pub fn virtual_column_info(&self, offset: u64) -> Result<String, LookupError> {
        let doc_id = self.offset_index.doc_id_of(offset)?;
        let mut info = format!("doc {doc_id}:");
        for writer in &self.writers {
            match writer.get(doc_id) {
                Some(value) => write!(info, " {}={value}", writer.name()),
                None => write!(info, " {}=-", writer.name()),
            }
            .expect("writing to a string cannot fail");
        }
        Ok(info)
    }

    fn apply_to_writers(&self, doc_id: u32, entry: &UpdateLogEntry) -> bool {
        let mut updated = false;
        for writer in &self.writers {
            updated |= writer.update(doc_id, entry.value, entry.kind);
        }
        updated
    }
}
