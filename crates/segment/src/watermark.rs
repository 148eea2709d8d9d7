// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Registry of the highest applied source offset per (table, segment).

use std::collections::HashMap;

use dashmap::DashMap;
use metrics::gauge;

use strata_types::{SegmentName, TableName};

use crate::metric_definitions::SEGMENT_WATERMARK;

/// Process-wide watermark registry.
///
/// One segment can receive concurrent updates from different dispatchers, so
/// slots live in a concurrent map. Watermarks only move forward; there is no
/// eviction. Inject it as an explicit collaborator rather than reaching for a
/// global, so tests can substitute their own instance.
#[derive(Debug, Default)]
pub struct WatermarkManager {
    watermarks: DashMap<(TableName, SegmentName), u64>,
}

impl WatermarkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the update produced at `source_offset` has been applied
    /// to `segment`. The slot moves to `max(current, source_offset)`.
    pub fn observe(&self, table: &TableName, segment: &SegmentName, source_offset: u64) {
        let mut slot = self
            .watermarks
            .entry((table.clone(), segment.clone()))
            .or_insert(source_offset);
        if *slot < source_offset {
            *slot = source_offset;
        }
        let watermark = *slot;
        drop(slot);
        gauge!(
            SEGMENT_WATERMARK,
            "table" => table.to_string(),
            "segment" => segment.to_string()
        )
        .set(watermark as f64);
    }

    pub fn watermark(&self, table: &TableName, segment: &SegmentName) -> Option<u64> {
        self.watermarks
            .get(&(table.clone(), segment.clone()))
            .map(|slot| *slot)
    }

    /// Point-in-time copy of all watermarks, for observability endpoints.
    pub fn snapshot(&self) -> HashMap<(TableName, SegmentName), u64> {
        self.watermarks
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}
