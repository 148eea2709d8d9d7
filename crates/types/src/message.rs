// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Messages flowing through the upsert pipeline: input events consumed from
//! the ingestion log, the per-key context the coordinator keeps durable, and
//! the tombstone/insert updates it emits towards segments.

use crate::{PrimaryKey, SegmentName, TableName};

/// One occurrence of a primary key: which segment holds the row, the source
/// offset that produced it, and the ingestion timestamp used for resolution.
///
/// Two contexts are equal iff all fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageContext {
    pub segment: SegmentName,
    pub source_offset: u64,
    pub timestamp: u64,
}

impl MessageContext {
    pub fn new(segment: impl Into<SegmentName>, source_offset: u64, timestamp: u64) -> Self {
        Self {
            segment: segment.into(),
            source_offset,
            timestamp,
        }
    }
}

/// Input event read from the ingestion log: a new occurrence of `key` in
/// `table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertEvent {
    pub table: TableName,
    pub key: PrimaryKey,
    pub context: MessageContext,
}

/// Which virtual column an update addresses.
///
/// `Insert` records the offset a row became visible at (`$validFrom`),
/// `Delete` the offset it was superseded at (`$validUntil`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UpdateKind {
    #[display("INSERT")]
    Insert,
    #[display("DELETE")]
    Delete,
}

impl UpdateKind {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            UpdateKind::Insert => 0,
            UpdateKind::Delete => 1,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(UpdateKind::Insert),
            1 => Some(UpdateKind::Delete),
            _ => None,
        }
    }
}

/// Update emitted by the coordinator towards the query side.
///
/// `target_offset` addresses the row inside `segment` through the source
/// offset that produced it; `value` is the supersession marker to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentUpdate {
    pub table: TableName,
    pub segment: SegmentName,
    pub target_offset: u64,
    pub value: u64,
    pub kind: UpdateKind,
}

impl SegmentUpdate {
    /// Marks the row produced by `context` as live from its own offset.
    pub fn insert(table: TableName, context: &MessageContext) -> Self {
        Self {
            table,
            segment: context.segment.clone(),
            target_offset: context.source_offset,
            value: context.source_offset,
            kind: UpdateKind::Insert,
        }
    }

    /// Tombstones the row at `target_offset` in `segment`, recording the
    /// offset of the superseding occurrence as the marker value.
    pub fn tombstone(
        table: TableName,
        segment: SegmentName,
        target_offset: u64,
        superseded_by: u64,
    ) -> Self {
        Self {
            table,
            segment,
            target_offset,
            value: superseded_by,
            kind: UpdateKind::Delete,
        }
    }

    /// The durable update-log entry corresponding to this update.
    pub fn to_log_entry(&self) -> UpdateLogEntry {
        UpdateLogEntry {
            source_offset: self.target_offset,
            value: self.value,
            kind: self.kind,
        }
    }
}

/// Entry in a segment's durable update log, and the unit applied to virtual
/// columns on the query side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateLogEntry {
    pub source_offset: u64,
    pub value: u64,
    pub kind: UpdateKind,
}

impl UpdateLogEntry {
    pub fn new(source_offset: u64, value: u64, kind: UpdateKind) -> Self {
        Self {
            source_offset,
            value,
            kind,
        }
    }
}
