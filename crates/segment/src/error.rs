// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use strata_types::{SegmentName, TableName};

/// Row lookup failures raised by the offset index.
///
/// An offset delivered to a segment must address a row it holds, so these are
/// fatal for the update that carried the offset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("offset {offset} is outside the range of segment {segment}")]
    OutOfRange { segment: SegmentName, offset: u64 },
    #[error("no row with offset {offset} in segment {segment}")]
    NotFound { segment: SegmentName, offset: u64 },
}

/// Construction-time failures. Fatal; the segment refuses to open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SegmentOpenError {
    #[error("schema of table {0} is not upsert-enabled")]
    SchemaNotUpsert(TableName),
    #[error("segment {segment} has no index for offset column {column}")]
    MissingOffsetColumn {
        segment: SegmentName,
        column: String,
    },
    #[error("offset column {column} of segment {segment} does not expose a u64 forward reader")]
    UnsupportedOffsetColumn {
        segment: SegmentName,
        column: String,
    },
    #[error("offset range {min}..={max} of segment {segment} is too wide for a dense index")]
    OffsetRangeTooWide {
        segment: SegmentName,
        min: u64,
        max: u64,
    },
}
