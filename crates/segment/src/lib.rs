// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Query-side upsert machinery for sealed columnar segments.
//!
//! A sealed segment is immutable except for a small set of virtual columns
//! recording supersession markers. This crate provides the pieces that keep
//! those markers current: the dense offset→docId index, the in-place virtual
//! column writers, the per-segment watermark registry, the durable update
//! log, and the [`UpsertSegment`] that binds them together.

mod column;
mod error;
mod metric_definitions;
mod offset_index;
mod update_log;
mod upsert_segment;
mod virtual_column;
mod watermark;

pub use column::{ArrayColumnReader, ColumnIndexContainer, ForwardIndex, U64ColumnReader};
pub use error::{LookupError, SegmentOpenError};
pub use metric_definitions::describe_metrics;
pub use offset_index::OffsetIndex;
pub use update_log::{UpdateLogError, UpdateLogStore};
pub use upsert_segment::{SegmentMetadata, UpsertSegment};
pub use virtual_column::{VirtualColumn, VALID_FROM_COLUMN, VALID_UNTIL_COLUMN};
pub use watermark::WatermarkManager;
