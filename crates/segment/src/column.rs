// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Column reader capabilities exposed to the upsert machinery.
//!
//! Segment file formats and their readers live elsewhere; this crate only
//! requires a typed read capability on the offset column and recognizes
//! mutable virtual columns among the registered forward indexes.

use std::sync::Arc;

use crate::virtual_column::VirtualColumn;

/// Typed read access to a single-value u64 column.
pub trait U64ColumnReader: Send + Sync {
    fn get_u64(&self, doc_id: u32) -> u64;
}

/// Forward index of one column as registered with a segment.
#[derive(Clone)]
pub enum ForwardIndex {
    /// Sealed, read-only column.
    Immutable(Arc<dyn U64ColumnReader>),
    /// In-place mutable virtual column.
    Virtual(Arc<VirtualColumn>),
}

impl ForwardIndex {
    pub fn as_u64_reader(&self) -> Option<&dyn U64ColumnReader> {
        match self {
            ForwardIndex::Immutable(reader) => Some(reader.as_ref()),
            ForwardIndex::Virtual(_) => None,
        }
    }

    pub fn as_virtual(&self) -> Option<&Arc<VirtualColumn>> {
        match self {
            ForwardIndex::Virtual(column) => Some(column),
            ForwardIndex::Immutable(_) => None,
        }
    }
}

/// Indexes of one column, keyed by column name in the segment's container map.
#[derive(Clone)]
pub struct ColumnIndexContainer {
    forward: ForwardIndex,
}

impl ColumnIndexContainer {
    pub fn new(forward: ForwardIndex) -> Self {
        Self { forward }
    }

    pub fn immutable(reader: Arc<dyn U64ColumnReader>) -> Self {
        Self::new(ForwardIndex::Immutable(reader))
    }

    pub fn virtual_column(column: Arc<VirtualColumn>) -> Self {
        Self::new(ForwardIndex::Virtual(column))
    }

    pub fn forward(&self) -> &ForwardIndex {
        &self.forward
    }
}

/// Array-backed reader for columns that are already materialized in memory.
pub struct ArrayColumnReader(Box<[u64]>);

impl ArrayColumnReader {
    pub fn new(values: impl Into<Box<[u64]>>) -> Self {
        Self(values.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl U64ColumnReader for ArrayColumnReader {
    fn get_u64(&self, doc_id: u32) -> u64 {
        self.0[doc_id as usize]
    }
}
