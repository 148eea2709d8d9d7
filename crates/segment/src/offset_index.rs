// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Dense mapping from source-log offsets to local row ids.

use tracing::warn;

use strata_types::SegmentName;

use crate::column::U64ColumnReader;
use crate::error::{LookupError, SegmentOpenError};

const EMPTY_SLOT: i32 = -1;

/// Dense offset→docId index over one sealed segment.
///
/// Source offsets are near-dense within a segment, so a flat array with one
/// i32 per offset beats a hash map on both memory and cache locality; the
/// holes cost one slot each. Built once at open, read-only afterwards.
#[derive(Debug)]
pub struct OffsetIndex {
    segment: SegmentName,
    min_offset: u64,
    slots: Box<[i32]>,
}

impl OffsetIndex {
    /// Builds the index by scanning the segment's offset column once.
    pub fn build(
        segment: SegmentName,
        reader: &dyn U64ColumnReader,
        total_docs: u32,
    ) -> Result<Self, SegmentOpenError> {
        if total_docs == 0 {
            return Ok(Self {
                segment,
                min_offset: 0,
                slots: Box::default(),
            });
        }

        let mut rows = Vec::with_capacity(total_docs as usize);
        let mut min_offset = u64::MAX;
        let mut max_offset = 0u64;
        for doc_id in 0..total_docs {
            let offset = reader.get_u64(doc_id);
            min_offset = min_offset.min(offset);
            max_offset = max_offset.max(offset);
            rows.push((offset, doc_id));
        }

        let len = max_offset - min_offset + 1;
        if len > i32::MAX as u64 || total_docs > i32::MAX as u32 {
            return Err(SegmentOpenError::OffsetRangeTooWide {
                segment,
                min: min_offset,
                max: max_offset,
            });
        }

        let mut slots = vec![EMPTY_SLOT; len as usize].into_boxed_slice();
        for (offset, doc_id) in rows {
            let slot = &mut slots[(offset - min_offset) as usize];
            if *slot != EMPTY_SLOT {
                warn!(
                    segment = %segment,
                    offset,
                    "duplicate source offset, keeping the later row {doc_id}"
                );
            }
            *slot = doc_id as i32;
        }

        Ok(Self {
            segment,
            min_offset,
            slots,
        })
    }

    /// Local row id of the row produced at `offset`.
    pub fn doc_id_of(&self, offset: u64) -> Result<u32, LookupError> {
        if offset < self.min_offset || offset - self.min_offset >= self.slots.len() as u64 {
            return Err(LookupError::OutOfRange {
                segment: self.segment.clone(),
                offset,
            });
        }
        match self.slots[(offset - self.min_offset) as usize] {
            EMPTY_SLOT => Err(LookupError::NotFound {
                segment: self.segment.clone(),
                offset,
            }),
            doc_id => Ok(doc_id as u32),
        }
    }

    pub fn min_offset(&self) -> u64 {
        self.min_offset
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterates the populated slots as `(offset, doc_id)`, in offset order.
    pub fn iter_rows(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, slot)| {
            (*slot != EMPTY_SLOT).then(|| (self.min_offset + i as u64, *slot as u32))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ArrayColumnReader;

    fn index_over(offsets: &[u64]) -> OffsetIndex {
        let reader = ArrayColumnReader::new(offsets.to_vec());
        OffsetIndex::build(SegmentName::from("t__0__1__x"), &reader, offsets.len() as u32).unwrap()
    }

    #[test]
    fn every_row_resolves_to_itself() {
        let offsets = [100, 102, 105, 103];
        let index = index_over(&offsets);
        for (doc_id, offset) in offsets.iter().enumerate() {
            assert_eq!(index.doc_id_of(*offset), Ok(doc_id as u32));
        }
        assert_eq!(index.min_offset(), 100);
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn lookup_failures() {
        let index = index_over(&[100, 102, 105]);
        assert!(matches!(
            index.doc_id_of(99),
            Err(LookupError::OutOfRange { offset: 99, .. })
        ));
        assert!(matches!(
            index.doc_id_of(106),
            Err(LookupError::OutOfRange { offset: 106, .. })
        ));
        assert!(matches!(
            index.doc_id_of(101),
            Err(LookupError::NotFound { offset: 101, .. })
        ));
    }

    #[test]
    fn empty_segment_has_no_rows() {
        let index = index_over(&[]);
        assert!(index.is_empty());
        assert!(index.doc_id_of(0).is_err());
        assert_eq!(index.iter_rows().count(), 0);
    }

    #[test]
    fn iterates_rows_in_offset_order() {
        let index = index_over(&[105, 100, 102]);
        let rows: Vec<_> = index.iter_rows().collect();
        assert_eq!(rows, vec![(100, 1), (102, 2), (105, 0)]);
    }
}
