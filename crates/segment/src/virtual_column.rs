// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-place mutable virtual columns overlaid on a sealed segment.

use std::sync::atomic::{AtomicU64, Ordering};

use strata_types::UpdateKind;

pub const VALID_FROM_COLUMN: &str = "$validFrom";
pub const VALID_UNTIL_COLUMN: &str = "$validUntil";

/// One mutable u64 column of segment length, reacting to updates of a single
/// kind.
///
/// Updates must come from one writer per segment (callers serialize them);
/// readers may run concurrently. Values publish through a release store on
/// the presence bitmap, so a reader that observes the bit also observes the
/// value.
///
/// The update policy makes replay idempotent: an absent slot takes the value,
/// a present slot only moves monotonically (`Insert` keeps the minimum seen,
/// `Delete` the maximum), and `update` returns whether the column changed.
#[derive(Debug)]
pub struct VirtualColumn {
    name: String,
    kind: UpdateKind,
    values: Box<[AtomicU64]>,
    present: Bitmap,
}

impl VirtualColumn {
    pub fn new(name: impl Into<String>, kind: UpdateKind, total_docs: u32) -> Self {
        let values = (0..total_docs).map(|_| AtomicU64::new(0)).collect();
        Self {
            name: name.into(),
            kind,
            values,
            present: Bitmap::new(total_docs as usize),
        }
    }

    /// The `$validFrom` column: the offset a row became visible at.
    pub fn valid_from(total_docs: u32) -> Self {
        Self::new(VALID_FROM_COLUMN, UpdateKind::Insert, total_docs)
    }

    /// The `$validUntil` column: the offset a row was superseded at.
    pub fn valid_until(total_docs: u32) -> Self {
        Self::new(VALID_UNTIL_COLUMN, UpdateKind::Delete, total_docs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn total_docs(&self) -> u32 {
        self.values.len() as u32
    }

    /// Applies one update. Returns whether the column's state changed.
    pub fn update(&self, doc_id: u32, value: u64, kind: UpdateKind) -> bool {
        if kind != self.kind {
            return false;
        }
        let slot = &self.values[doc_id as usize];
        if !self.present.get(doc_id as usize) {
            slot.store(value, Ordering::Relaxed);
            self.present.set(doc_id as usize);
            return true;
        }
        let current = slot.load(Ordering::Relaxed);
        let changed = match self.kind {
            UpdateKind::Insert => value < current,
            UpdateKind::Delete => value > current,
        };
        if changed {
            slot.store(value, Ordering::Release);
        }
        changed
    }

    /// Current value at `doc_id`, or `None` if the row has never received an
    /// update of this column's kind.
    pub fn get(&self, doc_id: u32) -> Option<u64> {
        self.present
            .get(doc_id as usize)
            .then(|| self.values[doc_id as usize].load(Ordering::Relaxed))
    }
}

/// Presence bitmap with release/acquire publication.
#[derive(Debug)]
struct Bitmap {
    words: Box<[AtomicU64]>,
}

impl Bitmap {
    fn new(bits: usize) -> Self {
        Self {
            words: (0..bits.div_ceil(64)).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn get(&self, bit: usize) -> bool {
        self.words[bit / 64].load(Ordering::Acquire) & (1 << (bit % 64)) != 0
    }

    fn set(&self, bit: usize) {
        self.words[bit / 64].fetch_or(1 << (bit % 64), Ordering::Release);
    }
}
