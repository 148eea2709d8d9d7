// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use strata_types::InvalidSegmentName;

use crate::key_store::KvError;

/// Failure of one processing batch.
///
/// All of these are transient from the loop's point of view: the batch is
/// abandoned before the input offsets are committed, so the records are
/// re-read and reprocessed. Idempotent segment updates make that safe.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("key-value store failure: {0}")]
    KeyValueStore(#[from] KvError),
    #[error("{failed} of {total} output updates were not acknowledged within the deadline")]
    OutputLog { failed: usize, total: usize },
    #[error("cannot route update to an output partition: {0}")]
    Routing(#[from] InvalidSegmentName),
}
