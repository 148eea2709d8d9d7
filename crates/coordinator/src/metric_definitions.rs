// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{describe_counter, describe_histogram, Unit};

pub(crate) const COORDINATOR_MESSAGES: &str = "strata.coordinator.messages.total";
pub(crate) const COORDINATOR_BATCHES: &str = "strata.coordinator.batches.total";
pub(crate) const COORDINATOR_BATCH_ABORTS: &str = "strata.coordinator.batch_aborts.total";
pub(crate) const COORDINATOR_DELETES_EMITTED: &str = "strata.coordinator.deletes_emitted.total";
pub(crate) const COORDINATOR_DUPLICATES: &str = "strata.coordinator.duplicate_inputs.total";
pub(crate) const COORDINATOR_BATCH_DURATION: &str = "strata.coordinator.batch_duration.seconds";

pub fn describe_metrics() {
    describe_counter!(
        COORDINATOR_MESSAGES,
        Unit::Count,
        "Number of input events processed"
    );
    describe_counter!(
        COORDINATOR_BATCHES,
        Unit::Count,
        "Number of batches committed"
    );
    describe_counter!(
        COORDINATOR_BATCH_ABORTS,
        Unit::Count,
        "Number of batches abandoned before the offset commit"
    );
    describe_counter!(
        COORDINATOR_DELETES_EMITTED,
        Unit::Count,
        "Number of tombstone updates emitted"
    );
    describe_counter!(
        COORDINATOR_DUPLICATES,
        Unit::Count,
        "Number of input events skipped as duplicates"
    );
    describe_histogram!(
        COORDINATOR_BATCH_DURATION,
        Unit::Seconds,
        "Wall-clock duration of one committed batch"
    );
}
