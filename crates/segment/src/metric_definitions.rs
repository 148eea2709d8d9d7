// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use metrics::{describe_counter, describe_gauge, Unit};

pub(crate) const SEGMENT_UPDATES_APPLIED: &str = "strata.segment.updates_applied.total";
pub(crate) const SEGMENT_REPLAYED_ENTRIES: &str = "strata.segment.replayed_entries.total";
pub(crate) const SEGMENT_WATERMARK: &str = "strata.segment.watermark";

pub fn describe_metrics() {
    describe_counter!(
        SEGMENT_UPDATES_APPLIED,
        Unit::Count,
        "Number of streamed update entries applied to virtual columns"
    );
    describe_counter!(
        SEGMENT_REPLAYED_ENTRIES,
        Unit::Count,
        "Number of update-log entries replayed at segment load"
    );
    describe_gauge!(
        SEGMENT_WATERMARK,
        Unit::Count,
        "Highest applied source offset per (table, segment)"
    );
}
