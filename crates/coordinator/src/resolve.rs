// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Conflict resolution between two occurrences of the same primary key.

use strata_types::MessageContext;

/// Decides which of two contexts for the same primary key wins.
///
/// Implementations must be deterministic, antisymmetric (never true in both
/// directions) and return `false` for equal contexts. Anything weaker makes
/// the coordinator emit contradictory tombstones.
pub trait ResolveStrategy: Send + Sync + 'static {
    /// Returns `true` when `incoming` supersedes `current`, i.e. the row
    /// described by `current` should be tombstoned.
    fn should_supersede(&self, current: &MessageContext, incoming: &MessageContext) -> bool;
}

/// Default strategy: newer wins, ordered by timestamp and then source offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampOffsetResolver;

impl ResolveStrategy for TimestampOffsetResolver {
    fn should_supersede(&self, current: &MessageContext, incoming: &MessageContext) -> bool {
        (incoming.timestamp, incoming.source_offset)
            > (current.timestamp, current.source_offset)
    }
}
