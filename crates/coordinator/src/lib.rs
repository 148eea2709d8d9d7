// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The key coordinator: a log-driven service deciding, per primary key, which
//! occurrence of a row is live.
//!
//! Upsert events are pulled from the input log into a bounded hand-off queue,
//! drained into size/time-bounded batches, resolved against the durable
//! key→context store, and turned into tombstone/insert updates on the output
//! log, partitioned by destination segment. Input offsets are only committed
//! once a batch's updates are acknowledged and the store has advanced, so a
//! crash replays uncommitted work against idempotent segment updates.

mod consumer;
mod error;
mod key_store;
mod metric_definitions;
mod output;
mod processor;
mod resolve;
mod service;

pub mod log_client;

#[cfg(test)]
mod tests;

pub use error::BatchError;
pub use key_store::{KeyContextStore, KeyContextTable, KvError};
pub use metric_definitions::describe_metrics;
pub use resolve::{ResolveStrategy, TimestampOffsetResolver};
pub use service::{InvalidStateError, KeyCoordinator, State};
