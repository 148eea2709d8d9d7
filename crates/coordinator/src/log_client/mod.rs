// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Contracts towards the partitioned input and output logs.
//!
//! Broker-backed clients are external; the coordinator only relies on the
//! traits below. An in-memory provider is included for tests and embedded
//! setups.

pub mod memory;

use std::collections::{hash_map, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use strata_types::{PartitionId, SegmentUpdate, UpsertEvent};

/// One record read from an input-log partition.
#[derive(Debug, Clone)]
pub struct InputRecord {
    pub partition: PartitionId,
    pub offset: u64,
    pub event: UpsertEvent,
}

/// One record to write to an output-log partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub partition: PartitionId,
    pub update: SegmentUpdate,
}

/// Highest observed offset per input partition; the commit set of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap(HashMap<PartitionId, u64>);

impl OffsetMap {
    pub fn observe(&mut self, partition: PartitionId, offset: u64) {
        match self.0.entry(partition) {
            hash_map::Entry::Vacant(entry) => {
                entry.insert(offset);
            }
            hash_map::Entry::Occupied(mut entry) => {
                if *entry.get() < offset {
                    entry.insert(offset);
                }
            }
        }
    }

    /// Merges another offset map in, keeping the maximum per partition.
    pub fn merge(&mut self, other: &OffsetMap) {
        for (partition, offset) in other.iter() {
            self.observe(partition, offset);
        }
    }

    pub fn get(&self, partition: PartitionId) -> Option<u64> {
        self.0.get(&partition).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartitionId, u64)> + '_ {
        self.0.iter().map(|(p, o)| (*p, *o))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Consumer end of the input log.
#[async_trait]
pub trait InputLogConsumer: Send + Sync {
    /// Waits up to `max_wait` for records. An empty result is not an error.
    async fn poll(&self, max_wait: Duration) -> anyhow::Result<Vec<InputRecord>>;

    /// Durably commits the given per-partition offsets back to the log.
    async fn ack(&self, offsets: &OffsetMap) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("produce failed: {0}")]
pub struct ProduceError(pub String);

/// Acknowledgment of one produced record.
pub type ProduceAck = oneshot::Receiver<Result<(), ProduceError>>;

/// Producer end of the output log.
pub trait OutputLogProducer: Send + Sync {
    /// Submits all records for delivery and returns one acknowledgment handle
    /// per record, in order.
    fn batch_produce(&self, records: Vec<OutputRecord>) -> Vec<ProduceAck>;

    /// Drives buffered records towards the log.
    fn flush(&self);
}
