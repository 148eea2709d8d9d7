// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Routing and delivery of segment updates onto the output log.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use strata_types::SegmentUpdate;

use crate::error::BatchError;
use crate::log_client::{OutputLogProducer, OutputRecord};

/// Sends one batch of updates and awaits their acknowledgments.
///
/// Every update lands on the partition derived from its destination segment
/// name, so all updates for one segment stay ordered on a single partition.
pub(crate) struct OutputSender {
    producer: Arc<dyn OutputLogProducer>,
}

impl OutputSender {
    pub(crate) fn new(producer: Arc<dyn OutputLogProducer>) -> Self {
        Self { producer }
    }

    /// Submits all updates, flushes the producer and waits up to `timeout`
    /// for every acknowledgment. Any failed or still-pending update fails the
    /// batch.
    pub(crate) async fn send(
        &self,
        updates: Vec<SegmentUpdate>,
        timeout: Duration,
    ) -> Result<(), BatchError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut records = Vec::with_capacity(updates.len());
        for update in updates {
            let partition = update.segment.partition_id()?;
            records.push(OutputRecord { partition, update });
        }

        let total = records.len();
        let acks = self.producer.batch_produce(records);
        self.producer.flush();

        let deadline = Instant::now() + timeout;
        let mut failed = 0usize;
        for ack in acks {
            match tokio::time::timeout_at(deadline, ack).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => {
                    warn!("output update rejected: {err}");
                    failed += 1;
                }
                Ok(Err(_closed)) => {
                    warn!("output producer dropped an acknowledgment");
                    failed += 1;
                }
                Err(_elapsed) => failed += 1,
            }
        }

        if failed > 0 {
            return Err(BatchError::OutputLog { failed, total });
        }
        Ok(())
    }
}
