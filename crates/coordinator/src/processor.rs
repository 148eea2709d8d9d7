// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The processing loop: drains the hand-off queue into bounded batches,
//! resolves conflicts per key and commits the outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use strata_types::config::KeyCoordinatorOptions;
use strata_types::{MessageContext, PrimaryKey, SegmentUpdate, TableName, UpsertEvent};

use crate::error::BatchError;
use crate::key_store::KeyContextStore;
use crate::log_client::{InputLogConsumer, InputRecord, OffsetMap};
use crate::metric_definitions::{
    COORDINATOR_BATCHES, COORDINATOR_BATCH_ABORTS, COORDINATOR_BATCH_DURATION,
    COORDINATOR_DELETES_EMITTED, COORDINATOR_DUPLICATES, COORDINATOR_MESSAGES,
};
use crate::output::OutputSender;
use crate::resolve::ResolveStrategy;

/// Single consumer of the hand-off queue.
///
/// One cycle assembles a batch (bounded by record count and wall clock),
/// processes it table by table, and only then commits the input offsets.
/// Failures abandon the batch before the commit; the uncommitted records are
/// re-read and reprocessed, which is safe because segment updates are
/// idempotent and the store only advances on successful batches.
pub(crate) struct ProcessLoop {
    queue: mpsc::Receiver<InputRecord>,
    consumer: Arc<dyn InputLogConsumer>,
    store: KeyContextStore,
    output: OutputSender,
    resolver: Arc<dyn ResolveStrategy>,
    options: KeyCoordinatorOptions,
    shutdown: CancellationToken,
}

struct Batch {
    records: Vec<InputRecord>,
    offsets: OffsetMap,
    queue_closed: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TableResolution {
    /// Overlay of the winning context per key, to be written back wholesale.
    pub(crate) contexts: HashMap<PrimaryKey, MessageContext>,
    /// Updates to emit, in decision order.
    pub(crate) updates: Vec<SegmentUpdate>,
    pub(crate) duplicates: u64,
    pub(crate) deletes: u64,
}

/// Resolves one table's slice of a batch against the fetched contexts.
///
/// `live` starts as the store's answer for the batch's keys and is updated in
/// place as messages are applied in input order, so several messages for one
/// key collapse within the batch: only the final winner survives into the
/// write-back and only the necessary tombstone/insert pairs are emitted.
pub(crate) fn resolve_table_batch(
    resolver: &dyn ResolveStrategy,
    mut live: HashMap<PrimaryKey, MessageContext>,
    events: &[&UpsertEvent],
) -> TableResolution {
    let mut updates = Vec::new();
    let mut duplicates = 0u64;
    let mut deletes = 0u64;

    for event in events {
        let incoming = &event.context;
        match live.get(&event.key).cloned() {
            None => {
                updates.push(SegmentUpdate::insert(event.table.clone(), incoming));
                live.insert(event.key.clone(), incoming.clone());
            }
            // Byte-equal context: the same occurrence seen through another
            // replica of the input.
            Some(current) if current == *incoming => duplicates += 1,
            Some(current) => {
                if resolver.should_supersede(&current, incoming) {
                    updates.push(SegmentUpdate::tombstone(
                        event.table.clone(),
                        current.segment.clone(),
                        current.source_offset,
                        incoming.source_offset,
                    ));
                    deletes += 1;
                    updates.push(SegmentUpdate::insert(event.table.clone(), incoming));
                    live.insert(event.key.clone(), incoming.clone());
                } else if incoming.source_offset <= current.source_offset {
                    // Already covered by what we hold: the at-least-once
                    // replay case.
                    duplicates += 1;
                } else {
                    // The new occurrence lost against an older one; tombstone
                    // it in its own segment so scans skip the row.
                    updates.push(SegmentUpdate::tombstone(
                        event.table.clone(),
                        incoming.segment.clone(),
                        incoming.source_offset,
                        incoming.source_offset,
                    ));
                    deletes += 1;
                }
            }
        }
    }

    TableResolution {
        contexts: live,
        updates,
        duplicates,
        deletes,
    }
}

impl ProcessLoop {
    pub(crate) fn new(
        queue: mpsc::Receiver<InputRecord>,
        consumer: Arc<dyn InputLogConsumer>,
        store: KeyContextStore,
        output: OutputSender,
        resolver: Arc<dyn ResolveStrategy>,
        options: KeyCoordinatorOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            consumer,
            store,
            output,
            resolver,
            options,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let batch = self.next_batch().await;
            if self.shutdown.is_cancelled() {
                if !batch.records.is_empty() {
                    info!(
                        "abandoning a batch of {} records on shutdown",
                        batch.records.len()
                    );
                }
                break;
            }
            if batch.records.is_empty() {
                if batch.queue_closed {
                    debug!("hand-off queue closed, stopping the process loop");
                    break;
                }
                trace!("no records in the current cycle");
                continue;
            }

            let start = Instant::now();
            let size = batch.records.len();
            match self.process_batch(&batch.records).await {
                Ok(()) => {
                    if let Err(err) = self.consumer.ack(&batch.offsets).await {
                        // The batch itself is durable; the uncommitted
                        // offsets only cause redelivery.
                        warn!("failed to commit input offsets: {err:#}");
                    }
                    counter!(COORDINATOR_BATCHES).increment(1);
                    counter!(COORDINATOR_MESSAGES).increment(size as u64);
                    histogram!(COORDINATOR_BATCH_DURATION).record(start.elapsed());
                    debug!("processed a batch of {size} records in {:?}", start.elapsed());
                }
                Err(err) => {
                    counter!(COORDINATOR_BATCH_ABORTS).increment(1);
                    warn!("batch of {size} records aborted, offsets not committed: {err}");
                }
            }
        }
        debug!("message process loop exited");
    }

    /// Drains the queue until the batch is full or the assembly deadline
    /// passes, sleeping between drain attempts.
    async fn next_batch(&mut self) -> Batch {
        let max_size = self.options.fetch_max_batch_size();
        let deadline = Instant::now() + self.options.fetch_max_delay();
        let mut records = Vec::new();
        let mut queue_closed = false;

        'assemble: while records.len() < max_size && Instant::now() < deadline {
            loop {
                match self.queue.try_recv() {
                    Ok(record) => {
                        records.push(record);
                        if records.len() >= max_size {
                            break 'assemble;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        queue_closed = true;
                        break 'assemble;
                    }
                }
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break 'assemble,
                _ = tokio::time::sleep(self.options.fetch_delay()) => {}
            }
        }

        let mut offsets = OffsetMap::default();
        for record in &records {
            offsets.observe(record.partition, record.offset);
        }
        Batch {
            records,
            offsets,
            queue_closed,
        }
    }

    async fn process_batch(&self, records: &[InputRecord]) -> Result<(), BatchError> {
        // Group by destination table, preserving input order within a group.
        let mut by_table: HashMap<TableName, Vec<&UpsertEvent>> = HashMap::new();
        for record in records {
            by_table
                .entry(record.event.table.clone())
                .or_default()
                .push(&record.event);
        }

        for (table, events) in by_table {
            self.process_table(&table, &events).await?;
        }
        Ok(())
    }

    async fn process_table(
        &self,
        table: &TableName,
        events: &[&UpsertEvent],
    ) -> Result<(), BatchError> {
        let handle = self.store.table(table)?;

        let keys: std::collections::HashSet<_> = events.iter().map(|e| &e.key).collect();
        let existing = handle.multi_get(keys.into_iter())?;
        trace!(table = %table, "fetched {} contexts from the key-value store", existing.len());

        let resolution = resolve_table_batch(self.resolver.as_ref(), existing, events);
        counter!(COORDINATOR_DUPLICATES).increment(resolution.duplicates);
        counter!(COORDINATOR_DELETES_EMITTED).increment(resolution.deletes);
        debug!(
            table = %table,
            "resolved {} events into {} updates ({} tombstones, {} duplicates)",
            events.len(),
            resolution.updates.len(),
            resolution.deletes,
            resolution.duplicates,
        );

        self.output
            .send(resolution.updates, self.options.output_ack_timeout())
            .await?;
        handle.multi_put(&resolution.contexts)?;
        Ok(())
    }
}
