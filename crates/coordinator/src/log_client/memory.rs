// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! In-memory input/output logs for tests and embedded setups.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{
    InputLogConsumer, InputRecord, OffsetMap, OutputLogProducer, OutputRecord, ProduceAck,
    ProduceError,
};

/// In-memory input log. `push` feeds records; `committed` exposes the offsets
/// acknowledged so far.
#[derive(Default)]
pub struct MemoryInputLog {
    records: Mutex<VecDeque<InputRecord>>,
    committed: Mutex<OffsetMap>,
    available: Notify,
}

impl MemoryInputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, record: InputRecord) {
        self.records.lock().push_back(record);
        self.available.notify_waiters();
    }

    pub fn committed(&self) -> OffsetMap {
        self.committed.lock().clone()
    }
}

#[async_trait]
impl InputLogConsumer for MemoryInputLog {
    async fn poll(&self, max_wait: Duration) -> anyhow::Result<Vec<InputRecord>> {
        let deadline = Instant::now() + max_wait;
        loop {
            {
                let mut records = self.records.lock();
                if !records.is_empty() {
                    return Ok(records.drain(..).collect());
                }
            }
            let notified = self.available.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, offsets: &OffsetMap) -> anyhow::Result<()> {
        self.committed.lock().merge(offsets);
        Ok(())
    }
}

/// In-memory output log with failure and stall injection for tests.
#[derive(Default)]
pub struct MemoryOutputLog {
    produced: Mutex<Vec<OutputRecord>>,
    fail_next_batch: AtomicBool,
    hold_acks: AtomicBool,
    // Senders kept alive so held acknowledgments stay pending instead of
    // resolving into channel-closed errors.
    held: Mutex<Vec<oneshot::Sender<Result<(), ProduceError>>>>,
}

impl MemoryOutputLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn produced(&self) -> Vec<OutputRecord> {
        self.produced.lock().clone()
    }

    /// Makes the next `batch_produce` fail every record.
    pub fn fail_next_batch(&self) {
        self.fail_next_batch.store(true, Ordering::Relaxed);
    }

    /// While set, acknowledgments are withheld, stalling producers into their
    /// deadline.
    pub fn hold_acks(&self, hold: bool) {
        self.hold_acks.store(hold, Ordering::Relaxed);
        if !hold {
            self.held.lock().clear();
        }
    }
}

impl OutputLogProducer for MemoryOutputLog {
    fn batch_produce(&self, records: Vec<OutputRecord>) -> Vec<ProduceAck> {
        let fail = self.fail_next_batch.swap(false, Ordering::Relaxed);
        let hold = self.hold_acks.load(Ordering::Relaxed);

        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            let (tx, rx) = oneshot::channel();
            if fail {
                let _ = tx.send(Err(ProduceError("injected failure".to_owned())));
            } else if hold {
                self.held.lock().push(tx);
            } else {
                self.produced.lock().push(record);
                let _ = tx.send(Ok(()));
            }
            acks.push(rx);
        }
        acks
    }

    fn flush(&self) {}
}
