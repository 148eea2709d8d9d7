// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The input consumer loop: polls the input log and feeds the bounded
//! hand-off queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use strata_types::retries::RetryPolicy;

use crate::log_client::{InputLogConsumer, InputRecord};

/// Single producer of the hand-off queue.
///
/// Blocking on a full queue is the backpressure surface: downstream slowness
/// stalls this loop, which stalls the input log's fetch position. Poll
/// failures are retried indefinitely, paced by the configured policy; the
/// backoff resets after any successful poll.
pub(crate) struct ConsumerIngestLoop {
    consumer: Arc<dyn InputLogConsumer>,
    queue: mpsc::Sender<InputRecord>,
    fetch_max_delay: Duration,
    retry_policy: RetryPolicy,
    shutdown: CancellationToken,
}

impl ConsumerIngestLoop {
    pub(crate) fn new(
        consumer: Arc<dyn InputLogConsumer>,
        queue: mpsc::Sender<InputRecord>,
        fetch_max_delay: Duration,
        retry_policy: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            queue,
            fetch_max_delay,
            retry_policy,
            shutdown,
        }
    }

    pub(crate) async fn run(self) {
        let mut backoff = self.retry_policy.clone().into_iter();
        loop {
            let records = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = self.consumer.poll(self.fetch_max_delay) => match result {
                    Ok(records) => {
                        backoff = self.retry_policy.clone().into_iter();
                        records
                    }
                    Err(err) => {
                        let delay = backoff.next().unwrap_or(self.fetch_max_delay);
                        warn!(
                            "polling the input log failed, retrying in {delay:?}: {err:#}"
                        );
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                },
            };

            for record in records {
                tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    enqueued = self.queue.send(record) => {
                        if enqueued.is_err() {
                            debug!("hand-off queue closed, stopping the consumer loop");
                            return;
                        }
                    }
                }
            }
        }
        debug!("consumer ingest loop exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use strata_types::{MessageContext, PartitionId, PrimaryKey, TableName, UpsertEvent};

    use crate::log_client::memory::MemoryInputLog;
    use crate::log_client::OffsetMap;

    fn record(offset: u64) -> InputRecord {
        InputRecord {
            partition: PartitionId::new(0),
            offset,
            event: UpsertEvent {
                table: TableName::from("t"),
                key: PrimaryKey::from(vec![1]),
                context: MessageContext::new("t__0__1__x", offset, offset),
            },
        }
    }

    #[tokio::test]
    async fn forwards_records_into_the_queue() {
        let log = Arc::new(MemoryInputLog::new());
        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let ingest = ConsumerIngestLoop::new(
            log.clone(),
            tx,
            Duration::from_millis(20),
            RetryPolicy::None,
            shutdown.clone(),
        );
        let handle = tokio::spawn(ingest.run());

        log.push(record(1));
        log.push(record(2));
        assert_eq!(rx.recv().await.unwrap().offset, 1);
        assert_eq!(rx.recv().await.unwrap().offset, 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    struct FailingConsumer {
        polls: AtomicUsize,
        inner: MemoryInputLog,
    }

    #[async_trait]
    impl InputLogConsumer for FailingConsumer {
        async fn poll(&self, max_wait: Duration) -> anyhow::Result<Vec<InputRecord>> {
            if self.polls.fetch_add(1, Ordering::Relaxed) == 0 {
                anyhow::bail!("broker unavailable");
            }
            self.inner.poll(max_wait).await
        }

        async fn ack(&self, offsets: &OffsetMap) -> anyhow::Result<()> {
            self.inner.ack(offsets).await
        }
    }

    #[tokio::test]
    async fn retries_after_poll_failures() {
        let consumer = Arc::new(FailingConsumer {
            polls: AtomicUsize::new(0),
            inner: MemoryInputLog::new(),
        });
        consumer.inner.push(record(7));

        let (tx, mut rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();
        let ingest = ConsumerIngestLoop::new(
            consumer.clone(),
            tx,
            Duration::from_millis(20),
            RetryPolicy::fixed_delay(Duration::from_millis(1), None),
            shutdown.clone(),
        );
        let handle = tokio::spawn(ingest.run());

        assert_eq!(rx.recv().await.unwrap().offset, 7);
        assert!(consumer.polls.load(Ordering::Relaxed) >= 2);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
