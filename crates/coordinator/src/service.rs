// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lifecycle of the key coordinator service.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strata_types::config::KeyCoordinatorOptions;

use crate::consumer::ConsumerIngestLoop;
use crate::key_store::KeyContextStore;
use crate::log_client::{InputLogConsumer, OutputLogProducer};
use crate::output::OutputSender;
use crate::processor::ProcessLoop;
use crate::resolve::ResolveStrategy;

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Running,
    ShuttingDown,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("key coordinator cannot start from state {0:?}")]
pub struct InvalidStateError(pub State);

/// The upsert coordinator service.
///
/// Owns the two long-lived loops (input consumer, batch processor) and the
/// bounded hand-off queue between them. `stop` cancels both loops and waits
/// up to the configured termination timeout; a loop that does not finish in
/// time is aborted, which at worst abandons one uncommitted batch.
pub struct KeyCoordinator {
    options: KeyCoordinatorOptions,
    consumer: Arc<dyn InputLogConsumer>,
    producer: Arc<dyn OutputLogProducer>,
    resolver: Arc<dyn ResolveStrategy>,
    store: KeyContextStore,
    state: Mutex<State>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl KeyCoordinator {
    pub fn new(
        options: KeyCoordinatorOptions,
        consumer: Arc<dyn InputLogConsumer>,
        producer: Arc<dyn OutputLogProducer>,
        resolver: Arc<dyn ResolveStrategy>,
        store: KeyContextStore,
    ) -> Self {
        Self {
            options,
            consumer,
            producer,
            resolver,
            store,
            state: Mutex::new(State::Init),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Spawns the consumer and processor loops.
    pub fn start(&self) -> Result<(), InvalidStateError> {
        {
            let mut state = self.state.lock();
            if *state != State::Init {
                return Err(InvalidStateError(*state));
            }
            *state = State::Running;
        }
        info!("starting the key coordinator loops");

        let (queue_tx, queue_rx) = mpsc::channel(self.options.consumer_queue_capacity());

        let ingest = ConsumerIngestLoop::new(
            self.consumer.clone(),
            queue_tx,
            self.options.fetch_max_delay(),
            self.options.consumer_retry_policy().clone(),
            self.shutdown.clone(),
        );
        let process = ProcessLoop::new(
            queue_rx,
            self.consumer.clone(),
            self.store.clone(),
            OutputSender::new(self.producer.clone()),
            self.resolver.clone(),
            self.options.clone(),
            self.shutdown.clone(),
        );

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(ingest.run()));
        tasks.push(tokio::spawn(process.run()));
        Ok(())
    }

    /// Cancels both loops and waits for them to wind down.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != State::Running {
                return;
            }
            *state = State::ShuttingDown;
        }
        info!("stopping the key coordinator");
        self.shutdown.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(self.options.termination_wait(), task)
                .await
                .is_err()
            {
                // An uncommitted batch may be abandoned here; it will be
                // reprocessed after a restart.
                warn!("a coordinator loop did not stop in time, aborting it");
                abort.abort();
            }
        }

        *self.state.lock() = State::Shutdown;
        info!("key coordinator stopped");
    }
}
