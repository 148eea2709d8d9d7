// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! End-to-end tests driving the coordinator service against in-memory logs
//! and a real key-value store.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use strata_types::config::{
    KeyCoordinatorOptions, KeyCoordinatorOptionsBuilder, KeyValueStoreOptionsBuilder,
};
use strata_types::{
    MessageContext, PartitionId, PrimaryKey, SegmentUpdate, TableName, UpdateKind, UpsertEvent,
};

use crate::key_store::KeyContextStore;
use crate::log_client::memory::{MemoryInputLog, MemoryOutputLog};
use crate::log_client::InputRecord;
use crate::resolve::TimestampOffsetResolver;
use crate::service::{KeyCoordinator, State};

const TABLE: &str = "orders";
const SEGMENT: &str = "orders__0__1__t";

struct TestEnv {
    _dir: TempDir,
    input: Arc<MemoryInputLog>,
    output: Arc<MemoryOutputLog>,
    store: KeyContextStore,
    coordinator: KeyCoordinator,
}

fn test_options() -> KeyCoordinatorOptions {
    KeyCoordinatorOptionsBuilder::default()
        .fetch_delay(Duration::from_millis(5).into())
        .fetch_max_delay(Duration::from_millis(50).into())
        .fetch_max_batch_size(NonZeroUsize::new(1000).unwrap())
        .output_ack_timeout(Duration::from_millis(500).into())
        .termination_wait(Duration::from_secs(1).into())
        .build()
        .unwrap()
}

fn test_env() -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let kv_options = KeyValueStoreOptionsBuilder::default()
        .data_dir(dir.path().to_path_buf())
        .build()
        .unwrap();
    let store = KeyContextStore::open(&kv_options).unwrap();

    let input = Arc::new(MemoryInputLog::new());
    let output = Arc::new(MemoryOutputLog::new());
    let coordinator = KeyCoordinator::new(
        test_options(),
        input.clone(),
        output.clone(),
        Arc::new(TimestampOffsetResolver),
        store.clone(),
    );

    TestEnv {
        _dir: dir,
        input,
        output,
        store,
        coordinator,
    }
}

fn record(key: &[u8], offset: u64, timestamp: u64) -> InputRecord {
    InputRecord {
        partition: PartitionId::new(0),
        offset,
        event: UpsertEvent {
            table: TableName::from(TABLE),
            key: PrimaryKey::from(key),
            context: MessageContext::new(SEGMENT, offset, timestamp),
        },
    }
}

async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within the deadline");
}

#[test_log::test(tokio::test)]
async fn single_new_key_is_inserted() {
    let env = test_env();
    env.coordinator.start().unwrap();

    env.input.push(record(&[0xab], 100, 10));
    eventually(|| async { !env.output.produced().is_empty() }).await;

    let produced = env.output.produced();
    assert_eq!(produced.len(), 1);
    assert_eq!(
        produced[0].update,
        SegmentUpdate {
            table: TableName::from(TABLE),
            segment: SEGMENT.into(),
            target_offset: 100,
            value: 100,
            kind: UpdateKind::Insert,
        }
    );

    let key = PrimaryKey::from(vec![0xab]);
    eventually(|| async { env.input.committed().get(PartitionId::new(0)) == Some(100) }).await;
    let table = env.store.table(&TableName::from(TABLE)).unwrap();
    assert_eq!(
        table.multi_get([&key]).unwrap()[&key],
        MessageContext::new(SEGMENT, 100, 10)
    );

    env.coordinator.stop().await;
    assert_eq!(env.coordinator.state(), State::Shutdown);
}

#[test_log::test(tokio::test)]
async fn replacement_emits_tombstone_and_insert() {
    let env = test_env();
    let key = PrimaryKey::from(vec![0xab]);
    let table = TableName::from(TABLE);
    env.store
        .table(&table)
        .unwrap()
        .multi_put(&[(key.clone(), MessageContext::new(SEGMENT, 100, 10))].into())
        .unwrap();

    env.coordinator.start().unwrap();
    env.input.push(record(&[0xab], 150, 20));
    eventually(|| async { env.output.produced().len() >= 2 }).await;

    let updates: Vec<_> = env.output.produced().into_iter().map(|r| r.update).collect();
    assert_eq!(
        updates,
        vec![
            SegmentUpdate::tombstone(table.clone(), SEGMENT.into(), 100, 150),
            SegmentUpdate {
                table: table.clone(),
                segment: SEGMENT.into(),
                target_offset: 150,
                value: 150,
                kind: UpdateKind::Insert,
            },
        ]
    );

    eventually(|| async { env.input.committed().get(PartitionId::new(0)) == Some(150) }).await;
    let stored = env.store.table(&table).unwrap().multi_get([&key]).unwrap();
    assert_eq!(stored[&key], MessageContext::new(SEGMENT, 150, 20));

    env.coordinator.stop().await;
}

#[test_log::test(tokio::test)]
async fn out_of_order_loser_changes_nothing() {
    let env = test_env();
    let key = PrimaryKey::from(vec![0xab]);
    let table = TableName::from(TABLE);
    let current = MessageContext::new(SEGMENT, 150, 20);
    env.store
        .table(&table)
        .unwrap()
        .multi_put(&[(key.clone(), current.clone())].into())
        .unwrap();

    env.coordinator.start().unwrap();
    env.input.push(record(&[0xab], 140, 15));
    eventually(|| async { env.input.committed().get(PartitionId::new(0)) == Some(140) }).await;

    assert!(env.output.produced().is_empty());
    let stored = env.store.table(&table).unwrap().multi_get([&key]).unwrap();
    assert_eq!(stored[&key], current);

    env.coordinator.stop().await;
}

#[test_log::test(tokio::test)]
async fn failed_output_aborts_the_batch() {
    let env = test_env();
    env.output.fail_next_batch();
    env.coordinator.start().unwrap();

    env.input.push(record(&[0xab], 100, 10));
    // Give the loop enough cycles to pick the record up and abort the batch.
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Neither the offsets nor the store moved.
    assert_eq!(env.input.committed().get(PartitionId::new(0)), None);
    let key = PrimaryKey::from(vec![0xab]);
    let stored = env
        .store
        .table(&TableName::from(TABLE))
        .unwrap()
        .multi_get([&key])
        .unwrap();
    assert!(stored.is_empty());

    env.coordinator.stop().await;
}

#[test_log::test(tokio::test)]
async fn empty_cycles_commit_nothing() {
    let env = test_env();
    env.coordinator.start().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(env.output.produced().is_empty());
    assert!(env.input.committed().is_empty());

    env.coordinator.stop().await;
}

#[test_log::test(tokio::test)]
async fn lifecycle_states() {
    let env = test_env();
    assert_eq!(env.coordinator.state(), State::Init);

    env.coordinator.start().unwrap();
    assert_eq!(env.coordinator.state(), State::Running);
    assert!(env.coordinator.start().is_err());

    env.coordinator.stop().await;
    assert_eq!(env.coordinator.state(), State::Shutdown);
    // Stopping twice is a no-op.
    env.coordinator.stop().await;
    assert_eq!(env.coordinator.state(), State::Shutdown);

    // A stopped coordinator does not restart.
    assert!(env.coordinator.start().is_err());
}
