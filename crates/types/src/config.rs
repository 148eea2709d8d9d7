// Copyright (c) 2024 -  Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Configuration options for the coordinator and the segment-side stores.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::retries::RetryPolicy;

/// # Key coordinator options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "schemars", schemars(rename = "KeyCoordinatorOptions", default))]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct KeyCoordinatorOptions {
    /// # Fetch delay
    ///
    /// Sleep between drain attempts while a batch is being assembled.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[cfg_attr(feature = "schemars", schemars(with = "String"))]
    fetch_delay: humantime::Duration,

    /// # Max fetch delay
    ///
    /// Wall-clock ceiling on assembling one batch. Also the maximum time the
    /// input consumer blocks on a single poll.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[cfg_attr(feature = "schemars", schemars(with = "String"))]
    fetch_max_delay: humantime::Duration,

    /// # Max batch size
    ///
    /// Record ceiling on one processing batch.
    fetch_max_batch_size: NonZeroUsize,

    /// # Consumer queue capacity
    ///
    /// Capacity of the hand-off queue between the input consumer and the
    /// processor. When the queue is full the consumer blocks, propagating
    /// backpressure to the input log.
    consumer_queue_capacity: NonZeroUsize,

    /// # Output ack timeout
    ///
    /// Bounded wait for the output producer to acknowledge all updates of one
    /// batch. Exceeding it aborts the batch.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[cfg_attr(feature = "schemars", schemars(with = "String"))]
    output_ack_timeout: humantime::Duration,

    /// # Termination wait
    ///
    /// How long `stop()` waits for in-flight work before abandoning it.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[cfg_attr(feature = "schemars", schemars(with = "String"))]
    termination_wait: humantime::Duration,

    /// # Consumer retry policy
    ///
    /// Backoff applied when polling the input log fails. Retries are
    /// unbounded by default; the policy only paces them.
    consumer_retry_policy: RetryPolicy,

    /// # Key-value store
    key_value_store: KeyValueStoreOptions,
}

impl KeyCoordinatorOptions {
    pub fn fetch_delay(&self) -> Duration {
        self.fetch_delay.into()
    }

    pub fn fetch_max_delay(&self) -> Duration {
        self.fetch_max_delay.into()
    }

    pub fn fetch_max_batch_size(&self) -> usize {
        self.fetch_max_batch_size.get()
    }

    pub fn consumer_queue_capacity(&self) -> usize {
        self.consumer_queue_capacity.get()
    }

    pub fn output_ack_timeout(&self) -> Duration {
        self.output_ack_timeout.into()
    }

    pub fn termination_wait(&self) -> Duration {
        self.termination_wait.into()
    }

    pub fn consumer_retry_policy(&self) -> &RetryPolicy {
        &self.consumer_retry_policy
    }

    pub fn key_value_store(&self) -> &KeyValueStoreOptions {
        &self.key_value_store
    }
}

impl Default for KeyCoordinatorOptions {
    fn default() -> Self {
        Self {
            fetch_delay: Duration::from_millis(100).into(),
            fetch_max_delay: Duration::from_secs(5).into(),
            fetch_max_batch_size: NonZeroUsize::new(10_000).expect("non zero"),
            consumer_queue_capacity: NonZeroUsize::new(10_000).expect("non zero"),
            output_ack_timeout: Duration::from_secs(10).into(),
            termination_wait: Duration::from_secs(10).into(),
            consumer_retry_policy: RetryPolicy::exponential(
                Duration::from_millis(100),
                2.0,
                None,
                Some(Duration::from_secs(10)),
            ),
            key_value_store: KeyValueStoreOptions::default(),
        }
    }
}

/// # Key-value store options
///
/// Options for the embedded store holding the per-key winning context.
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "schemars", schemars(rename = "KeyValueStoreOptions", default))]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct KeyValueStoreOptions {
    /// # Data directory
    ///
    /// Where the embedded store keeps its files.
    data_dir: PathBuf,

    /// # Sync writes
    ///
    /// Force every batch commit to disk before acknowledging it. Disabling
    /// this trades durability of the latest batches for throughput.
    sync_writes: bool,
}

impl KeyValueStoreOptions {
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn sync_writes(&self) -> bool {
        self.sync_writes
    }
}

impl Default for KeyValueStoreOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("strata-data/key-contexts"),
            sync_writes: true,
        }
    }
}

/// # Update log options
///
/// Options for the per-segment durable update logs on the query side.
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "schemars", schemars(rename = "UpdateLogOptions", default))]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct UpdateLogOptions {
    /// # Data directory
    ///
    /// Root directory of the update logs, one file per (table, segment).
    data_dir: PathBuf,
}

impl UpdateLogOptions {
    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }
}

impl Default for UpdateLogOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("strata-data/update-logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_roundtrip_through_serde() {
        let options = KeyCoordinatorOptions::default();
        let serialized = serde_json::to_string(&options).unwrap();
        let deserialized: KeyCoordinatorOptions = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.fetch_max_batch_size(), 10_000);
        assert_eq!(deserialized.fetch_delay(), Duration::from_millis(100));
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = KeyCoordinatorOptionsBuilder::default()
            .fetch_max_batch_size(NonZeroUsize::new(16).unwrap())
            .fetch_delay(Duration::from_millis(5).into())
            .build()
            .unwrap();
        assert_eq!(options.fetch_max_batch_size(), 16);
        assert_eq!(options.fetch_delay(), Duration::from_millis(5));
    }
}
