// Copyright (c) 2023 - 2025 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Retry policies used to pace recovery from transient failures.

use std::cmp;
use std::num::NonZeroUsize;
use std::time::Duration;

use rand::Rng;

const DEFAULT_JITTER_MULTIPLIER: f32 = 0.3;

/// Policy for retrying a failing operation.
///
/// Turn it into an iterator of delays with [`IntoIterator::into_iter`]; the
/// iterator yields `None` once the configured attempts are exhausted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum RetryPolicy {
    /// # None
    ///
    /// Give up after the first failure.
    None,
    /// # Fixed delay
    ///
    /// Retry with a fixed delay between attempts.
    FixedDelay {
        /// # Interval
        ///
        /// Interval between retries.
        ///
        /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        #[cfg_attr(feature = "schemars", schemars(with = "String"))]
        interval: humantime::Duration,
        /// # Max attempts
        ///
        /// Number of maximum attempts before giving up. Infinite retries if unset.
        max_attempts: Option<NonZeroUsize>,
    },
    /// # Exponential
    ///
    /// Retry with an exponential strategy. The next delay is computed as
    /// `min(previous_delay * factor, max_interval)`, with a random jitter on
    /// top to avoid synchronized retries.
    Exponential {
        /// # Initial interval
        ///
        /// Interval before the first retry attempt.
        ///
        /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
        #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
        #[cfg_attr(feature = "schemars", schemars(with = "String"))]
        initial_interval: humantime::Duration,

        /// # Factor
        ///
        /// The factor used to compute the next retry delay.
        factor: f32,

        /// # Max attempts
        ///
        /// Number of maximum attempts before giving up. Infinite retries if unset.
        max_attempts: Option<NonZeroUsize>,

        /// # Max interval
        ///
        /// Maximum delay between retries.
        #[serde(with = "serde_with::As::<Option<serde_with::DisplayFromStr>>")]
        #[cfg_attr(feature = "schemars", schemars(with = "Option<String>"))]
        max_interval: Option<humantime::Duration>,
    },
}

impl RetryPolicy {
    pub fn fixed_delay(interval: Duration, max_attempts: Option<usize>) -> Self {
        Self::FixedDelay {
            interval: interval.into(),
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
        }
    }

    pub fn exponential(
        initial_interval: Duration,
        factor: f32,
        max_attempts: Option<usize>,
        max_interval: Option<Duration>,
    ) -> Self {
        Self::Exponential {
            initial_interval: initial_interval.into(),
            factor,
            max_attempts: max_attempts.and_then(NonZeroUsize::new),
            max_interval: max_interval.map(Into::into),
        }
    }

    pub fn max_attempts(&self) -> Option<NonZeroUsize> {
        match self {
            RetryPolicy::None => NonZeroUsize::new(1),
            RetryPolicy::FixedDelay { max_attempts, .. }
            | RetryPolicy::Exponential { max_attempts, .. } => *max_attempts,
        }
    }
}

impl IntoIterator for RetryPolicy {
    type Item = Duration;
    type IntoIter = RetryIter;

    fn into_iter(self) -> Self::IntoIter {
        RetryIter {
            policy: self,
            attempts: 0,
            last_delay: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryIter {
    policy: RetryPolicy,
    attempts: usize,
    last_delay: Option<Duration>,
}

impl RetryIter {
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    fn jitter(base: Duration) -> Duration {
        base.mul_f32(rand::thread_rng().gen_range(0.0..DEFAULT_JITTER_MULTIPLIER))
    }
}

impl Iterator for RetryIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        self.attempts += 1;
        match &self.policy {
            RetryPolicy::None => None,
            RetryPolicy::FixedDelay {
                interval,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| self.attempts > max.get()) {
                    return None;
                }
                Some((*interval).into())
            }
            RetryPolicy::Exponential {
                initial_interval,
                factor,
                max_attempts,
                max_interval,
            } => {
                if max_attempts.is_some_and(|max| self.attempts > max.get()) {
                    return None;
                }
                let base = match self.last_delay {
                    None => (*initial_interval).into(),
                    Some(last) => {
                        let next = last.mul_f32(*factor);
                        match max_interval {
                            Some(max) => cmp::min(next, (*max).into()),
                            None => next,
                        }
                    }
                };
                self.last_delay = Some(base);
                Some(base + Self::jitter(base))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_policy_yields_nothing() {
        assert_eq!(RetryPolicy::None.into_iter().next(), None);
    }

    #[test]
    fn fixed_delay_honors_max_attempts() {
        let delays: Vec<_> = RetryPolicy::fixed_delay(Duration::from_millis(10), Some(3))
            .into_iter()
            .collect();
        assert_eq!(delays, vec![Duration::from_millis(10); 3]);
    }

    #[test]
    fn exponential_grows_up_to_the_cap() {
        let mut iter = RetryPolicy::exponential(
            Duration::from_millis(100),
            2.0,
            None,
            Some(Duration::from_millis(400)),
        )
        .into_iter();

        let mut bases = Vec::new();
        for _ in 0..5 {
            iter.next().unwrap();
            bases.push(iter.last_delay.unwrap());
        }
        assert_eq!(
            bases,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(400),
                Duration::from_millis(400),
            ]
        );
    }
}
