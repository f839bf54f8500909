// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exponential backoff with jitter, driven one step at a time.
//!
//! A `with_retries` helper retrying a single RPC call in a tight loop
//! until it succeeds or a non-retriable error is hit works fine for a
//! one-shot request. The Console reporter instead ticks on a fixed
//! interval and must skip whole ticks while a backoff deadline is in
//! the future, so the retry policy here is exposed as a state machine
//! (`Backoff`) driven by the tick loop rather than a retry-the-call-
//! immediately wrapper.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::{Duration, Instant};

/// Tracks the current backoff delay across ticks of a polling loop.
pub struct Backoff {
    config: RetryConfig,
    current_delay: Duration,
    deadline: Option<Instant>,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        let current_delay = config.min_delay;
        Self {
            config,
            current_delay,
            deadline: None,
        }
    }

    /// True while a prior failure's backoff window has not yet elapsed —
    /// the caller should skip this tick entirely.
    pub fn is_in_backoff(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now < deadline)
    }

    /// Resets the delay to the base interval, e.g. on a successful push.
    pub fn reset(&mut self) {
        self.current_delay = self.config.min_delay;
        self.deadline = None;
    }

    /// Arms a new deadline from `now` using the *current* delay (jittered
    /// by up to `max_jitter_factor`) — so the first backoff starts at the
    /// tick interval, not already doubled — then advances `current_delay`
    /// by the configured multiplier, clamped to `max_delay`, for next time.
    pub fn record_failure(&mut self, now: Instant) {
        let jittered = jitter(self.current_delay, self.config.max_jitter_factor);
        self.deadline = Some(now + jittered);
        let next = self.current_delay.mul_f64(self.config.multiplier);
        self.current_delay = next.min(self.config.max_delay);
    }
}

fn jitter(delay: Duration, max_jitter_factor: Option<f64>) -> Duration {
    let Some(factor) = max_jitter_factor else {
        return delay;
    };
    let factor = factor.clamp(0.0, 1.0);
    let offset = rand::rng().random_range(-factor..=factor);
    let scaled = delay.as_secs_f64() * (1.0 + offset);
    Duration::from_secs_f64(scaled.max(0.0))
}
