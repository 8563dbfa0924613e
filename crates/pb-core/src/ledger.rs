//! # Pressure Ledger
//!
//! Concurrency-safe map from `(community, user)` to pressure state.
//!
//! Each key owns its own mutex. The map's shard lock is only held long
//! enough to get-or-create the slot, so updates to distinct keys never wait
//! on each other, while the full decay/score/check/reset sequence for one
//! key runs as a single critical section.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::models::{CommunityConfig, MessageEvent, PressureKey, PressureOutcome, UserPressureState};
use crate::scoring;
use crate::threshold;

type Slot = Arc<Mutex<UserPressureState>>;

#[derive(Debug, Default)]
pub struct PressureLedger {
    states: DashMap<PressureKey, Slot>,
}

impl PressureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decays, scores, checks the ceiling and resets on breach, atomically
    /// for `key`. `now` is wall-clock milliseconds.
    pub fn apply_and_check(
        &self,
        key: PressureKey,
        config: &CommunityConfig,
        event: &MessageEvent,
        now: i64,
    ) -> PressureOutcome {
        let slot = self.slot(key);
        let mut state = slot.lock();

        decay(&mut state, config, now);
        state.last_message_timestamp_millis = now;
        state.pressure_dropoff = config.pressure_dropoff;

        let breakdown = scoring::score(config, event);
        for (feature, amount) in breakdown.components() {
            trace!(%key, feature, amount, "Adding pressure");
        }
        let repeat = scoring::repeat_bonus(
            config,
            &mut state.last_non_empty_content,
            &event.displayed_content,
        );
        if repeat > 0.0 {
            trace!(%key, feature = "repeat", amount = repeat, "Adding pressure");
        }

        let delta = breakdown.total() + repeat;
        state.pressure += delta;
        debug!(%key, delta, pressure = state.pressure, "Pressure added");

        threshold::evaluate(&mut state, config)
    }

    /// Copy of the current state for `key`, if it exists.
    pub fn snapshot(&self, key: PressureKey) -> Option<UserPressureState> {
        let slot = self.states.get(&key).map(|s| Arc::clone(s.value()))?;
        let state = slot.lock().clone();
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Removes every state for which `should_evict` returns true.
    ///
    /// A state that an in-flight update currently holds is always kept:
    /// removal is decided under the map's shard lock and only when the map
    /// owns the last reference, so no update can land on an orphaned state.
    pub fn evict_where<F>(&self, should_evict: F) -> usize
    where
        F: Fn(&PressureKey, &UserPressureState) -> bool,
    {
        let before = self.states.len();
        self.states.retain(|key, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Some(state) => !should_evict(key, &state),
                None => true,
            }
        });
        before.saturating_sub(self.states.len())
    }

    /// Evicts states that have been silent for at least `ttl_millis` and
    /// whose pressure has fully drained. A state still carrying pressure is
    /// kept however long it has been idle, so its next message sees the same
    /// value it would have without the sweep.
    pub fn sweep_idle(&self, now: i64, ttl_millis: i64) -> usize {
        let evicted = self.evict_where(|_, state| {
            now.saturating_sub(state.last_message_timestamp_millis) >= ttl_millis
                && state.decayed_pressure(now) <= 0.0
        });
        if evicted > 0 {
            debug!(evicted, remaining = self.states.len(), "Swept idle pressure states");
        }
        evicted
    }

    /// Atomic get-or-create; never produces two states for one key.
    fn slot(&self, key: PressureKey) -> Slot {
        if let Some(slot) = self.states.get(&key) {
            return Arc::clone(slot.value());
        }

        match self.states.entry(key) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                debug!(%key, "Creating pressure state");
                Arc::clone(vacant.insert(Slot::default()).value())
            }
        }
    }
}

/// Removes `pressure_dropoff` per elapsed second since the previous message.
/// A first message is never decayed, and a clock that moved backwards decays
/// nothing.
fn decay(state: &mut UserPressureState, config: &CommunityConfig, now: i64) {
    if state.last_message_timestamp_millis != 0 {
        let elapsed_millis = now.saturating_sub(state.last_message_timestamp_millis).max(0);
        let elapsed_seconds = elapsed_millis as f64 / 1000.0;
        state.pressure -= config.pressure_dropoff * elapsed_seconds;
    }
    if state.pressure < 0.0 {
        state.pressure = 0.0;
    }
}
