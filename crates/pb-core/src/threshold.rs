//! # Threshold Evaluator
//!
//! Must run inside the same critical section that produced the pressure,
//! so a stale high score can never be observed by a second caller.

use crate::models::{CommunityConfig, PressureOutcome, UserPressureState};

/// Checks the ceiling and fully drains the score on breach.
pub fn evaluate(state: &mut UserPressureState, config: &CommunityConfig) -> PressureOutcome {
    let pressure = state.pressure;
    let breached = pressure > config.max_pressure;
    if breached {
        state.pressure = 0.0;
    }
    PressureOutcome { pressure, breached }
}
