//! Next-run computation for windowed, repeating tests.
//!
//! Times are wall-clock milliseconds. The window is `[start, end)` measured
//! from the beginning of each repeat cycle; a `None` repeat has a single
//! unbounded cycle whose phase is always zero, so its window must open at
//! zero and only its end bounds the interval.

use super::types::Repeat;

/// Next time a test may run after a run at `now_ms`.
///
/// Returns `None` when the test never runs again: an empty window, a `None`
/// repeat whose window cannot hold its next run, or arithmetic overflow.
pub fn next_run_time(now_ms: u64, repeat: Repeat, start: u64, end: u64, interval: u64) -> Option<u64> {
    if !window_is_reachable(repeat, start, end) {
        return None;
    }

    let phase = phase_of(now_ms, repeat);

    if phase < start {
        return now_ms.checked_add(start - phase);
    }
    if phase >= end {
        return next_cycle_start(now_ms, repeat, phase, start);
    }

    match phase.checked_add(interval) {
        Some(candidate) if candidate < end => now_ms.checked_add(interval),
        _ => next_cycle_start(now_ms, repeat, phase, start),
    }
}

/// First run after a schedule is loaded at `now_ms`.
///
/// Runs are placed on the grid `start + k * interval` inside the window so
/// that reloading the schedule or restarting the daemon keeps run times stable.
pub fn first_run_time(now_ms: u64, repeat: Repeat, start: u64, end: u64, interval: u64) -> Option<u64> {
    if !window_is_reachable(repeat, start, end) || interval == 0 {
        return None;
    }

    let phase = phase_of(now_ms, repeat);

    if phase < start {
        return now_ms.checked_add(start - phase);
    }
    if phase >= end {
        return next_cycle_start(now_ms, repeat, phase, start);
    }

    let wait = (interval - (phase - start) % interval) % interval;
    match phase.checked_add(wait) {
        Some(candidate) if candidate < end => now_ms.checked_add(wait),
        _ => next_cycle_start(now_ms, repeat, phase, start),
    }
}

/// Elapsed time within the current cycle
pub fn phase_of(now_ms: u64, repeat: Repeat) -> u64 {
    repeat.cycle_ms().map_or(0, |cycle| now_ms % cycle)
}

/// A `None` cycle never advances past phase zero
fn window_is_reachable(repeat: Repeat, start: u64, end: u64) -> bool {
    start < end && (repeat.cycle_ms().is_some() || start == 0)
}

fn next_cycle_start(now_ms: u64, repeat: Repeat, phase: u64, start: u64) -> Option<u64> {
    let cycle = repeat.cycle_ms()?;
    now_ms.checked_add(cycle - phase)?.checked_add(start)
}
