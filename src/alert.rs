//! Alert State Machine.
//!
//! Counts consecutive frames that contain at least one unknown face and
//! decides when an intruder alert is due. The update is a pure function of
//! (state, frame, now, policy); sending the alert is the caller's job.
//!
//! Rules:
//!   - no unknown face in the frame → streak resets to 0, nothing else
//!   - ≥1 unknown face → streak += 1 (once per frame, not per face)
//!   - fire when streak ≥ threshold and `now - last_alert_at > cooldown`
//!   - on fire: `last_alert_at = now`, streak resets to 0
//!   - alerting disabled → streak is tracked, nothing ever fires

use chrono::{DateTime, Duration, Utc};

use crate::classifier::FrameResult;

/// Thresholds that drive the state machine. Fixed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Consecutive unknown frames needed before an alert (≥ 1).
    pub unknown_threshold: u32,
    /// Minimum time between two alerts.
    pub cooldown: Duration,
    /// `false` when no phone number is configured.
    pub enabled: bool,
}

impl AlertPolicy {
    pub fn new(unknown_threshold: u32, cooldown_secs: u64, enabled: bool) -> Self {
        Self {
            unknown_threshold: unknown_threshold.max(1),
            cooldown: i64::try_from(cooldown_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub unknown_streak: u32,
    /// `None` until the first alert of the session.
    pub last_alert_at: Option<DateTime<Utc>>,
}

/// What the caller should do after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// No unknown face this frame; the streak was reset.
    Clear,
    /// Unknown presence below the threshold.
    Building { streak: u32 },
    /// Threshold reached but the last alert is too recent.
    CoolingDown { streak: u32 },
    /// Threshold reached with alerting disabled.
    Disabled { streak: u32 },
    /// Send the alert now. `streak` is the count that triggered it.
    Fire { streak: u32 },
}

impl AlertDecision {
    pub fn fires(&self) -> bool {
        matches!(self, AlertDecision::Fire { .. })
    }
}

impl AlertState {
    /// Whether the cooldown window since the last alert has passed.
    fn cooled_down(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_alert_at {
            None => true,
            Some(last) => now.signed_duration_since(last) > cooldown,
        }
    }
}

/// Advance the state by one frame.
pub fn update(
    state: AlertState,
    frame: &FrameResult,
    now: DateTime<Utc>,
    policy: &AlertPolicy,
) -> (AlertState, AlertDecision) {
    if !frame.has_unknown() {
        return (AlertState { unknown_streak: 0, ..state }, AlertDecision::Clear);
    }

    let streak = state.unknown_streak.saturating_add(1);
    let next = AlertState { unknown_streak: streak, ..state };

    if streak < policy.unknown_threshold {
        return (next, AlertDecision::Building { streak });
    }
    if !policy.enabled {
        return (next, AlertDecision::Disabled { streak });
    }
    if !state.cooled_down(now, policy.cooldown) {
        return (next, AlertDecision::CoolingDown { streak });
    }

    let fired = AlertState { unknown_streak: 0, last_alert_at: Some(now) };
    (fired, AlertDecision::Fire { streak })
}
