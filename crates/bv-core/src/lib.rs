//! Core trigger semantics and domain entities for beadview.
//!
//! The tutorial trigger keys are unreliable to detect as a physical lock key
//! across terminals, so the bindings default to two printable fallbacks
//! (backtick for the full tutorial, tilde for context help). A double-tap
//! gesture is layered on top of whichever key is configured as primary and
//! is resolved by [`TapTracker`].

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default key that opens the full tutorial.
pub const DEFAULT_TUTORIAL_KEY: &str = "`";

/// Default key that opens context help. Shift+backtick on most layouts.
pub const DEFAULT_CONTEXT_HELP_KEY: &str = "~";

/// Default window for a second tap to count as a double tap.
pub const DEFAULT_DOUBLE_TAP_THRESHOLD: Duration = Duration::from_millis(300);

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by core validation rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Returned when a validation rule is violated.
    #[error("validation error: {0}")]
    Validation(String),
}

/// The classified intent behind a trigger key press.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    /// Nothing to open (yet).
    #[default]
    None,
    /// Open the full tutorial.
    FullTutorial,
    /// Open help for the current view only.
    ContextHelp,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TriggerKind::None => "none",
            TriggerKind::FullTutorial => "full tutorial",
            TriggerKind::ContextHelp => "context help",
        };
        f.write_str(label)
    }
}

/// Which semantic trigger a key maps to under a [`BindingSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerKey {
    /// The direct tutorial key.
    DirectTutorial,
    /// The context help key.
    ContextHelp,
    /// Not a trigger key.
    Neither,
}

/// A request for the host to call [`TapTracker::handle_timer_expired`] once
/// `delay` has elapsed.
///
/// Requests carry no identity; stale deliveries are resolved by the tracker
/// checking its own state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerRequest {
    delay: Duration,
}

impl TimerRequest {
    /// How long the host must wait before delivering the expiry.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// Key bindings for tutorial access.
///
/// Matching is exact, case-sensitive string equality against the key's
/// canonical textual form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSet {
    /// Key for direct tutorial access.
    pub direct_tutorial: String,
    /// Key for direct context help.
    pub context_help: String,
    /// Whether space inside the help modal opens the tutorial.
    pub help_modal_space: bool,
    /// Whether double-tap detection is enabled on the direct tutorial key.
    pub double_tap: bool,
}

impl Default for BindingSet {
    fn default() -> Self {
        Self {
            direct_tutorial: DEFAULT_TUTORIAL_KEY.into(),
            context_help: DEFAULT_CONTEXT_HELP_KEY.into(),
            help_modal_space: true,
            double_tap: true,
        }
    }
}

impl BindingSet {
    /// Create a binding set, rejecting empty keys and keys bound twice.
    pub fn new(
        direct_tutorial: impl Into<String>,
        context_help: impl Into<String>,
        help_modal_space: bool,
        double_tap: bool,
    ) -> CoreResult<Self> {
        let direct_tutorial = direct_tutorial.into();
        if direct_tutorial.is_empty() {
            return Err(CoreError::Validation("tutorial key cannot be empty".into()));
        }
        let context_help = context_help.into();
        if context_help.is_empty() {
            return Err(CoreError::Validation(
                "context help key cannot be empty".into(),
            ));
        }
        if direct_tutorial == context_help {
            return Err(CoreError::Validation(format!(
                "key {direct_tutorial:?} cannot be bound to both tutorial and context help"
            )));
        }
        Ok(Self {
            direct_tutorial,
            context_help,
            help_modal_space,
            double_tap,
        })
    }

    /// Check if the key matches the direct tutorial binding.
    pub fn is_direct_tutorial(&self, key: &str) -> bool {
        key == self.direct_tutorial
    }

    /// Check if the key matches the context help binding.
    pub fn is_context_help(&self, key: &str) -> bool {
        key == self.context_help
    }

    /// Classify a canonical key string. Unmatched input, including the empty
    /// string, is [`TriggerKey::Neither`].
    pub fn classify(&self, key: &str) -> TriggerKey {
        if self.is_direct_tutorial(key) {
            TriggerKey::DirectTutorial
        } else if self.is_context_help(key) {
            TriggerKey::ContextHelp
        } else {
            TriggerKey::Neither
        }
    }

    /// A user-facing hint naming both trigger keys.
    pub fn hint(&self) -> String {
        format!(
            "{} tutorial | {} context help",
            self.direct_tutorial, self.context_help
        )
    }
}

/// Double-tap detector for the tutorial trigger key.
///
/// Idle until a press arrives; then waits up to `threshold` for a second
/// press (context help) or a timer expiry (full tutorial). Callers pass the
/// press time in, so the tracker never reads a clock itself.
#[derive(Clone, Debug)]
pub struct TapTracker {
    last_press: Option<Instant>,
    threshold: Duration,
}

impl Default for TapTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TapTracker {
    /// Create a tracker with the default 300ms threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_DOUBLE_TAP_THRESHOLD)
    }

    /// Create a tracker with a custom threshold.
    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            last_press: None,
            threshold,
        }
    }

    /// The double-tap window.
    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Process a trigger key press made at `now`.
    ///
    /// Returns [`TriggerKind::ContextHelp`] with no timer when this press
    /// lands strictly inside the window opened by the previous one.
    /// Otherwise the press opens a new window and returns
    /// [`TriggerKind::None`] with a timer request for the threshold.
    pub fn handle_press(&mut self, now: Instant) -> (TriggerKind, Option<TimerRequest>) {
        if let Some(last) = self.last_press {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.threshold {
                self.last_press = None;
                tracing::trace!(?elapsed, "double tap detected");
                return (TriggerKind::ContextHelp, None);
            }
        }

        // An expired window whose timer has not fired yet counts as idle.
        self.last_press = Some(now);
        tracing::trace!(threshold = ?self.threshold, "awaiting second tap");
        (
            TriggerKind::None,
            Some(TimerRequest {
                delay: self.threshold,
            }),
        )
    }

    /// Process a timer expiry. Returns [`TriggerKind::FullTutorial`] if a
    /// tap was waiting, [`TriggerKind::None`] for a stale or spurious expiry.
    pub fn handle_timer_expired(&mut self) -> TriggerKind {
        if self.last_press.take().is_some() {
            tracing::trace!("single tap resolved");
            TriggerKind::FullTutorial
        } else {
            TriggerKind::None
        }
    }

    /// Abandon any in-flight tap.
    pub fn reset(&mut self) {
        self.last_press = None;
    }

    /// True while waiting for a potential second tap.
    pub fn is_pending(&self) -> bool {
        self.last_press.is_some()
    }
}

/// Lifecycle status of a bead.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BeadStatus {
    /// Ready to be worked on.
    #[default]
    Open,
    /// Someone is on it.
    InProgress,
    /// Waiting on another bead.
    Blocked,
    /// Done.
    Closed,
    /// Any status this build does not know about.
    #[serde(other)]
    Unknown,
}

impl BeadStatus {
    /// Short label used in listings.
    pub fn as_str(self) -> &'static str {
        match self {
            BeadStatus::Open => "open",
            BeadStatus::InProgress => "in_progress",
            BeadStatus::Blocked => "blocked",
            BeadStatus::Closed => "closed",
            BeadStatus::Unknown => "unknown",
        }
    }
}

fn default_priority() -> u8 {
    2
}

/// A single work item.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Bead {
    /// Identifier such as `bd-a1b2`.
    pub id: String,
    /// Human-readable title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Current status.
    #[serde(default)]
    pub status: BeadStatus,
    /// Priority, 0 being the most urgent.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Issue type such as `bug` or `task`.
    #[serde(default)]
    pub issue_type: String,
    /// Creation time, when recorded.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn new_tracker_uses_default_threshold() {
        let tracker = TapTracker::new();
        assert_eq!(tracker.threshold(), ms(300));
        assert!(!tracker.is_pending());
    }

    #[test]
    fn custom_threshold_is_kept() {
        let tracker = TapTracker::with_threshold(ms(500));
        assert_eq!(tracker.threshold(), ms(500));
    }

    #[test]
    fn first_press_requests_timer() {
        let mut tracker = TapTracker::new();
        let (trigger, timer) = tracker.handle_press(Instant::now());
        assert_eq!(trigger, TriggerKind::None);
        assert_eq!(timer.map(|t| t.delay()), Some(ms(300)));
        assert!(tracker.is_pending());
    }

    #[test]
    fn second_press_inside_window_is_context_help() {
        let mut tracker = TapTracker::new();
        let t0 = Instant::now();
        tracker.handle_press(t0);

        let (trigger, timer) = tracker.handle_press(t0 + ms(100));
        assert_eq!(trigger, TriggerKind::ContextHelp);
        assert!(timer.is_none());
        assert!(!tracker.is_pending());
    }

    #[test]
    fn second_press_after_window_is_new_single_tap() {
        let mut tracker = TapTracker::new();
        let t0 = Instant::now();
        tracker.handle_press(t0);

        let (trigger, timer) = tracker.handle_press(t0 + ms(450));
        assert_eq!(trigger, TriggerKind::None);
        assert!(timer.is_some());
        assert!(tracker.is_pending());

        // The new window is measured from the second press.
        let (trigger, _) = tracker.handle_press(t0 + ms(500));
        assert_eq!(trigger, TriggerKind::ContextHelp);
    }

    #[test]
    fn press_exactly_at_threshold_is_single_tap() {
        let mut tracker = TapTracker::new();
        let t0 = Instant::now();
        tracker.handle_press(t0);

        let (trigger, timer) = tracker.handle_press(t0 + ms(300));
        assert_eq!(trigger, TriggerKind::None);
        assert!(timer.is_some());
    }

    #[test]
    fn timer_expiry_resolves_full_tutorial() {
        let mut tracker = TapTracker::new();
        tracker.handle_press(Instant::now());

        assert_eq!(tracker.handle_timer_expired(), TriggerKind::FullTutorial);
        assert!(!tracker.is_pending());
    }

    #[test]
    fn timer_expiry_when_idle_is_none() {
        let mut tracker = TapTracker::new();
        assert_eq!(tracker.handle_timer_expired(), TriggerKind::None);
        assert!(!tracker.is_pending());
    }

    #[test]
    fn stale_timer_after_double_tap_is_none() {
        let mut tracker = TapTracker::new();
        let t0 = Instant::now();
        tracker.handle_press(t0);
        tracker.handle_press(t0 + ms(50));

        assert_eq!(tracker.handle_timer_expired(), TriggerKind::None);
        assert!(!tracker.is_pending());
    }

    #[test]
    fn press_after_expiry_never_pairs_with_old_press() {
        let mut tracker = TapTracker::with_threshold(ms(1));
        let t0 = Instant::now();
        tracker.handle_press(t0);
        assert_eq!(tracker.handle_timer_expired(), TriggerKind::FullTutorial);

        let (trigger, timer) = tracker.handle_press(t0 + ms(5));
        assert_eq!(trigger, TriggerKind::None);
        assert!(timer.is_some());
    }

    #[test]
    fn zero_threshold_never_double_taps() {
        let mut tracker = TapTracker::with_threshold(Duration::ZERO);
        let t0 = Instant::now();
        tracker.handle_press(t0);
        let (trigger, timer) = tracker.handle_press(t0);
        assert_eq!(trigger, TriggerKind::None);
        assert_eq!(timer.map(|t| t.delay()), Some(Duration::ZERO));
    }

    #[test]
    fn reset_clears_pending_state() {
        let mut tracker = TapTracker::new();
        let t0 = Instant::now();
        tracker.handle_press(t0);
        assert!(tracker.is_pending());

        tracker.reset();
        assert!(!tracker.is_pending());

        // A press right after reset starts fresh rather than pairing.
        let (trigger, _) = tracker.handle_press(t0 + ms(10));
        assert_eq!(trigger, TriggerKind::None);

        tracker.reset();
        tracker.reset();
        assert!(!tracker.is_pending());
    }

    #[test]
    fn trigger_kind_display() {
        assert_eq!(TriggerKind::None.to_string(), "none");
        assert_eq!(TriggerKind::FullTutorial.to_string(), "full tutorial");
        assert_eq!(TriggerKind::ContextHelp.to_string(), "context help");
    }

    #[test]
    fn default_bindings() {
        let bindings = BindingSet::default();
        assert_eq!(bindings.direct_tutorial, "`");
        assert_eq!(bindings.context_help, "~");
        assert!(bindings.help_modal_space);
        assert!(bindings.double_tap);
    }

    #[test]
    fn classify_matches_exactly() {
        let bindings = BindingSet::default();
        assert_eq!(bindings.classify("`"), TriggerKey::DirectTutorial);
        assert_eq!(bindings.classify("~"), TriggerKey::ContextHelp);
        assert_eq!(bindings.classify("x"), TriggerKey::Neither);
        assert_eq!(bindings.classify(""), TriggerKey::Neither);
        assert_eq!(bindings.classify("``"), TriggerKey::Neither);
    }

    #[test]
    fn custom_bindings_are_case_sensitive() {
        let bindings = BindingSet {
            direct_tutorial: "t".into(),
            context_help: "T".into(),
            help_modal_space: false,
            double_tap: false,
        };
        assert!(bindings.is_direct_tutorial("t"));
        assert!(!bindings.is_direct_tutorial("T"));
        assert!(bindings.is_context_help("T"));
        assert!(!bindings.is_context_help("t"));
    }

    #[test]
    fn binding_set_rejects_bad_keys() {
        assert!(matches!(
            BindingSet::new("", "~", true, true),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            BindingSet::new("`", "", true, true),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            BindingSet::new("t", "t", true, true),
            Err(CoreError::Validation(_))
        ));
        assert!(BindingSet::new("t", "T", true, true).is_ok());
    }

    #[test]
    fn hint_names_both_keys() {
        insta::assert_snapshot!(BindingSet::default().hint(), @"` tutorial | ~ context help");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Copy, Debug)]
    enum Op {
        Press { gap_ms: u64 },
        Expire,
        Reset,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u64..1_000).prop_map(|gap_ms| Op::Press { gap_ms }),
            Just(Op::Expire),
            Just(Op::Reset),
        ]
    }

    proptest! {
        /// A second press strictly inside the window is context help; at or
        /// past the window it opens a fresh one.
        #[test]
        fn second_press_splits_on_threshold(
            threshold_ms in 0u64..2_000,
            d_ms in 0u64..4_000,
        ) {
            let threshold = Duration::from_millis(threshold_ms);
            let d = Duration::from_millis(d_ms);
            let mut taps = TapTracker::with_threshold(threshold);
            let t0 = Instant::now();

            let (kind, timer) = taps.handle_press(t0);
            prop_assert_eq!(kind, TriggerKind::None);
            prop_assert_eq!(timer.map(|request| request.delay()), Some(threshold));

            let (kind, timer) = taps.handle_press(t0 + d);
            if d < threshold {
                prop_assert_eq!(kind, TriggerKind::ContextHelp);
                prop_assert!(timer.is_none());
                prop_assert!(!taps.is_pending());
            } else {
                prop_assert_eq!(kind, TriggerKind::None);
                prop_assert_eq!(timer.map(|request| request.delay()), Some(threshold));
                prop_assert!(taps.is_pending());
            }
        }

        /// Arbitrary interleavings keep the tracker in step with a
        /// one-timestamp model; reset always idles and idle expiries are inert.
        #[test]
        fn tracker_follows_model(
            threshold_ms in 0u64..1_000,
            ops in proptest::collection::vec(arb_op(), 1..64),
        ) {
            let threshold = Duration::from_millis(threshold_ms);
            let mut taps = TapTracker::with_threshold(threshold);
            let mut now = Instant::now();
            let mut model: Option<Instant> = None;

            for op in ops {
                match op {
                    Op::Press { gap_ms } => {
                        now += Duration::from_millis(gap_ms);
                        let (kind, timer) = taps.handle_press(now);
                        match model {
                            Some(prev) if now - prev < threshold => {
                                prop_assert_eq!(kind, TriggerKind::ContextHelp);
                                prop_assert!(timer.is_none());
                                model = None;
                            }
                            _ => {
                                prop_assert_eq!(kind, TriggerKind::None);
                                prop_assert!(timer.is_some());
                                model = Some(now);
                            }
                        }
                    }
                    Op::Expire => {
                        let expected = if model.is_some() {
                            TriggerKind::FullTutorial
                        } else {
                            TriggerKind::None
                        };
                        prop_assert_eq!(taps.handle_timer_expired(), expected);
                        model = None;
                    }
                    Op::Reset => {
                        taps.reset();
                        prop_assert!(!taps.is_pending());
                        prop_assert_eq!(taps.handle_timer_expired(), TriggerKind::None);
                        model = None;
                    }
                }
                prop_assert_eq!(taps.is_pending(), model.is_some());
            }
        }
    }
}
