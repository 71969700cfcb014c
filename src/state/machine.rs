//! Core gesture state machine implementation
//!
//! Classifies button samples into push-to-talk and double-tap toggle
//! gestures. Push-to-talk takes strict precedence: while a held-button
//! session is active no tap is interpreted.

use std::time::Duration;

use tracing::{debug, info};

use crate::events::Gesture;

/// One sample of the button line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub pressed: bool,
    pub timestamp_ms: u64,
}

/// The four gesture states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    /// Not recording, no pending tap
    Idle,
    /// Recording while the button is held
    PttActive { since_ms: u64 },
    /// One tap seen, a second one within the window toggles recording
    DoubleTapArmed { last_press_ms: u64 },
    /// Recording after a double-tap, independent of the button
    ToggleRecording {
        since_ms: u64,
        last_press_ms: Option<u64>,
    },
}

impl Default for GestureState {
    fn default() -> Self {
        Self::Idle
    }
}

impl GestureState {
    /// True while a recording session belongs to this state
    pub fn is_recording(&self) -> bool {
        matches!(
            self,
            GestureState::PttActive { .. } | GestureState::ToggleRecording { .. }
        )
    }
}

impl std::fmt::Display for GestureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GestureState::Idle => write!(f, "Idle"),
            GestureState::PttActive { .. } => write!(f, "PttActive"),
            GestureState::DoubleTapArmed { .. } => write!(f, "DoubleTapArmed"),
            GestureState::ToggleRecording { .. } => write!(f, "ToggleRecording"),
        }
    }
}

/// Result of feeding one sample to the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    /// The sample was a press following a released sample
    pub rising_edge: bool,
    pub gesture: Option<Gesture>,
}

/// The state machine that turns button samples into gestures
pub struct InputStateMachine {
    /// Current state
    state: GestureState,
    /// Previous sample (for edge detection)
    prev_pressed: bool,
    /// Window for the second tap
    double_tap_ms: u64,
}

impl InputStateMachine {
    /// Create a new state machine
    pub fn new(double_tap: Duration) -> Self {
        Self {
            state: GestureState::Idle,
            prev_pressed: false,
            double_tap_ms: double_tap.as_millis() as u64,
        }
    }

    /// Get the current state
    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Whether this sample must be confirmed after the debounce interval
    /// before `advance` is called. Only a fresh press that could begin a
    /// push-to-talk session is debounced.
    pub fn needs_debounce(&self, pressed: bool) -> bool {
        pressed
            && !self.prev_pressed
            && matches!(
                self.state,
                GestureState::Idle | GestureState::DoubleTapArmed { .. }
            )
    }

    /// Feed one sample. `confirmed` is the debounced re-sample for presses
    /// that needed one, false otherwise.
    pub fn advance(&mut self, event: InputEvent, confirmed: bool) -> Transition {
        let rising_edge = event.pressed && !self.prev_pressed;
        self.prev_pressed = event.pressed;

        let next = self.compute_next_state(event, rising_edge, confirmed);
        let gesture = self.gesture_for(next, event.timestamp_ms);

        if next != self.state {
            debug!(from = %self.state, to = %next, "gesture transition");
            self.state = next;
        }
        if let Some(g) = gesture {
            info!(event = %g, "gesture");
        }

        Transition {
            rising_edge,
            gesture,
        }
    }

    /// Drop back to Idle, e.g. when a session could not start or after a
    /// loop fault. The current button level is kept for edge detection.
    pub fn reset(&mut self) {
        if self.state != GestureState::Idle {
            info!(from = %self.state, "gesture state reset");
        }
        self.state = GestureState::Idle;
    }

    /// Compute the next state based on current state and the sample
    fn compute_next_state(
        &self,
        event: InputEvent,
        rising_edge: bool,
        confirmed: bool,
    ) -> GestureState {
        let now = event.timestamp_ms;
        match self.state {
            GestureState::PttActive { .. } if !event.pressed => GestureState::Idle,
            // Held-button sessions are never reinterpreted as taps
            GestureState::PttActive { .. } => self.state,

            GestureState::Idle | GestureState::DoubleTapArmed { .. }
                if rising_edge && confirmed =>
            {
                GestureState::PttActive { since_ms: now }
            }
            GestureState::DoubleTapArmed { last_press_ms }
                if rising_edge && self.within_window(last_press_ms, now) =>
            {
                GestureState::ToggleRecording {
                    since_ms: now,
                    last_press_ms: None,
                }
            }
            GestureState::Idle | GestureState::DoubleTapArmed { .. } if rising_edge => {
                GestureState::DoubleTapArmed { last_press_ms: now }
            }

            GestureState::ToggleRecording {
                last_press_ms: Some(last),
                ..
            } if rising_edge && self.within_window(last, now) => GestureState::Idle,
            GestureState::ToggleRecording { since_ms, .. } if rising_edge => {
                GestureState::ToggleRecording {
                    since_ms,
                    last_press_ms: Some(now),
                }
            }

            _ => self.state,
        }
    }

    fn within_window(&self, last_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(last_ms) <= self.double_tap_ms
    }

    /// The gesture implied by moving from the current state to `next`
    fn gesture_for(&self, next: GestureState, now_ms: u64) -> Option<Gesture> {
        match (self.state, next) {
            (GestureState::PttActive { .. }, GestureState::PttActive { .. }) => None,
            (_, GestureState::PttActive { .. }) => Some(Gesture::PttStarted),
            (GestureState::PttActive { since_ms }, _) => Some(Gesture::PttReleased {
                held_ms: now_ms.saturating_sub(since_ms),
            }),
            (GestureState::ToggleRecording { .. }, GestureState::ToggleRecording { .. }) => None,
            (_, GestureState::ToggleRecording { .. }) => Some(Gesture::ToggleStarted),
            (GestureState::ToggleRecording { since_ms, .. }, _) => {
                Some(Gesture::ToggleStopped {
                    duration_ms: now_ms.saturating_sub(since_ms),
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_state_machine() -> InputStateMachine {
        InputStateMachine::new(Duration::from_millis(400))
    }

    fn press(at: u64) -> InputEvent {
        InputEvent {
            pressed: true,
            timestamp_ms: at,
        }
    }

    fn release(at: u64) -> InputEvent {
        InputEvent {
            pressed: false,
            timestamp_ms: at,
        }
    }

    /// A tap shorter than the debounce interval
    fn tap(sm: &mut InputStateMachine, at: u64) -> Option<Gesture> {
        assert!(sm.needs_debounce(true) || sm.state().is_recording());
        let t = sm.advance(press(at), false);
        sm.advance(release(at + 20), false);
        t.gesture
    }

    #[test]
    fn test_initial_state() {
        let sm = create_state_machine();
        assert_eq!(sm.state(), GestureState::Idle);
    }

    #[test]
    fn test_confirmed_press_starts_ptt() {
        let mut sm = create_state_machine();
        assert!(sm.needs_debounce(true));

        let t = sm.advance(press(0), true);
        assert!(t.rising_edge);
        assert_eq!(t.gesture, Some(Gesture::PttStarted));

        // still held: nothing new
        assert_eq!(sm.advance(press(30), false).gesture, None);

        let t = sm.advance(release(2000), false);
        assert_eq!(t.gesture, Some(Gesture::PttReleased { held_ms: 2000 }));
        assert_eq!(sm.state(), GestureState::Idle);
    }

    #[test]
    fn test_unconfirmed_press_never_records() {
        let mut sm = create_state_machine();
        let t = sm.advance(press(0), false);
        assert!(t.rising_edge);
        assert_eq!(t.gesture, None);
        assert!(!sm.state().is_recording());
        assert_eq!(sm.advance(release(10), false).gesture, None);
        assert!(!sm.state().is_recording());
    }

    #[test]
    fn test_double_tap_toggles_recording() {
        let mut sm = create_state_machine();
        assert_eq!(tap(&mut sm, 0), None);
        assert_eq!(tap(&mut sm, 150), Some(Gesture::ToggleStarted));
        assert!(sm.state().is_recording());

        assert_eq!(tap(&mut sm, 300), None);
        assert_eq!(
            tap(&mut sm, 450),
            Some(Gesture::ToggleStopped { duration_ms: 300 })
        );
        assert_eq!(sm.state(), GestureState::Idle);
    }

    #[test]
    fn test_double_tap_window_is_inclusive() {
        let mut sm = create_state_machine();
        tap(&mut sm, 1000);
        assert_eq!(tap(&mut sm, 1400), Some(Gesture::ToggleStarted));
    }

    #[test]
    fn test_slow_second_tap_rearms_window() {
        let mut sm = create_state_machine();
        tap(&mut sm, 0);
        assert_eq!(tap(&mut sm, 401), None);
        assert_eq!(sm.state(), GestureState::DoubleTapArmed { last_press_ms: 401 });
        assert_eq!(tap(&mut sm, 700), Some(Gesture::ToggleStarted));
    }

    #[test]
    fn test_slow_taps_do_not_stop_toggle_recording() {
        let mut sm = create_state_machine();
        tap(&mut sm, 0);
        tap(&mut sm, 100);
        assert_eq!(tap(&mut sm, 1000), None);
        assert_eq!(tap(&mut sm, 2000), None);
        assert!(sm.state().is_recording());
    }

    #[test]
    fn test_ptt_precedence_over_taps() {
        let mut sm = create_state_machine();
        tap(&mut sm, 0);
        // a confirmed press inside the double-tap window is still push-to-talk
        assert_eq!(sm.advance(press(100), true).gesture, Some(Gesture::PttStarted));

        for t in (130..2000).step_by(30) {
            assert!(!sm.needs_debounce(true));
            assert_eq!(sm.advance(press(t), true).gesture, None);
        }
        assert!(matches!(sm.state(), GestureState::PttActive { .. }));
    }

    #[test]
    fn test_held_button_after_toggle_stop_is_not_ptt() {
        let mut sm = create_state_machine();
        tap(&mut sm, 0);
        tap(&mut sm, 100);
        tap(&mut sm, 200);
        // second stop tap is held down
        assert!(sm.advance(press(300), false).gesture.is_some());
        assert!(!sm.needs_debounce(true));
        assert_eq!(sm.advance(press(330), false).gesture, None);
        assert_eq!(sm.state(), GestureState::Idle);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut sm = create_state_machine();
        sm.advance(press(0), true);
        sm.reset();
        assert_eq!(sm.state(), GestureState::Idle);
        // button is still held: no fresh edge
        assert!(!sm.needs_debounce(true));
    }
}
