//! Events module for gesture transitions
//!
//! Provides the gesture events the input state machine emits when a
//! recording begins or ends.

/// Events emitted by the input state machine during transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    /// Button held past the debounce interval
    PttStarted,

    /// Held button released
    PttReleased {
        /// Duration in milliseconds the button was held
        held_ms: u64,
    },

    /// Double-tap while idle
    ToggleStarted,

    /// Double-tap while toggle-recording
    ToggleStopped {
        /// Duration in milliseconds the toggle recording was active
        duration_ms: u64,
    },
}

impl Gesture {
    /// True for gestures that begin a recording session
    pub fn starts_recording(&self) -> bool {
        matches!(self, Gesture::PttStarted | Gesture::ToggleStarted)
    }

    /// Event name written to the log
    pub fn log_name(&self) -> &'static str {
        match self {
            Gesture::PttStarted => "ptt_start",
            Gesture::PttReleased { .. } => "ptt_release",
            Gesture::ToggleStarted => "doubletap_record_start",
            Gesture::ToggleStopped { .. } => "doubletap_record_stop",
        }
    }
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gesture::PttStarted => write!(f, "PTT_STARTED"),
            Gesture::PttReleased { held_ms } => write!(f, "PTT_RELEASED ({}ms)", held_ms),
            Gesture::ToggleStarted => write!(f, "TOGGLE_STARTED"),
            Gesture::ToggleStopped { duration_ms } => {
                write!(f, "TOGGLE_STOPPED ({}ms)", duration_ms)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_gestures() {
        assert!(Gesture::PttStarted.starts_recording());
        assert!(Gesture::ToggleStarted.starts_recording());
        assert!(!Gesture::PttReleased { held_ms: 10 }.starts_recording());
        assert!(!Gesture::ToggleStopped { duration_ms: 10 }.starts_recording());
    }

    #[test]
    fn test_display() {
        let event = Gesture::PttReleased { held_ms: 1500 };
        assert_eq!(event.to_string(), "PTT_RELEASED (1500ms)");
        assert_eq!(event.log_name(), "ptt_release");
    }
}
