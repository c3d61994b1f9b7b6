//! Per-ring capture state.

use core::fmt;

/// Capture state of one per-CPU ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureState {
    /// Not capturing. Either never opened or closed. No writes may occur.
    Stopped = 0,

    /// Capturing.
    Started = 1,

    /// Open but not capturing. Hooks stay live process-wide; this ring
    /// declines new records so its consumer can drain what is there.
    Inactive = 2,
}

impl CaptureState {
    /// Whether a handle currently holds this ring.
    #[inline]
    pub const fn is_open(&self) -> bool {
        !matches!(self, CaptureState::Stopped)
    }

    /// Whether the recorder may append to this ring.
    #[inline]
    pub const fn accepts_records(&self) -> bool {
        matches!(self, CaptureState::Started)
    }
}

impl From<u8> for CaptureState {
    fn from(v: u8) -> Self {
        match v {
            1 => CaptureState::Started,
            2 => CaptureState::Inactive,
            _ => CaptureState::Stopped,
        }
    }
}

impl From<CaptureState> for u8 {
    fn from(state: CaptureState) -> u8 {
        state as u8
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Stopped => write!(f, "STOPPED"),
            CaptureState::Started => write!(f, "STARTED"),
            CaptureState::Inactive => write!(f, "INACTIVE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(!CaptureState::Stopped.is_open());
        assert!(CaptureState::Started.is_open());
        assert!(CaptureState::Inactive.is_open());

        assert!(CaptureState::Started.accepts_records());
        assert!(!CaptureState::Inactive.accepts_records());
        assert!(!CaptureState::Stopped.accepts_records());
    }

    #[test]
    fn test_state_u8_roundtrip() {
        for s in [CaptureState::Stopped, CaptureState::Started, CaptureState::Inactive] {
            assert_eq!(CaptureState::from(u8::from(s)), s);
        }
        assert_eq!(CaptureState::from(200), CaptureState::Stopped);
    }
}
