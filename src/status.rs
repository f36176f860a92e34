use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Progress markers recorded on a `RequestContext` while it moves through the dispatcher.
///
/// # Behavior
/// Flags accumulate; a request that was routed, validated and handled carries
/// `ROUTED | VALIDATED | HANDLED`. Error flags are set by the failure boundary and are
/// what the access log reports.
#[derive(Clone, Copy, Debug, Default)]
pub struct DispatchState(pub u32);

impl DispatchState {
    pub const NONE: Self = Self(0);
    pub const ROUTED: Self = Self(1);
    pub const MIDDLEWARE_STOPPED: Self = Self(1 << 1);
    pub const VALIDATED: Self = Self(1 << 2);
    pub const HANDLED: Self = Self(1 << 3);
    pub const FALL_THROUGH: Self = Self(1 << 4);
    pub const REDIRECTED: Self = Self(1 << 5);
    pub const CLIENT_ERROR: Self = Self(1 << 6);
    pub const SERVER_ERROR: Self = Self(1 << 7);

    pub fn any_flags(&self, flags: DispatchState) -> bool {
        self.0 & flags.0 != 0
    }

    pub fn all_flags(&self, flags: DispatchState) -> bool {
        self.0 & flags.0 == flags.0
    }

    pub fn all_flags_clear(&self, flags: DispatchState) -> bool {
        self.0 & flags.0 == 0
    }

    pub fn is_error(&self) -> bool {
        self.any_flags(DispatchState::CLIENT_ERROR | DispatchState::SERVER_ERROR)
    }

    /// Flag used for an error response with the given HTTP status.
    pub fn for_error_status(status: u16) -> Self {
        if status >= 500 {
            DispatchState::SERVER_ERROR
        } else {
            DispatchState::CLIENT_ERROR
        }
    }
}

impl Display for DispatchState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:b}", self.0)
    }
}

impl PartialEq for DispatchState {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl BitOrAssign for DispatchState {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0
    }
}

impl BitAndAssign for DispatchState {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0
    }
}

impl Not for DispatchState {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl BitAnd for DispatchState {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for DispatchState {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::status::DispatchState;

    #[test]
    fn test_state_flags_accumulate() {
        let mut state = DispatchState::ROUTED;
        state |= DispatchState::HANDLED;
        assert!(state.all_flags(DispatchState::ROUTED | DispatchState::HANDLED));
        assert!(state.all_flags_clear(DispatchState::CLIENT_ERROR | DispatchState::SERVER_ERROR));
        assert!(!state.is_error());
    }

    #[test]
    fn test_error_flag_from_status() {
        assert_eq!(DispatchState::for_error_status(404), DispatchState::CLIENT_ERROR);
        assert_eq!(DispatchState::for_error_status(422), DispatchState::CLIENT_ERROR);
        assert_eq!(DispatchState::for_error_status(500), DispatchState::SERVER_ERROR);

        let mut state = DispatchState::ROUTED;
        state |= DispatchState::for_error_status(503);
        assert!(state.is_error());
        state &= !DispatchState::SERVER_ERROR;
        assert!(!state.is_error());
    }
}
