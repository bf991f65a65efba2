//! Interest and readiness masks exchanged with the OS poller.

/// Events a descriptor is registered for.
///
/// Hangup is not part of the mask: the OS reports it unconditionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Interest {
    readable: bool,
    writable: bool,
}

impl Interest {
    /// No readable or writable interest.
    pub const NONE: Self = Self {
        readable: false,
        writable: false,
    };

    /// Interest in readability only.
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
    };

    /// Interest in writability only.
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
    };

    /// Combines two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
        }
    }

    /// Whether readability is requested.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.readable
    }

    /// Whether writability is requested.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.writable
    }
}

/// Events reported ready for one descriptor by a single wait.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Readiness {
    /// Data can be read without blocking.
    pub readable: bool,
    /// Data can be written without blocking.
    pub writable: bool,
    /// The peer hung up or the descriptor is in error.
    pub hangup: bool,
}

impl Readiness {
    /// Readiness with only the readable bit set.
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
        hangup: false,
    };

    /// Readiness with only the writable bit set.
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
        hangup: false,
    };

    /// Readiness with only the hangup bit set.
    pub const HANGUP: Self = Self {
        readable: false,
        writable: false,
        hangup: true,
    };

    /// Combines two readiness reports.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            readable: self.readable || other.readable,
            writable: self.writable || other.writable,
            hangup: self.hangup || other.hangup,
        }
    }

    /// Whether every bit has been consumed.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        !(self.readable || self.writable || self.hangup)
    }
}
