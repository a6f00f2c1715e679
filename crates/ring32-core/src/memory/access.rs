/// Kind of memory access requested from the MMU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AccessKind {
    /// Data load.
    Read,
    /// Data store.
    Write,
    /// Instruction fetch.
    Execute,
}

/// Privilege ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Ring {
    /// Unrestricted ring; may run privileged operations.
    #[default]
    System,
    /// Restricted ring.
    User,
}

impl Ring {
    /// Ring selected by the `R` flag.
    #[must_use]
    pub const fn from_user_flag(user: bool) -> Self {
        if user {
            Self::User
        } else {
            Self::System
        }
    }

    /// Returns `true` for the user ring.
    #[must_use]
    pub const fn is_user(self) -> bool {
        matches!(self, Self::User)
    }
}
