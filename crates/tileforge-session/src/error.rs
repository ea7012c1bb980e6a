//! Error types for the session layer.

/// Account and presence failures. Each maps to a client-facing code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// REGISTER for a name that already has an account.
    #[error("account {0} already exists")]
    Exists(String),

    /// LOGIN for a name with no account.
    #[error("no account named {0}")]
    NotFound(String),

    /// The password did not verify, or the account has no usable
    /// credential at all.
    #[error("wrong password for {0}")]
    WrongPassword(String),

    /// The name is live and bound to a different endpoint.
    #[error("name {0} is in use from another endpoint")]
    NameTaken(String),
}

impl SessionError {
    /// Wire error code, e.g. `not_found`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exists(_) => "exists",
            Self::NotFound(_) => "not_found",
            Self::WrongPassword(_) => "wrong_password",
            Self::NameTaken(_) => "name_taken",
        }
    }
}
