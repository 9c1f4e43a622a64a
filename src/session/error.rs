use thiserror::Error;

/// Join/session failures surfaced synchronously to the caller
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not found")]
    NotFound,

    #[error("Session is full")]
    Full,

    #[error("Session is not joinable")]
    NotJoinable,

    #[error("Missing player or session identity")]
    MissingIdentity,

    #[error("Only the host can do that")]
    NotHost,

    #[error("Player token missing or wrong")]
    InvalidToken,

    #[error("Host did not acknowledge the join in time")]
    JoinTimeout,

    #[error("Session host is no longer running")]
    RelayClosed,
}

impl SessionError {
    /// Stable machine-readable code for clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "session_not_found",
            Self::Full => "session_full",
            Self::NotJoinable => "session_not_joinable",
            Self::MissingIdentity => "missing_identity",
            Self::NotHost => "not_host",
            Self::InvalidToken => "invalid_token",
            Self::JoinTimeout => "join_timeout",
            Self::RelayClosed => "relay_closed",
        }
    }
}
