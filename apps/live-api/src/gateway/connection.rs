//! Per-connection lifecycle state machine.

use std::fmt;

use live_common::id::{prefix, prefixed_ulid};
use live_common::{ProjectId, Scope, UserId};

/// Why a connection was refused. `Display` is the exact text sent to the
/// client in `ConnectionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectError {
    InvalidProjectId,
    MissingToken,
    AuthenticationFailed,
    NotAuthorized,
}

impl ConnectError {
    pub fn message(self) -> &'static str {
        match self {
            ConnectError::InvalidProjectId => "No valid project ID given",
            ConnectError::MissingToken => "No bearer token given",
            ConnectError::AuthenticationFailed => "Authentication failed",
            ConnectError::NotAuthorized => "User is not authorized to connect to given project",
        }
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for ConnectError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Authorizing,
    Joined,
    Rejected(ConnectError),
    Closed,
}

impl ConnectionState {
    fn allows(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Authorizing)
                | (Authorizing, Joined)
                | (Connecting | Authenticating | Authorizing, Rejected(_))
                | (Joined | Rejected(_), Closed)
        )
    }
}

/// Returned when a transition is not part of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal connection transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// One live client session, owned by the gateway task serving it.
#[derive(Debug)]
pub struct Connection {
    /// Opaque gateway-assigned id (`conn_` prefixed ULID).
    pub id: String,
    /// Parsed from the connection request once valid.
    pub project_id: Option<ProjectId>,
    /// Set once the credential resolves to an identity.
    pub user_id: Option<UserId>,
    state: ConnectionState,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: prefixed_ulid(prefix::CONNECTION),
            project_id: None,
            user_id: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn advance(&mut self, next: ConnectionState) -> Result<(), IllegalTransition> {
        if !self.state.allows(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Move to `Rejected` and hand back the reason for reporting.
    pub fn reject(&mut self, reason: ConnectError) -> Result<ConnectError, IllegalTransition> {
        self.advance(ConnectionState::Rejected(reason))?;
        Ok(reason)
    }

    /// The channels a joined connection belongs to: its project and its user.
    pub fn scopes(&self) -> Vec<Scope> {
        match (self.state, self.project_id, self.user_id) {
            (ConnectionState::Joined, Some(project), Some(user)) => {
                vec![Scope::Project(project), Scope::User(user)]
            }
            _ => Vec::new(),
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
