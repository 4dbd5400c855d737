//! Admission of a new connection: project id, credential, membership.

use live_common::id::parse_project_id;

use crate::auth::Authenticator;
use crate::membership::ProjectMembership;

use super::connection::{ConnectError, Connection, ConnectionState};

/// What the client supplied out-of-band on the connection request.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub project_id: Option<String>,
    pub token: Option<String>,
}

/// Run the admission checks in order, advancing `conn` through the
/// lifecycle. On success the connection is `Joined`; on failure it is
/// `Rejected` with the returned reason and nothing has been joined.
pub async fn admit(
    conn: &mut Connection,
    request: &ConnectRequest,
    authenticator: &dyn Authenticator,
    membership: &dyn ProjectMembership,
) -> Result<(), ConnectError> {
    let Some(project_id) = request.project_id.as_deref().and_then(parse_project_id) else {
        return Err(reject(conn, ConnectError::InvalidProjectId));
    };
    conn.project_id = Some(project_id);

    step(conn, ConnectionState::Authenticating);
    let Some(token) = request.token.as_deref() else {
        return Err(reject(conn, ConnectError::MissingToken));
    };

    let identity = match authenticator.authenticate(token).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return Err(reject(conn, ConnectError::AuthenticationFailed)),
        Err(err) => {
            tracing::error!(%err, connection_id = %conn.id, "authentication backend failed");
            return Err(reject(conn, ConnectError::AuthenticationFailed));
        }
    };
    conn.user_id = Some(identity.user_id);

    step(conn, ConnectionState::Authorizing);
    match membership.is_member(project_id, identity.user_id).await {
        Ok(true) => {}
        Ok(false) => return Err(reject(conn, ConnectError::NotAuthorized)),
        Err(err) => {
            tracing::error!(
                %err,
                connection_id = %conn.id,
                project_id,
                user_id = identity.user_id,
                "membership check failed"
            );
            return Err(reject(conn, ConnectError::NotAuthorized));
        }
    }

    step(conn, ConnectionState::Joined);
    Ok(())
}

fn step(conn: &mut Connection, next: ConnectionState) {
    if let Err(err) = conn.advance(next) {
        tracing::error!(%err, connection_id = %conn.id, "handshake out of order");
    }
}

fn reject(conn: &mut Connection, reason: ConnectError) -> ConnectError {
    if let Err(err) = conn.reject(reason) {
        tracing::error!(%err, connection_id = %conn.id, "rejection out of order");
    }
    tracing::debug!(connection_id = %conn.id, %reason, "connection rejected");
    reason
}
