pub mod credentials;
pub mod tokens;

use async_trait::async_trait;
use live_common::UserId;

use crate::error::ServiceError;

/// The identity a bearer credential resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
}

/// Resolves bearer credentials to identities.
///
/// `Ok(None)` means the credential is not valid; `Err` means the check
/// itself could not be performed.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<Identity>, ServiceError>;
}
