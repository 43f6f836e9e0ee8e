use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{App, Provisioned, User};

/// Credential validation and user/app provisioning.
///
/// API keys are only ever handed out in plaintext by the call that created
/// them. Implementations store a one-way hash.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Resolve an API key to its active user, recording the use.
    ///
    /// Returns `Ok(None)` for unknown or revoked keys.
    async fn validate(&self, api_key: &str) -> DomainResult<Option<User>>;

    /// Look up a user by external id.
    async fn find_user(&self, user_id: &str) -> DomainResult<Option<User>>;

    /// Create a user with a fresh API key.
    ///
    /// # Errors
    /// Returns `UserAlreadyExists` if the external id is taken.
    async fn create_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        email: Option<&str>,
    ) -> DomainResult<(User, String)>;

    /// Return the user, creating it (and its key) when missing.
    async fn get_or_create_user(&self, user_id: &str) -> DomainResult<Provisioned>;

    /// Return the user's app with the given name, creating it when missing.
    async fn ensure_app(&self, owner: &User, name: &str) -> DomainResult<App>;

    /// All users, oldest first, with whether they hold an active key.
    async fn list_users(&self) -> DomainResult<Vec<(User, bool)>>;

    /// Deactivate every key of a user. Returns the number of keys revoked.
    async fn revoke_keys(&self, user_id: &str) -> DomainResult<u64>;
}
