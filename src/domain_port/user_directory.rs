use super::StoreError;
use crate::domain_model::{User, UserId};

/// Read-only view over the user records owned by the account service.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, StoreError>;
}
