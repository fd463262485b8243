//! Durable key-value storage behind the credential store.

use async_trait::async_trait;

use crate::error::ClientError;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key holding the raw session token.
pub const TOKEN_KEY: &str = "auth_token";
/// Key holding the serialized user JSON.
pub const USER_KEY: &str = "auth_user";

/// String-keyed persistent storage.
///
/// All failures surface as [`ClientError::StorageUnavailable`]. Removing a
/// key that does not exist is not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;

    async fn remove(&self, key: &str) -> Result<(), ClientError>;
}
