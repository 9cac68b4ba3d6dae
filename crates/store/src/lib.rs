use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use workshop_contracts::{Listing, PageWindow, Principal, Role};

pub mod memory;
pub mod pg;
pub mod records;

pub use memory::{MemoryRecordStore, MemoryUserStore};
pub use pg::{PgRecord, PgRecordStore, PgStore};
pub use records::{
    Client, ClientInput, Jewelry, JewelryInput, Order, OrderInput, Repair, RepairInput,
    RepairStatus, Smartwatch, SmartwatchInput,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store operation timed out")]
    Timeout,
    #[error("store unavailable")]
    Unavailable,
    #[error("{0}")]
    Conflict(String),
    #[error("store sql error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn from_sqlx(err: sqlx::Error, conflict: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(conflict.to_string())
            }
            _ => StoreError::Sqlx(err),
        }
    }
}

/// Validated request body for a record. `normalized` trims text, drops empty
/// optionals and rejects missing required fields.
pub trait RecordInput: DeserializeOwned + Clone + Send + Sync + 'static {
    fn normalized(self) -> Result<Self, String>;
}

/// One entity table exposed as a collection.
pub trait Record: Clone + Serialize + Send + Sync + Unpin + 'static {
    type Input: RecordInput;

    /// Table name, route segment and listing key.
    const COLLECTION: &'static str;
    /// Human label used in messages ("client not found").
    const LABEL: &'static str;
    /// Name of the optional photo/image column.
    const MEDIA_FIELD: &'static str;

    fn id(&self) -> i64;
    fn from_input(id: i64, input: Self::Input) -> Self;
    fn set_media(&mut self, path: Option<String>);

    /// Value that must be unique across the collection, if any.
    fn unique_key(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub principal: Principal,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Never returns the stored password hash.
    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;
    /// Fails with `Conflict` when the username or email is already taken.
    async fn create_user(&self, user: NewUser) -> Result<Principal, StoreError>;
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Items ordered by id ascending plus the unwindowed total.
    async fn page(&self, window: PageWindow) -> Result<Listing<R>, StoreError>;
    async fn get(&self, id: i64) -> Result<Option<R>, StoreError>;
    async fn create(&self, input: R::Input) -> Result<R, StoreError>;
    async fn update(&self, id: i64, input: R::Input) -> Result<Option<R>, StoreError>;
    async fn set_media(&self, id: i64, path: &str) -> Result<Option<R>, StoreError>;
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}
