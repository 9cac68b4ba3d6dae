use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use workshop_contracts::{Listing, PageWindow, Principal};

use crate::{NewUser, Record, RecordStore, StoreError, UserRecord, UserStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Process-local user table. Ids start at 1 and are never reused.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    inner: Arc<Mutex<UserTable>>,
    unavailable: Arc<AtomicBool>,
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    users: BTreeMap<i64, UserRecord>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a store outage for every subsequent call.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn remove_user(&self, id: i64) -> bool {
        lock(&self.inner).users.remove(&id).is_some()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, StoreError> {
        self.check_available()?;
        Ok(lock(&self.inner)
            .users
            .get(&id)
            .map(|user| user.principal.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.check_available()?;
        Ok(lock(&self.inner)
            .users
            .values()
            .find(|user| user.principal.email == email)
            .cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<Principal, StoreError> {
        self.check_available()?;
        let mut table = lock(&self.inner);

        let taken = table.users.values().any(|existing| {
            existing.principal.email == user.email || existing.principal.username == user.username
        });
        if taken {
            return Err(StoreError::Conflict("user already exists".to_string()));
        }

        table.next_id += 1;
        let principal = Principal {
            id: table.next_id,
            username: user.username,
            email: user.email,
            role: user.role,
        };
        table.users.insert(
            principal.id,
            UserRecord {
                principal: principal.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(principal)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

/// Process-local record table ordered by id.
pub struct MemoryRecordStore<R> {
    inner: Arc<Mutex<RecordTable<R>>>,
    unavailable: Arc<AtomicBool>,
}

struct RecordTable<R> {
    next_id: i64,
    rows: BTreeMap<i64, R>,
}

impl<R> Clone for MemoryRecordStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            unavailable: Arc::clone(&self.unavailable),
        }
    }
}

impl<R: Record> Default for MemoryRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryRecordStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecordTable {
                next_id: 0,
                rows: BTreeMap::new(),
            })),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }

    fn check_unique(table: &RecordTable<R>, candidate: &R) -> Result<(), StoreError> {
        let Some(key) = candidate.unique_key() else {
            return Ok(());
        };
        let clash = table
            .rows
            .values()
            .any(|row| row.id() != candidate.id() && row.unique_key() == Some(key));
        if clash {
            return Err(StoreError::Conflict(format!("{} already exists", R::LABEL)));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryRecordStore<R> {
    async fn page(&self, window: PageWindow) -> Result<Listing<R>, StoreError> {
        self.check_available()?;
        let table = lock(&self.inner);

        let ordered = table.rows.values().collect::<Vec<_>>();
        let total = ordered.len() as u64;
        let items = window
            .slice(&ordered)
            .iter()
            .map(|record| (*record).clone())
            .collect();

        Ok(Listing::new(R::COLLECTION, window, items, total))
    }

    async fn get(&self, id: i64) -> Result<Option<R>, StoreError> {
        self.check_available()?;
        Ok(lock(&self.inner).rows.get(&id).cloned())
    }

    async fn create(&self, input: R::Input) -> Result<R, StoreError> {
        self.check_available()?;
        let mut table = lock(&self.inner);

        let record = R::from_input(table.next_id + 1, input);
        Self::check_unique(&table, &record)?;

        table.next_id += 1;
        table.rows.insert(record.id(), record.clone());
        Ok(record)
    }

    async fn update(&self, id: i64, input: R::Input) -> Result<Option<R>, StoreError> {
        self.check_available()?;
        let mut table = lock(&self.inner);

        if !table.rows.contains_key(&id) {
            return Ok(None);
        }

        let record = R::from_input(id, input);
        Self::check_unique(&table, &record)?;
        table.rows.insert(id, record.clone());
        Ok(Some(record))
    }

    async fn set_media(&self, id: i64, path: &str) -> Result<Option<R>, StoreError> {
        self.check_available()?;
        let mut table = lock(&self.inner);

        Ok(table.rows.get_mut(&id).map(|record| {
            record.set_media(Some(path.to_string()));
            record.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(lock(&self.inner).rows.remove(&id).is_some())
    }
}
