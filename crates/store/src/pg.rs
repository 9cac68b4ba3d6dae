use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use workshop_contracts::{Listing, PageWindow, Principal, Role};

use crate::records::{Client, Jewelry, Order, Repair, RepairStatus, Smartwatch};
use crate::{NewUser, Record, RecordStore, StoreError, UserRecord, UserStore};

pub type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Column layout and row mapping of a record table.
pub trait PgRecord: Record {
    /// Every column except `id`, in bind order.
    const COLUMNS: &'static [&'static str];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q>;
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub async fn connect(db_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let pool = tokio::time::timeout(
            Duration::from_secs(5),
            PgPoolOptions::new().max_connections(8).connect(db_url),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "store.connected");
        Ok(Self { pool, timeout })
    }

    pub async fn connect_and_migrate(db_url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let store = Self::connect(db_url, timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tokio::time::timeout(Duration::from_secs(10), migrate(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        tracing::info!("store.migrations applied");
        Ok(())
    }

    pub fn records<R: PgRecord>(&self) -> PgRecordStore<R> {
        PgRecordStore {
            pool: self.pool.clone(),
            timeout: self.timeout,
            _record: PhantomData,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn principal_from_row(row: &PgRow) -> Result<Principal, sqlx::Error> {
    let role: String = row.try_get("role")?;
    let role = Role::parse(&role).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: "role".to_string(),
        source: format!("unknown role `{}`", role).into(),
    })?;

    Ok(Principal {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        role,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, StoreError> {
        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query("SELECT id, username, email, role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(row.as_ref().map(principal_from_row).transpose()?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query("SELECT id, username, email, role, password FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(UserRecord {
            principal: principal_from_row(&row)?,
            password_hash: row.try_get("password")?,
        }))
    }

    async fn create_user(&self, user: NewUser) -> Result<Principal, StoreError> {
        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query(
                "INSERT INTO users (username, email, password, role) VALUES ($1, $2, $3, $4) RETURNING id, username, email, role",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role.as_str())
            .fetch_one(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(|err| StoreError::from_sqlx(err, "user already exists"))?;

        Ok(principal_from_row(&row)?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        tokio::time::timeout(self.timeout, sqlx::query("SELECT 1").execute(&self.pool))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }
}

pub struct PgRecordStore<R> {
    pool: PgPool,
    timeout: Duration,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for PgRecordStore<R> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            timeout: self.timeout,
            _record: PhantomData,
        }
    }
}

impl<R: PgRecord> PgRecordStore<R> {
    fn select_list() -> String {
        let mut cols = String::from("id");
        for col in R::COLUMNS {
            cols.push_str(", ");
            cols.push_str(col);
        }
        cols
    }

    fn conflict_message() -> String {
        format!("{} already exists", R::LABEL)
    }
}

#[async_trait]
impl<R: PgRecord> RecordStore<R> for PgRecordStore<R> {
    async fn page(&self, window: PageWindow) -> Result<Listing<R>, StoreError> {
        let count_sql = format!("SELECT count(*) FROM {}", R::COLLECTION);
        let page_sql = format!(
            "SELECT {} FROM {} ORDER BY id ASC LIMIT $1 OFFSET $2",
            Self::select_list(),
            R::COLLECTION
        );

        // Count and rows come from one snapshot so totals agree with the page.
        let (total, rows) = tokio::time::timeout(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
                .execute(&mut *tx)
                .await?;

            let total: i64 = sqlx::query_scalar(&count_sql).fetch_one(&mut *tx).await?;
            let rows = sqlx::query(&page_sql)
                .bind(window.limit() as i64)
                .bind(window.offset() as i64)
                .fetch_all(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok::<_, sqlx::Error>((total, rows))
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        let items = rows
            .iter()
            .map(R::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Listing::new(
            R::COLLECTION,
            window,
            items,
            total.max(0) as u64,
        ))
    }

    async fn get(&self, id: i64) -> Result<Option<R>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            Self::select_list(),
            R::COLLECTION
        );

        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query(&sql).bind(id).fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(row.as_ref().map(R::from_row).transpose()?)
    }

    async fn create(&self, input: R::Input) -> Result<R, StoreError> {
        let placeholders = (1..=R::COLUMNS.len())
            .map(|idx| format!("${}", idx))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            R::COLLECTION,
            R::COLUMNS.join(", "),
            placeholders,
            Self::select_list()
        );

        let row = tokio::time::timeout(
            self.timeout,
            R::bind_input(sqlx::query(&sql), &input).fetch_one(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(|err| StoreError::from_sqlx(err, &Self::conflict_message()))?;

        Ok(R::from_row(&row)?)
    }

    async fn update(&self, id: i64, input: R::Input) -> Result<Option<R>, StoreError> {
        let assignments = R::COLUMNS
            .iter()
            .enumerate()
            .map(|(idx, col)| format!("{} = ${}", col, idx + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ${} RETURNING {}",
            R::COLLECTION,
            assignments,
            R::COLUMNS.len() + 1,
            Self::select_list()
        );

        let row = tokio::time::timeout(
            self.timeout,
            R::bind_input(sqlx::query(&sql), &input)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)?
        .map_err(|err| StoreError::from_sqlx(err, &Self::conflict_message()))?;

        Ok(row.as_ref().map(R::from_row).transpose()?)
    }

    async fn set_media(&self, id: i64, path: &str) -> Result<Option<R>, StoreError> {
        let sql = format!(
            "UPDATE {} SET {} = $1 WHERE id = $2 RETURNING {}",
            R::COLLECTION,
            R::MEDIA_FIELD,
            Self::select_list()
        );

        let row = tokio::time::timeout(
            self.timeout,
            sqlx::query(&sql)
                .bind(path)
                .bind(id)
                .fetch_optional(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(row.as_ref().map(R::from_row).transpose()?)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", R::COLLECTION);
        let result = tokio::time::timeout(
            self.timeout,
            sqlx::query(&sql).bind(id).execute(&self.pool),
        )
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(result.rows_affected() > 0)
    }
}

impl PgRecord for Client {
    const COLUMNS: &'static [&'static str] = &[
        "last_name",
        "first_name",
        "middle_name",
        "birth_date",
        "email",
        "phone",
        "is_subscribed",
        "photo",
    ];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q> {
        query
            .bind(input.last_name.clone())
            .bind(input.first_name.clone())
            .bind(input.middle_name.clone())
            .bind(input.birth_date)
            .bind(input.email.clone())
            .bind(input.phone.clone())
            .bind(input.is_subscribed)
            .bind(input.photo.clone())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            last_name: row.try_get("last_name")?,
            first_name: row.try_get("first_name")?,
            middle_name: row.try_get("middle_name")?,
            birth_date: row.try_get("birth_date")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            is_subscribed: row.try_get("is_subscribed")?,
            photo: row.try_get("photo")?,
        })
    }
}

impl PgRecord for Repair {
    const COLUMNS: &'static [&'static str] = &[
        "client_name",
        "type",
        "brand",
        "model",
        "issue_description",
        "repair_cost",
        "status",
        "photo",
    ];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q> {
        query
            .bind(input.client_name.clone())
            .bind(input.kind.clone())
            .bind(input.brand.clone())
            .bind(input.model.clone())
            .bind(input.issue_description.clone())
            .bind(input.repair_cost)
            .bind(input.status.as_str())
            .bind(input.photo.clone())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = RepairStatus::parse(&status).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: format!("unknown repair status `{}`", status).into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            client_name: row.try_get("client_name")?,
            kind: row.try_get("type")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            issue_description: row.try_get("issue_description")?,
            repair_cost: row.try_get("repair_cost")?,
            status,
            photo: row.try_get("photo")?,
        })
    }
}

impl PgRecord for Smartwatch {
    const COLUMNS: &'static [&'static str] = &[
        "brand",
        "model",
        "color",
        "display_type",
        "battery_life",
        "price",
        "in_stock",
        "photo",
    ];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q> {
        query
            .bind(input.brand.clone())
            .bind(input.model.clone())
            .bind(input.color.clone())
            .bind(input.display_type.clone())
            .bind(input.battery_life)
            .bind(input.price)
            .bind(input.in_stock)
            .bind(input.photo.clone())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            brand: row.try_get("brand")?,
            model: row.try_get("model")?,
            color: row.try_get("color")?,
            display_type: row.try_get("display_type")?,
            battery_life: row.try_get("battery_life")?,
            price: row.try_get("price")?,
            in_stock: row.try_get("in_stock")?,
            photo: row.try_get("photo")?,
        })
    }
}

impl PgRecord for Jewelry {
    const COLUMNS: &'static [&'static str] = &[
        "name", "category", "material", "weight", "price", "in_stock", "image",
    ];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q> {
        query
            .bind(input.name.clone())
            .bind(input.category.clone())
            .bind(input.material.clone())
            .bind(input.weight)
            .bind(input.price)
            .bind(input.in_stock)
            .bind(input.image.clone())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            material: row.try_get("material")?,
            weight: row.try_get("weight")?,
            price: row.try_get("price")?,
            in_stock: row.try_get("in_stock")?,
            image: row.try_get("image")?,
        })
    }
}

impl PgRecord for Order {
    const COLUMNS: &'static [&'static str] = &[
        "client_name",
        "order_date",
        "total_amount",
        "status",
        "delivery_address",
        "image",
    ];

    fn bind_input<'q>(query: PgQuery<'q>, input: &Self::Input) -> PgQuery<'q> {
        query
            .bind(input.client_name.clone())
            .bind(input.order_date)
            .bind(input.total_amount)
            .bind(input.status.clone())
            .bind(input.delivery_address.clone())
            .bind(input.image.clone())
    }

    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            client_name: row.try_get("client_name")?,
            order_date: row.try_get("order_date")?,
            total_amount: row.try_get("total_amount")?,
            status: row.try_get("status")?,
            delivery_address: row.try_get("delivery_address")?,
            image: row.try_get("image")?,
        })
    }
}
