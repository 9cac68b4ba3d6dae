use std::time::Duration;

use workshop_contracts::{PageWindow, Role};
use workshop_store::{
    NewUser, PgStore, RecordStore, Repair, RepairInput, RepairStatus, StoreError, UserStore,
};

fn test_db_url() -> Option<String> {
    std::env::var("WORKSHOP_TEST_DB_URL")
        .ok()
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn isolated_store(db_url: &str) -> PgStore {
    let schema = format!("workshop_test_{}", ulid::Ulid::new()).to_lowercase();

    let admin = sqlx::postgres::PgPoolOptions::new()
        .max_connections(1)
        .connect(db_url)
        .await
        .expect("DB connect should succeed");
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .expect("create schema should succeed");
    admin.close().await;

    let schema_for_conn = schema.clone();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .after_connect(move |conn, _meta| {
            let set_search_path = format!("SET search_path TO {}", schema_for_conn);
            Box::pin(async move {
                sqlx::Executor::execute(conn, set_search_path.as_str()).await?;
                Ok(())
            })
        })
        .connect(db_url)
        .await
        .expect("schema pool connect should succeed");

    let store = PgStore::from_pool(pool, Duration::from_secs(5));
    store.migrate().await.expect("migrations should apply");
    store.migrate().await.expect("migrations should be idempotent");
    store
}

fn repair_input(n: usize) -> RepairInput {
    RepairInput {
        client_name: format!("client {n}"),
        kind: "laptop".to_string(),
        brand: "Acme".to_string(),
        model: format!("L{n}"),
        issue_description: "fan noise".to_string(),
        repair_cost: 10.0 * n as f64,
        status: RepairStatus::InProgress,
        photo: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repairs_page_by_id_ascending() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping DB store test; set WORKSHOP_TEST_DB_URL to enable");
        return;
    };

    let store = isolated_store(&db_url).await;
    let repairs = store.records::<Repair>();

    for n in 0..23 {
        repairs.create(repair_input(n)).await.expect("insert repair");
    }

    let first = repairs.page(PageWindow::new(1, 10)).await.expect("page 1");
    assert_eq!(first.items.len(), 10);
    assert_eq!(first.total_items, 23);
    assert_eq!(first.total_pages, 3);
    let ids = first.items.iter().map(|r| r.id).collect::<Vec<_>>();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let third = repairs.page(PageWindow::new(3, 10)).await.expect("page 3");
    assert_eq!(third.items.len(), 3);
    assert_eq!(third.items[0].status, RepairStatus::InProgress);

    let fourth = repairs.page(PageWindow::new(4, 10)).await.expect("page 4");
    assert!(fourth.items.is_empty());

    let again = repairs.page(PageWindow::new(3, 10)).await.expect("page 3 again");
    assert_eq!(third, again);

    let target = third.items[0].id;
    let updated = repairs
        .set_media(target, "/images/repairs/x.png")
        .await
        .expect("set media")
        .expect("row exists");
    assert_eq!(updated.photo.as_deref(), Some("/images/repairs/x.png"));

    assert!(repairs.delete(target).await.expect("delete"));
    assert!(repairs.get(target).await.expect("get").is_none());

    store.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn users_are_unique_and_principal_lookup_skips_password() {
    let Some(db_url) = test_db_url() else {
        eprintln!("skipping DB store test; set WORKSHOP_TEST_DB_URL to enable");
        return;
    };

    let store = isolated_store(&db_url).await;

    let principal = store
        .create_user(NewUser {
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: "$argon2id$v=19$stub".to_string(),
            role: Role::Admin,
        })
        .await
        .expect("create user");
    assert_eq!(principal.role, Role::Admin);

    let err = store
        .create_user(NewUser {
            username: "admin".to_string(),
            email: "other@example.com".to_string(),
            password_hash: String::new(),
            role: Role::User,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));

    let found = store
        .find_principal(principal.id)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(found, principal);

    let record = store
        .find_by_email("admin@example.com")
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(record.password_hash, "$argon2id$v=19$stub");

    store.ping().await.expect("ping");
    store.close().await;
}
