//! Runs only when `MEDTRACK_TEST_POSTGRES_URL` points at a scratch database.

use medtrack::db::NewMedicine;
use medtrack::{Backend, Config, Db, MedicineStore, params};
use std::time::{SystemTime, UNIX_EPOCH};

async fn store() -> Option<MedicineStore> {
    let database_url = std::env::var("MEDTRACK_TEST_POSTGRES_URL").ok()?;
    let cfg = Config {
        database_url,
        connect_retries: 0,
        ..Config::default()
    };
    let db = Db::connect(&cfg).await.expect("connect to postgres");
    assert_eq!(db.backend(), Backend::Postgres);
    Some(MedicineStore::new(db))
}

/// Usernames are unique across runs against the same database.
fn unique(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();
    format!("{name}-{}-{nanos}", std::process::id())
}

#[tokio::test]
async fn postgres_insert_reports_returning_id() {
    let Some(store) = store().await else {
        return;
    };
    let alice = store
        .create_user(&unique("alice"), "pw1")
        .await
        .expect("alice");
    let other = store
        .create_user(&unique("other"), "pw2")
        .await
        .expect("other");

    let med_id = store
        .add_medicine(alice, &NewMedicine::new("Aspirin", "100mg", "daily"))
        .await
        .expect("aspirin");
    let med = store
        .get_medicine(med_id, alice)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(med.name, "Aspirin");
    assert_eq!(med.dose, "100mg");
    assert_eq!(med.frequency, "daily");
    assert!(store.get_medicine(med_id, other).await.expect("get").is_none());

    let update = store
        .db()
        .run(
            "UPDATE medicines SET dose = ? WHERE id = ? AND user_id = ?",
            params!["200mg", med_id, alice],
        )
        .await
        .expect("update");
    assert_eq!(update.last_id, None);
    assert_eq!(update.changes, 1);
}

#[tokio::test]
async fn postgres_explicit_returning_is_not_duplicated() {
    let Some(store) = store().await else {
        return;
    };
    let res = store
        .db()
        .run(
            "INSERT INTO users (username, password) VALUES (?, ?) RETURNING id",
            params![unique("ret"), "pw"],
        )
        .await
        .expect("insert");
    assert!(res.last_id.is_some());
}

#[tokio::test]
async fn postgres_duplicate_username_is_unique_violation() {
    let Some(store) = store().await else {
        return;
    };
    let name = unique("bob");
    store.create_user(&name, "pw").await.expect("first bob");
    let err = store.create_user(&name, "pw").await.expect_err("second bob");
    assert!(err.is_unique_violation());
    assert_eq!(err.code().as_deref(), Some("23505"));
}

#[tokio::test]
async fn postgres_initialize_twice_is_harmless() {
    let Some(store) = store().await else {
        return;
    };
    store.db().initialize().await.expect("again");
    let tables = store
        .db()
        .all(
            "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name::text IN (?, ?)",
            params!["users", "medicines"],
        )
        .await
        .expect("tables");
    assert_eq!(tables.len(), 2);
}
