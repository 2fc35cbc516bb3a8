use std::collections::BTreeSet;
use std::fs;

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use daylist_core::auth::{AuthError, AuthGate, AuthPolicy, DEFAULT_PASSWORD};
use daylist_core::batch::BatchSelection;
use daylist_core::grouping::group_by_date;
use daylist_core::item::Category;
use daylist_core::service::ItemService;
use daylist_core::stats::Stats;
use daylist_core::storage::{FileStore, MemoryStore};
use tempfile::tempdir;

fn june_first() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 6, 1)
}

#[test]
fn items_persist_group_and_count_across_reopen() {
    let temp = tempdir().expect("tempdir");
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");

    let mut service = ItemService::new(FileStore::open(temp.path()).expect("open store"));
    let milk = service
        .add("Buy milk", june_first(), None, Category::Life, now)
        .expect("add milk");
    let meeting = service
        .add(
            "Meeting",
            june_first(),
            NaiveTime::from_hms_opt(10, 0, 0),
            Category::Work,
            now,
        )
        .expect("add meeting");
    assert!(temp.path().join("tasks.data").exists());

    let reopened = ItemService::new(FileStore::open(temp.path()).expect("reopen store"));
    let items = reopened.list().expect("list");
    let groups = group_by_date(&items);
    assert_eq!(groups.len(), 1);
    let order: Vec<i64> = groups[0].items.iter().map(|item| item.id).collect();
    assert_eq!(order, vec![meeting.id, milk.id]);

    let mut service = reopened;
    let ids: BTreeSet<i64> = [milk.id].into_iter().collect();
    assert_eq!(service.complete_many(&ids).expect("complete"), 1);

    let stats = Stats::from_items(&service.list().expect("list"));
    assert_eq!((stats.total, stats.completed, stats.pending), (2, 1, 1));
}

#[test]
fn credential_survives_sessions_but_login_does_not() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");

    let mut gate = AuthGate::new(store.clone(), MemoryStore::new(), AuthPolicy::default());
    gate.login(DEFAULT_PASSWORD).expect("default login");
    gate.change_password(DEFAULT_PASSWORD, "abcd", "abcd")
        .expect("change password");

    let mut next_session = AuthGate::new(store, MemoryStore::new(), AuthPolicy::default());
    assert!(matches!(next_session.require(), Err(AuthError::NotAuthenticated)));
    assert!(matches!(next_session.login(DEFAULT_PASSWORD), Err(AuthError::WrongPassword)));
    next_session.login("abcd").expect("login with new password");
}

#[test]
fn bulk_delete_with_nothing_selected_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let mut service = ItemService::new(FileStore::open(temp.path()).expect("open store"));

    let mut batch = BatchSelection::new();
    batch.toggle();
    assert_eq!(batch.bulk_delete(&mut service).expect("bulk delete"), 0);
    assert!(!batch.is_active());
    assert!(!temp.path().join("tasks.data").exists());
}

#[test]
fn undecodable_store_file_loads_as_empty_and_accepts_writes() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("tasks.data"), [0xff, 0xfe, b'[', b']']).expect("write bytes");

    let mut service = ItemService::new(FileStore::open(temp.path()).expect("open store"));
    assert!(service.list().expect("list").is_empty());

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");
    service
        .add("After corruption", june_first(), None, Category::Other, now)
        .expect("add");
    assert_eq!(service.list().expect("list").len(), 1);
}

#[test]
fn malformed_store_file_loads_as_empty_and_is_replaced_on_write() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("tasks.data"), "{not json").expect("write garbage");

    let mut service = ItemService::new(FileStore::open(temp.path()).expect("open store"));
    assert!(service.list().expect("list").is_empty());

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).single().expect("valid now");
    service
        .add("Fresh start", june_first(), None, Category::Other, now)
        .expect("add");

    let raw = fs::read_to_string(temp.path().join("tasks.data")).expect("read back");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
    assert_eq!(parsed[0]["title"], "Fresh start");
}
