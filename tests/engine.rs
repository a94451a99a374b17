use assert_ok::assert_ok;
use chrono::{DateTime, TimeZone, Utc};
use recordstore::{Context, Entity, EngineError, Enum32, Table};
use rust_decimal::Decimal;

#[derive(Entity)]
struct UserRecord {
    id: i32,
    #[recordstore(max_len = 50)]
    name: String,
    age: i32,
}

#[derive(Context)]
struct UserStore {
    users: Table<UserRecord>,
}

#[derive(Entity)]
struct FooRecord {
    id: i32,
    #[recordstore(max_len = 5)]
    name: String,
}

#[derive(Context)]
struct FooStore {
    foos: Table<FooRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Active,
    Archived,
}

impl Enum32 for Status {
    fn to_i32(self) -> i32 {
        match self {
            Status::Active => 0,
            Status::Archived => 1,
        }
    }

    fn from_i32(value: i32) -> Self {
        match value {
            1 => Status::Archived,
            _ => Status::Active,
        }
    }
}

/// Every supported field kind, each nullable, so a single entity can
/// exercise "null vs present of every supported type" in one shot.
#[derive(Entity)]
struct Measurement {
    id: i32,
    count: Option<i32>,
    flag: Option<bool>,
    amount: Option<Decimal>,
    recorded_at: Option<DateTime<Utc>>,
    #[recordstore(max_len = 10)]
    label: Option<String>,
    #[recordstore(enum32)]
    status: Option<Status>,
}

#[derive(Context)]
struct MeasurementStore {
    measurements: Table<Measurement>,
}

#[test]
fn insert_then_reload_assigns_ids_in_order() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("users.mdb");

    {
        let store = assert_ok!(UserStore::open(&path));
        let alice = assert_ok!(store.users.add(UserRecord {
            id: 0,
            name: "Alice".into(),
            age: 30,
        }));
        let bob = assert_ok!(store.users.add(UserRecord {
            id: 0,
            name: "Bob".into(),
            age: 25,
        }));
        assert_eq!(alice.read().unwrap().id, 1);
        assert_eq!(bob.read().unwrap().id, 2);
        assert_ok!(store.commit());
    }
    assert_ok!(UserStore::release(&path));

    let store = assert_ok!(UserStore::open(&path));
    let rows = store.users.iterate();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].read().unwrap().name, "Alice");
    assert_eq!(rows[0].read().unwrap().id, 1);
    assert_eq!(rows[1].read().unwrap().name, "Bob");
    assert_eq!(rows[1].read().unwrap().id, 2);
    assert_ok!(UserStore::release(&path));
}

#[test]
fn update_persists_and_soft_delete_keeps_file_length() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("users.mdb");

    {
        let store = assert_ok!(UserStore::open(&path));
        assert_ok!(store.users.add(UserRecord {
            id: 0,
            name: "Alice".into(),
            age: 30,
        }));
        assert_ok!(store.users.add(UserRecord {
            id: 0,
            name: "Bob".into(),
            age: 25,
        }));
        assert_ok!(store.commit());
    }
    assert_ok!(UserStore::release(&path));

    {
        let store = assert_ok!(UserStore::open(&path));
        let alice = store
            .users
            .iterate()
            .into_iter()
            .find(|h| h.read().unwrap().id == 1)
            .unwrap();
        alice.write().unwrap().age = 31;
        store.users.update(&alice);
        assert_ok!(store.commit());
    }
    assert_ok!(UserStore::release(&path));

    let len_before_delete = std::fs::metadata(&path).unwrap().len();

    {
        let store = assert_ok!(UserStore::open(&path));
        let bob = store
            .users
            .iterate()
            .into_iter()
            .find(|h| h.read().unwrap().id == 2)
            .unwrap();
        store.users.remove(&bob);
        assert_eq!(store.users.count(), 1);
        assert_ok!(store.commit());
    }
    assert_ok!(UserStore::release(&path));

    assert_eq!(std::fs::metadata(&path).unwrap().len(), len_before_delete);

    let store = assert_ok!(UserStore::open(&path));
    let rows = store.users.iterate();
    assert_eq!(rows.len(), 1);
    let alice = &rows[0];
    assert_eq!(alice.read().unwrap().id, 1);
    assert_eq!(alice.read().unwrap().age, 31);
    assert_ok!(UserStore::release(&path));
}

#[test]
fn utf8_truncation_keeps_whole_codepoints() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("foo.mdb");

    {
        let store = assert_ok!(FooStore::open(&path));
        assert_ok!(store.foos.add(FooRecord {
            id: 0,
            name: "héllo".into(),
        }));
        assert_ok!(store.commit());
    }
    assert_ok!(FooStore::release(&path));

    let store = assert_ok!(FooStore::open(&path));
    let rows = store.foos.iterate();
    assert_eq!(rows[0].read().unwrap().name, "héll");
    assert_ok!(FooStore::release(&path));
}

#[test]
fn two_contexts_on_one_path_share_live_state() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("shared.mdb");

    let a = assert_ok!(UserStore::open(&path));
    let b = assert_ok!(UserStore::open(&path));

    assert_ok!(a.users.add(UserRecord {
        id: 0,
        name: "X".into(),
        age: 1,
    }));
    assert_ok!(a.commit());

    assert_eq!(b.users.count(), 1);
    assert_eq!(b.users.iterate()[0].read().unwrap().name, "X");

    assert_ok!(UserStore::release(&path));
    assert_ok!(UserStore::release(&path));
}

#[test]
fn reopen_after_empty_commit_is_a_no_op() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("empty.mdb");

    {
        let store = assert_ok!(UserStore::open(&path));
        assert_ok!(store.commit());
    }
    assert_ok!(UserStore::release(&path));

    let store = assert_ok!(UserStore::open(&path));
    assert_eq!(store.users.count(), 0);
    assert_ok!(UserStore::release(&path));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_on_one_context_lose_no_inserts() {
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("concurrent.mdb");
    let store = Arc::new(assert_ok!(UserStore::open(&path)));

    const N: i32 = 100;
    let mut tasks = Vec::with_capacity(N as usize);
    for i in 0..N {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .users
                .add(UserRecord {
                    id: 0,
                    name: format!("user-{i}"),
                    age: i,
                })
                .unwrap();
            store.commit_async(CancellationToken::new()).await
        }));
    }
    for task in tasks {
        assert_ok!(assert_ok!(task.await));
    }

    let mut ids: Vec<i32> = store.users.iterate().iter().map(|h| h.read().unwrap().id).collect();
    ids.sort_unstable();
    assert_eq!(ids.len(), N as usize);
    assert_eq!(ids, (1..=N).collect::<Vec<_>>());

    assert_ok!(UserStore::release(&path));
}

#[test]
fn explicit_id_is_preserved_and_collision_is_rejected() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("explicit_ids.mdb");

    let store = assert_ok!(UserStore::open(&path));
    let first = assert_ok!(store.users.add(UserRecord {
        id: 100,
        name: "Alice".into(),
        age: 30,
    }));
    assert_eq!(first.read().unwrap().id, 100);

    // An auto-assigned insert now continues past the explicit Id.
    let next = assert_ok!(store.users.add(UserRecord {
        id: 0,
        name: "Bob".into(),
        age: 25,
    }));
    assert_eq!(next.read().unwrap().id, 101);

    let err = store
        .users
        .add(UserRecord {
            id: 100,
            name: "Eve".into(),
            age: 40,
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateKey { id: 100, .. }));
    assert_eq!(store.users.count(), 2);

    assert_ok!(UserStore::release(&path));
}

#[test]
fn nullable_fields_round_trip_every_supported_type_across_reopen() {
    let dir = assert_ok!(tempfile::tempdir());
    let path = dir.path().join("measurements.mdb");

    {
        let store = assert_ok!(MeasurementStore::open(&path));
        assert_ok!(store.measurements.add(Measurement {
            id: 0,
            count: Some(i32::MAX),
            flag: Some(true),
            amount: Some(Decimal::MAX),
            recorded_at: Some(Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()),
            label: Some("full".into()),
            status: Some(Status::Archived),
        }));
        assert_ok!(store.measurements.add(Measurement {
            id: 0,
            count: Some(i32::MIN),
            flag: Some(false),
            amount: Some(Decimal::MIN),
            recorded_at: Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()),
            label: Some("".into()),
            status: Some(Status::Active),
        }));
        assert_ok!(store.measurements.add(Measurement {
            id: 0,
            count: None,
            flag: None,
            amount: None,
            recorded_at: None,
            label: None,
            status: None,
        }));
        assert_ok!(store.commit());
    }
    assert_ok!(MeasurementStore::release(&path));

    let store = assert_ok!(MeasurementStore::open(&path));
    let rows = store.measurements.iterate();
    assert_eq!(rows.len(), 3);

    let max_row = rows[0].read().unwrap();
    assert_eq!(max_row.count, Some(i32::MAX));
    assert_eq!(max_row.flag, Some(true));
    assert_eq!(max_row.amount, Some(Decimal::MAX));
    assert_eq!(
        max_row.recorded_at,
        Some(Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap())
    );
    assert_eq!(max_row.label.as_deref(), Some("full"));
    assert_eq!(max_row.status, Some(Status::Archived));

    let min_row = rows[1].read().unwrap();
    assert_eq!(min_row.count, Some(i32::MIN));
    assert_eq!(min_row.flag, Some(false));
    assert_eq!(min_row.amount, Some(Decimal::MIN));
    assert_eq!(
        min_row.recorded_at,
        Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap())
    );
    assert_eq!(min_row.label.as_deref(), Some(""));
    assert_eq!(min_row.status, Some(Status::Active));

    let empty_row = rows[2].read().unwrap();
    assert_eq!(empty_row.count, None);
    assert_eq!(empty_row.flag, None);
    assert_eq!(empty_row.amount, None);
    assert_eq!(empty_row.recorded_at, None);
    assert_eq!(empty_row.label, None);
    assert_eq!(empty_row.status, None);

    assert_ok!(MeasurementStore::release(&path));
}
