use super::*;
use crate::{
    admin::AdminGate,
    alfred::DEFAULT_CANCEL_KEYWORD,
    clock::ManualClock,
    remote::{HttpRemote, NoRemote},
};
use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{NaiveDate, Weekday};
use shared::domain::{Team, WeekdaySet};
use std::time::Duration;
use tokio::{net::TcpListener, sync::Mutex, time::timeout};
use url::Url;

const KEY: &str = "test_board";

#[derive(Clone, Default)]
struct MirrorState {
    stored: Arc<Mutex<Option<Snapshot>>>,
    posts: Arc<Mutex<u32>>,
}

async fn get_snapshot(State(state): State<MirrorState>) -> Json<Option<Snapshot>> {
    Json(state.stored.lock().await.clone())
}

async fn post_snapshot(
    State(state): State<MirrorState>,
    Json(snapshot): Json<Snapshot>,
) -> StatusCode {
    *state.stored.lock().await = Some(snapshot);
    *state.posts.lock().await += 1;
    StatusCode::OK
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn never_answers() -> StatusCode {
    std::future::pending().await
}

async fn spawn_mirror() -> Result<(Url, MirrorState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = MirrorState::default();
    let app = Router::new()
        .route("/api/data", get(get_snapshot).post(post_snapshot))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((Url::parse(&format!("http://{addr}/api/data"))?, state))
}

async fn spawn_broken_mirror() -> Result<Url> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/api/data", get(broken).post(broken));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{addr}/api/data"))?)
}

async fn spawn_read_only_mirror(snapshot: Snapshot) -> Result<Url> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route(
        "/api/data",
        get(move || {
            let snapshot = snapshot.clone();
            async move { Json(snapshot) }
        }),
    );
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{addr}/api/data"))?)
}

async fn spawn_silent_mirror() -> Result<Url> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new().route("/api/data", get(never_answers).post(never_answers));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(Url::parse(&format!("http://{addr}/api/data"))?)
}

fn noon_clock() -> Arc<ManualClock> {
    let now = NaiveDate::from_ymd_opt(2024, 5, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .expect("now");
    Arc::new(ManualClock::new(now))
}

async fn memory_storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

async fn local_session(storage: Storage, clock: Arc<ManualClock>) -> BoardSession {
    BoardSession::open(storage, KEY, Arc::new(NoRemote), clock).await
}

fn remote_snapshot(name: &str, last_updated: i64) -> Snapshot {
    Snapshot {
        employees: vec![Employee {
            id: EmployeeId(1),
            name: name.into(),
            team: "Remote".into(),
            off_days: WeekdaySet::default(),
        }],
        teams: vec![Team::named("Remote")],
        last_updated,
        ..Snapshot::default()
    }
}

#[tokio::test]
async fn opens_empty_when_nothing_is_stored() {
    let session = local_session(memory_storage().await, noon_clock()).await;
    assert!(session.board().employees().is_empty());
    assert!(session.roster().is_empty());
    assert_eq!(session.board().last_updated(), 0);
}

#[tokio::test]
async fn opens_empty_when_local_snapshot_is_corrupt() {
    let storage = memory_storage().await;
    sqlx::query("INSERT INTO snapshots (storage_key, payload, last_updated) VALUES (?, ?, 1)")
        .bind(KEY)
        .bind("{\"employees\": 12")
        .execute(storage.pool())
        .await
        .expect("raw insert");

    let session = local_session(storage, noon_clock()).await;
    assert!(session.board().employees().is_empty());
}

#[tokio::test]
async fn legacy_free_text_off_days_keep_every_employee() {
    let storage = memory_storage().await;
    let legacy = r#"{
        "employees": [
            {"id": 1, "name": "Kim", "team": "A", "offDays": "토/일"},
            {"id": 2, "name": "Lee", "team": "A", "offDays": "주말"},
            {"id": 3, "name": "Park", "team": "B", "offDays": "일요일"}
        ],
        "teams": [{"name": "A", "offDays": ""}, {"name": "B", "offDays": ""}],
        "vacations": [],
        "breakRecords": [],
        "lastUpdated": 1714500000000
    }"#;
    sqlx::query("INSERT INTO snapshots (storage_key, payload, last_updated) VALUES (?, ?, 1)")
        .bind(KEY)
        .bind(legacy)
        .execute(storage.pool())
        .await
        .expect("raw insert");

    let mut session = local_session(storage.clone(), noon_clock()).await;
    assert_eq!(session.board().employees().len(), 3);
    let kim = session.board().employee_by_name("Kim").expect("kim");
    assert!(kim.off_days.contains(Weekday::Sat));
    assert!(kim.off_days.contains(Weekday::Sun));
    assert!(session
        .board()
        .employee_by_name("Lee")
        .expect("lee")
        .off_days
        .is_empty());

    session
        .add_employee("Choi", "B", WeekdaySet::default())
        .await
        .expect("choi");
    let stored = storage.load_snapshot(KEY).await.expect("load").expect("stored");
    let names: Vec<&str> = stored.employees.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Kim", "Lee", "Park", "Choi"]);
}

#[tokio::test]
async fn mutations_survive_reopen() {
    let storage = memory_storage().await;
    let clock = noon_clock();
    let mut session = local_session(storage.clone(), clock.clone()).await;

    let kim = session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("add");
    assert!(kim.warning.is_none());
    session
        .record_break(kim.value, session.board().viewed_date())
        .await
        .expect("record");
    let saved_at = session.board().last_updated();
    assert_eq!(storage.last_updated(KEY).await.expect("ts"), Some(saved_at));

    let reopened = local_session(storage, clock).await;
    assert_eq!(reopened.board().employees().len(), 1);
    assert_eq!(reopened.board().break_records().len(), 1);
    assert_eq!(reopened.board().last_updated(), saved_at);
}

#[tokio::test]
async fn rejected_mutation_is_not_saved() {
    let storage = memory_storage().await;
    let mut session = local_session(storage.clone(), noon_clock()).await;

    let err = session
        .add_employee("", "A", WeekdaySet::default())
        .await
        .expect_err("validation");
    assert!(matches!(err, BoardError::Validation(_)));
    assert_eq!(storage.last_updated(KEY).await.expect("ts"), None);
}

#[tokio::test]
async fn failed_local_save_keeps_memory_and_warns() {
    let storage = memory_storage().await;
    let mut session = local_session(storage.clone(), noon_clock()).await;
    storage.pool().close().await;

    let committed = session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("mutation still applies");
    assert!(committed.warning.is_some());
    assert!(session.board().employee(committed.value).is_some());
}

#[tokio::test]
async fn pushes_each_save_to_remote() {
    let (endpoint, mirror) = spawn_mirror().await.expect("mirror");
    let mut session = BoardSession::open(
        memory_storage().await,
        KEY,
        Arc::new(HttpRemote::new(endpoint)),
        noon_clock(),
    )
    .await;

    session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("add");
    session.flush_remote().await;

    let stored = mirror.stored.lock().await.clone().expect("pushed");
    assert_eq!(stored.employees[0].name, "Kim");
    assert_eq!(stored.last_updated, session.board().last_updated());
    assert_eq!(*mirror.posts.lock().await, 1);
}

#[tokio::test]
async fn remote_failure_never_reaches_the_caller() {
    let endpoint = spawn_broken_mirror().await.expect("mirror");
    let mut session = BoardSession::open(
        memory_storage().await,
        KEY,
        Arc::new(HttpRemote::new(endpoint)),
        noon_clock(),
    )
    .await;

    let committed = session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("add");
    assert!(committed.warning.is_none());
    session.flush_remote().await;
    assert!(!session.reconcile_remote().await);
    assert_eq!(session.board().employees().len(), 1);
}

#[tokio::test]
async fn adopts_only_strictly_newer_remote_snapshot() {
    let (endpoint, mirror) = spawn_mirror().await.expect("mirror");
    let storage = memory_storage().await;
    let clock = noon_clock();
    let mut session = BoardSession::open(
        storage.clone(),
        KEY,
        Arc::new(HttpRemote::new(endpoint)),
        clock.clone(),
    )
    .await;
    session
        .add_employee("Local", "A", WeekdaySet::default())
        .await
        .expect("add");
    session.flush_remote().await;
    let local_ts = session.board().last_updated();

    *mirror.stored.lock().await = Some(remote_snapshot("Same", local_ts));
    assert!(!session.reconcile_remote().await);
    assert_eq!(session.board().employees()[0].name, "Local");

    *mirror.stored.lock().await = Some(remote_snapshot("Newer", local_ts + 1));
    assert!(session.reconcile_remote().await);
    assert_eq!(session.board().employees()[0].name, "Newer");
    assert_eq!(session.board().last_updated(), local_ts + 1);

    let reopened = local_session(storage, clock).await;
    assert_eq!(reopened.board().employees()[0].name, "Newer");
    assert_eq!(*mirror.posts.lock().await, 1);
}

#[tokio::test]
async fn background_fetch_does_not_block_local_work() {
    let endpoint = spawn_read_only_mirror(remote_snapshot("Remote", i64::MAX))
        .await
        .expect("mirror");
    let mut session = BoardSession::open(
        memory_storage().await,
        KEY,
        Arc::new(HttpRemote::new(endpoint)),
        noon_clock(),
    )
    .await;

    let pending = session.fetch_remote_in_background();
    session
        .add_employee("Local", "A", WeekdaySet::default())
        .await
        .expect("add");
    assert_eq!(session.board().employees()[0].name, "Local");

    let fetched = pending.await.expect("join").expect("remote snapshot");
    session.adopt_remote(fetched).await;
    assert_eq!(session.board().employees()[0].name, "Remote");

    let after = session
        .add_employee("After", "A", WeekdaySet::default())
        .await
        .expect("saves past a saturated timestamp");
    assert!(after.warning.is_none());
    assert_eq!(session.board().last_updated(), i64::MAX);
}

#[tokio::test]
async fn silent_remote_never_holds_up_local_work() {
    let endpoint = spawn_silent_mirror().await.expect("mirror");
    let remote = HttpRemote::new(endpoint).with_timeout(Duration::from_millis(200));
    let storage = memory_storage().await;
    let mut session =
        BoardSession::open(storage.clone(), KEY, Arc::new(remote), noon_clock()).await;

    let pending = session.fetch_remote_in_background();
    let kim = timeout(
        Duration::from_secs(1),
        session.add_employee("Kim", "A", WeekdaySet::default()),
    )
    .await
    .expect("local save is not gated on the remote")
    .expect("add");
    assert!(kim.warning.is_none());
    assert!(storage.last_updated(KEY).await.expect("ts").is_some());

    timeout(Duration::from_secs(5), session.flush_remote())
        .await
        .expect("push gives up after its timeout");
    let fetched = timeout(Duration::from_secs(5), pending)
        .await
        .expect("fetch gives up after its timeout")
        .expect("join");
    assert!(fetched.is_none());
}

#[tokio::test]
async fn unreachable_remote_resolves_to_nothing() {
    let endpoint = Url::parse("http://127.0.0.1:9/api/data").expect("url");
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let session = BoardSession::open(
        memory_storage().await,
        KEY,
        Arc::new(HttpRemote::new(endpoint)),
        noon_clock(),
    )
    .await;
    let fetched = session.fetch_remote_in_background().await.expect("join");
    assert!(fetched.is_none());
}

#[tokio::test]
async fn alfred_saves_only_when_something_changed() {
    let storage = memory_storage().await;
    let clock = noon_clock();
    let mut session = local_session(storage.clone(), clock.clone()).await;
    session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("kim");
    let after_add = storage.last_updated(KEY).await.expect("ts");

    let nobody = session.run_alfred("Nobody", DEFAULT_CANCEL_KEYWORD).await;
    assert_eq!(nobody.value.unresolved, vec!["Nobody".to_string()]);
    assert_eq!(storage.last_updated(KEY).await.expect("ts"), after_add);

    clock.advance_minutes(1);
    let started = session.run_alfred("Kim", DEFAULT_CANCEL_KEYWORD).await;
    assert!(started.value.changed());
    assert!(storage.last_updated(KEY).await.expect("ts") > after_add);

    let cancelled = session.run_alfred("Kim cancel", DEFAULT_CANCEL_KEYWORD).await;
    assert!(cancelled.value.changed());
    assert!(session.board().break_records().is_empty());
}

#[tokio::test]
async fn admin_edit_requires_unlocked_gate() {
    let mut session = local_session(memory_storage().await, noon_clock()).await;
    let kim = session
        .add_employee("Kim", "A", WeekdaySet::default())
        .await
        .expect("kim")
        .value;
    let gate = AdminGate::new("1212");
    assert!(gate.unlock("0000").is_none());
    let access = gate.unlock("1212").expect("unlocked");

    let date = session.board().viewed_date();
    let down = ClockTime::from_hm(11, 0);
    let up = ClockTime::from_hm(11, 45);
    session
        .admin_upsert_break(&access, kim, date, down, up)
        .await
        .expect("upsert");
    let record = session.board().break_record(kim, date).expect("record");
    assert_eq!(record.duration_minutes(), Some(45));
}
