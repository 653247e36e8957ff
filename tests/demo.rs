use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use taos_pool_demo::dispatch::Backoff;
use taos_pool_demo::task::{InsertPlan, InsertTask};
use taos_pool_demo::{
    build_source, build_source_with_timeout, prepare, run_with, schema, ConnectionSource,
    Connector, Dispatcher, Error, PoolKind, Result, Session, Settings, TableMode,
};

const KINDS: [PoolKind; 4] = [
    PoolKind::Mobc,
    PoolKind::Bb8,
    PoolKind::Deadpool,
    PoolKind::R2d2,
];

/// What every fake session of one connector has seen.
#[derive(Default)]
struct Journal {
    statements: Mutex<Vec<String>>,
    opened: AtomicUsize,
}

impl Journal {
    fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn inserts(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| sql.starts_with("insert"))
            .collect()
    }
}

#[derive(Clone, Default)]
struct FakeConnector {
    journal: Arc<Journal>,
    /// Statements containing this fail with a server error.
    fail_on: Option<&'static str>,
    /// Statements containing this fail and break the session.
    break_on: Option<&'static str>,
    insert_delay: Duration,
}

impl FakeConnector {
    fn failing_on(pattern: &'static str) -> Self {
        FakeConnector {
            fail_on: Some(pattern),
            ..Default::default()
        }
    }
}

struct FakeSession {
    connector: FakeConnector,
    database: Option<String>,
    broken: bool,
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession> {
        self.journal.opened.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            connector: self.clone(),
            database: None,
            broken: false,
        })
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        if self.broken {
            return Err(Error::Http {
                status: 503,
                body: "session is gone".to_string(),
            });
        }
        if self.connector.break_on.is_some_and(|p| sql.contains(p)) {
            self.broken = true;
            return Err(Error::Http {
                status: 503,
                body: "connection reset".to_string(),
            });
        }
        if self.connector.fail_on.is_some_and(|p| sql.contains(p)) {
            return Err(Error::Server {
                code: 0x2603,
                desc: "Table does not exist".to_string(),
            });
        }

        if sql.starts_with("insert") {
            if !self.connector.insert_delay.is_zero() {
                tokio::time::sleep(self.connector.insert_delay).await;
            }
            self.connector.journal.statements.lock().unwrap().push(sql.to_string());
            return Ok(sql.matches('(').count() as u64);
        }
        self.connector.journal.statements.lock().unwrap().push(sql.to_string());
        Ok(0)
    }

    async fn use_database(&mut self, database: &str) -> Result<()> {
        self.database = Some(database.to_string());
        self.connector
            .journal
            .statements
            .lock()
            .unwrap()
            .push(format!("use {}", database));
        Ok(())
    }

    /// Each REST request stands alone, so a ping succeeds even on a
    /// session that already saw a transport error.
    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_broken(&self) -> bool {
        self.broken
    }
}

fn scenario() -> Settings {
    Settings::from_args([
        "-host",
        "localhost",
        "-tableSize",
        "5",
        "-batchSize",
        "3",
        "-threadPoolSize",
        "2",
        "-sleep",
        "0",
        "-poolType",
        "hikari",
    ])
    .unwrap()
}

#[test]
fn test_scenario_resolves_hikari_to_mobc() {
    let settings = scenario();
    assert_eq!(settings.pool_kind, PoolKind::Mobc);
    assert_eq!(settings.table_count, 5);
    assert_eq!(settings.batch_size, 3);
    assert_eq!(settings.worker_count, 2);
    assert_eq!(settings.sleep, Duration::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_acquire_release() {
    for kind in KINDS {
        let connector = FakeConnector::default();
        let journal = connector.journal.clone();
        let source = build_source(connector, 2, kind).unwrap();
        assert_eq!(source.kind(), kind);
        assert_eq!(source.max_size(), 2);

        let mut conn1 = source.acquire().await.unwrap();
        let conn2 = source.acquire().await.unwrap();
        conn1.execute("select 1").await.unwrap();
        drop(conn1);
        let conn3 = source.acquire().await.unwrap();
        drop(conn2);
        drop(conn3);

        let mut conn4 = source.acquire().await.unwrap();
        conn4.ping().await.unwrap();
        drop(conn4);

        assert!(journal.opened.load(Ordering::SeqCst) <= 2, "{} opened too many", kind);
        assert!(source.state().await.connections <= 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_max_size_is_respected() {
    for kind in KINDS {
        let source = build_source(FakeConnector::default(), 1, kind).unwrap();

        let held = source.acquire().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(200), source.acquire()).await;
        assert!(blocked.is_err(), "{} handed out a second session", kind);

        drop(held);
        let again = tokio::time::timeout(Duration::from_secs(5), source.acquire())
            .await
            .expect("released session was not reused");
        assert!(again.is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drop_on_broken() {
    for kind in KINDS {
        let connector = FakeConnector {
            break_on: Some("explode"),
            ..Default::default()
        };
        let journal = connector.journal.clone();
        let source = build_source(connector, 1, kind).unwrap();

        let mut conn = source.acquire().await.unwrap();
        assert!(conn.execute("select explode").await.is_err());
        assert!(conn.is_broken());
        drop(conn);

        let mut conn = source.acquire().await.unwrap();
        assert!(!conn.is_broken(), "{} recycled a broken session", kind);
        conn.execute("select 1").await.unwrap();
        assert_eq!(journal.opened.load(Ordering::SeqCst), 2);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_timeout() {
    for kind in KINDS {
        let source =
            build_source_with_timeout(FakeConnector::default(), 1, kind, Duration::from_millis(100))
                .unwrap();

        let held = source.acquire().await.unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), source.acquire())
            .await
            .expect("checkout ignored its timeout");
        match outcome {
            Err(Error::Timeout(timed_out)) => assert_eq!(timed_out, kind),
            Err(e) => panic!("{} failed with {}", kind, e),
            Ok(_) => panic!("{} handed out a second session", kind),
        }
        drop(held);
    }
}

#[test]
fn test_is_send_sync() {
    fn is_send_sync<T: Send + Sync>() {}
    is_send_sync::<Arc<dyn ConnectionSource>>();
    is_send_sync::<InsertPlan>();
}

#[tokio::test]
async fn test_initialize_creates_schema() {
    let connector = FakeConnector::default();
    let journal = connector.journal.clone();
    let source = build_source(connector, 4, PoolKind::Mobc).unwrap();

    let created = schema::initialize(source.as_ref(), "pool_test", 3).await.unwrap();
    assert_eq!(created, 3);
    assert_eq!(
        journal.statements(),
        vec![
            "drop database if exists pool_test".to_string(),
            "create database if not exists pool_test".to_string(),
            "use pool_test".to_string(),
            schema::create_super_table_sql(),
            "create table t_1 using weather tags('beijing',2)".to_string(),
            "create table t_2 using weather tags('beijing',3)".to_string(),
            "create table t_3 using weather tags('beijing',4)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_initialize_stops_at_first_failure() {
    let source = build_source(FakeConnector::failing_on("t_3 using"), 4, PoolKind::Bb8).unwrap();

    match schema::initialize(source.as_ref(), "pool_test", 5).await {
        Err(Error::Schema { created, source }) => {
            assert_eq!(created, 2);
            assert!(matches!(*source, Error::Server { code: 0x2603, .. }));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_prepare_continues_with_created_tables() {
    let settings = scenario();
    let source = build_source(FakeConnector::failing_on("t_3 using"), 4, PoolKind::Deadpool).unwrap();

    let plan = prepare(source.as_ref(), &settings).await.unwrap();
    assert_eq!(plan.table_count(), 2);
    assert_eq!(plan.batch_size(), 3);
}

#[tokio::test]
async fn test_prepare_fails_without_child_tables() {
    let settings = scenario();
    let source = build_source(FakeConnector::failing_on("create table weather"), 4, PoolKind::Mobc)
        .unwrap();

    let err = prepare(source.as_ref(), &settings).await.unwrap_err();
    assert!(matches!(err, Error::Schema { created: 0, .. }));
}

#[tokio::test]
async fn test_zero_table_count_is_rejected() {
    let settings = scenario().table_count(0);
    let connector = FakeConnector::default();
    let journal = connector.journal.clone();
    let source = build_source(connector, 2, PoolKind::Mobc).unwrap();

    let err = prepare(source.as_ref(), &settings).await.unwrap_err();
    assert!(matches!(err, Error::ZeroSetting { flag: "-tableSize" }));

    let err = run_with(source, &settings, std::future::pending()).await.unwrap_err();
    assert!(matches!(err, Error::ZeroSetting { flag: "-tableSize" }));
    assert!(journal.statements().is_empty());
}

#[tokio::test]
async fn test_zero_queue_size_is_rejected() {
    let settings = scenario().queue_size(0);
    let source = build_source(FakeConnector::default(), 2, PoolKind::Bb8).unwrap();

    let err = run_with(source, &settings, std::future::pending()).await.unwrap_err();
    assert!(matches!(err, Error::ZeroSetting { flag: "-queueSize" }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_insert_task_writes_one_batch() {
    for kind in KINDS {
        let connector = FakeConnector::default();
        let journal = connector.journal.clone();
        let source = build_source(connector, 1, kind).unwrap();
        let plan = Arc::new(InsertPlan::new("pool_test", 5, 3, TableMode::Random));

        let outcome = InsertTask::new(source.clone(), plan).run().await.unwrap();
        assert_eq!(outcome.affected_rows, 3);

        let inserts = journal.inserts();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].starts_with("insert into pool_test.t_"));
        assert_eq!(inserts[0].matches('(').count(), 3);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_insert_releases_session() {
    for kind in KINDS {
        let source = build_source(FakeConnector::failing_on("insert"), 1, kind).unwrap();
        let plan = Arc::new(InsertPlan::new("pool_test", 5, 3, TableMode::Random));

        let err = InsertTask::new(source.clone(), plan).run().await.unwrap_err();
        assert!(matches!(err, Error::Server { .. }));

        let conn = tokio::time::timeout(Duration::from_secs(5), source.acquire())
            .await
            .expect("session leaked by failed insert");
        assert!(conn.is_ok(), "{} could not reacquire", kind);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatcher_submits_one_task_per_tick() {
    let settings = scenario();
    let connector = FakeConnector::default();
    let journal = connector.journal.clone();
    let source = build_source(connector, 2, PoolKind::Mobc).unwrap();
    let plan = InsertPlan::from_settings("pool_test", &settings);

    let report = Dispatcher::new(source, plan, 2, 32, settings.sleep)
        .tick_limit(20)
        .run_until(std::future::pending())
        .await;

    assert_eq!(report.ticks, 20);
    assert_eq!(report.submitted, 20);
    assert_eq!(report.rejected, 0);
    assert_eq!(report.succeeded, 20);
    assert_eq!(report.rows_inserted, 60);

    let inserts = journal.inserts();
    assert_eq!(inserts.len(), 20);
    for sql in inserts {
        for table in sql
            .split_whitespace()
            .filter_map(|word| word.strip_prefix("pool_test.t_"))
        {
            let table: u32 = table.parse().unwrap();
            assert!((1..=5).contains(&table));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_rejects_tasks() {
    let connector = FakeConnector {
        insert_delay: Duration::from_millis(500),
        ..Default::default()
    };
    let source = build_source(connector, 1, PoolKind::Bb8).unwrap();
    let plan = InsertPlan::new("pool_test", 5, 3, TableMode::Sequential);

    let report = Dispatcher::new(source, plan, 1, 1, Duration::ZERO)
        .backoff(Backoff::new(Duration::from_millis(1), Duration::from_millis(4)))
        .tick_limit(10)
        .run_until(std::future::pending())
        .await;

    assert_eq!(report.ticks, 10);
    assert!(report.rejected >= 1);
    assert!(report.submitted <= 3);
    assert_eq!(report.submitted + report.rejected, 10);
    assert_eq!(report.succeeded, report.submitted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_with_stops_on_shutdown() {
    let settings = scenario().sleep(Duration::from_millis(10));
    let connector = FakeConnector::default();
    let journal = connector.journal.clone();
    let source = build_source(connector, 2, PoolKind::R2d2).unwrap();

    let report = run_with(
        source,
        &settings,
        tokio::time::sleep(Duration::from_millis(300)),
    )
    .await
    .unwrap();

    assert!(report.ticks > 0);
    assert_eq!(report.submitted + report.rejected, report.ticks);
    assert_eq!(report.succeeded + report.failed, report.submitted);
    assert_eq!(journal.inserts().len() as u64, report.succeeded);
    assert!(journal
        .statements()
        .contains(&"create table t_5 using weather tags('beijing',6)".to_string()));
}
