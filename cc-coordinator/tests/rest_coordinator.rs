use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::ObjectStore;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use cc_client::models::{
    CommitInfo, CommitRequest, CommitsRequest, CommitsResponse, RegisterTableRequest,
    RegisterTableResponse,
};
use cc_coordinator::{RestCommitCoordinatorBuilder, TABLE_ID_KEY, TOKEN_KEY, URL_KEY};
use cc_kernel::actions::{Metadata, Protocol};
use cc_kernel::coordinated_commits::{
    CommitCoordinatorBuilder, CommitCoordinatorClient, CommitCoordinatorRegistry,
    TableDescriptor,
};
use cc_kernel::engine::default::executor::tokio::TokioBackgroundExecutor;
use cc_kernel::engine::default::DefaultEngine;
use cc_kernel::table_features::TableFeature;
use cc_kernel::table_properties::{
    COORDINATED_COMMITS_COORDINATOR_CONF, COORDINATED_COMMITS_COORDINATOR_NAME,
    COORDINATED_COMMITS_TABLE_CONF,
};
use cc_kernel::transaction::CommitResult;
use cc_kernel::{Error, Snapshot, Version};

#[derive(Debug)]
struct TableState {
    table_uri: String,
    registered_version: i64,
    /// ratified commits the service still tracks
    commits: Vec<CommitInfo>,
    latest_version: i64,
}

/// A commit-coordinator service that keeps its state in memory and speaks just enough HTTP.
#[derive(Debug, Default)]
struct FakeService {
    tables: Mutex<HashMap<String, TableState>>,
}

impl FakeService {
    fn handle(&self, method: &str, path: &str, body: Value) -> (u16, String) {
        let mut tables = self.tables.lock().unwrap();
        match (method, path) {
            ("POST", "/api/tables") => {
                let request: RegisterTableRequest = serde_json::from_value(body).unwrap();
                let existing = tables
                    .iter()
                    .find(|(_, table)| table.table_uri == request.table_uri)
                    .map(|(id, _)| id.clone());
                let table_id = existing.unwrap_or_else(|| {
                    let table_id = format!("table-{}", tables.len());
                    tables.insert(
                        table_id.clone(),
                        TableState {
                            table_uri: request.table_uri,
                            registered_version: request.current_version,
                            commits: vec![],
                            latest_version: -1,
                        },
                    );
                    table_id
                });
                let response = RegisterTableResponse { table_id };
                (200, serde_json::to_string(&response).unwrap())
            }
            ("POST", "/api/commits") => {
                let request: CommitRequest = serde_json::from_value(body).unwrap();
                let Some(table) = tables.get_mut(&request.table_id) else {
                    return (404, "no such table".to_string());
                };
                if let Some(commit) = request.commit_info {
                    let expected = table.latest_version.max(table.registered_version) + 1;
                    if commit.version != expected {
                        return (409, format!("expected version {expected}"));
                    }
                    table.latest_version = commit.version;
                    table.commits.push(commit);
                }
                if let Some(backfilled) = request.latest_backfilled_version {
                    table.commits.retain(|c| c.version > backfilled);
                }
                (200, "{}".to_string())
            }
            ("GET", "/api/commits") => {
                let request: CommitsRequest = serde_json::from_value(body).unwrap();
                let Some(table) = tables.get(&request.table_id) else {
                    return (404, "no such table".to_string());
                };
                let commits = table
                    .commits
                    .iter()
                    .filter(|c| request.start_version.is_none_or(|s| c.version >= s))
                    .filter(|c| request.end_version.is_none_or(|e| c.version <= e))
                    .cloned()
                    .collect();
                let response = CommitsResponse {
                    commits: Some(commits),
                    latest_table_version: table.latest_version,
                };
                (200, serde_json::to_string(&response).unwrap())
            }
            _ => (400, format!("unexpected {method} {path}")),
        }
    }

    fn tracked_versions(&self) -> Vec<i64> {
        let tables = self.tables.lock().unwrap();
        tables
            .values()
            .flat_map(|t| t.commits.iter().map(|c| c.version))
            .collect()
    }
}

async fn serve(service: Arc<FakeService>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/api/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let service = service.clone();
            tokio::spawn(async move { respond(stream, &service).await });
        }
    });
    endpoint
}

async fn respond(mut stream: TcpStream, service: &FakeService) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut request_line = head.lines().next().unwrap().split_whitespace();
    let method = request_line.next().unwrap().to_string();
    let path = request_line.next().unwrap().to_string();
    let content_length: usize = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .map(|(_, value)| value.trim().parse().unwrap())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[header_end..header_end + content_length])
        .unwrap_or(Value::Null);

    let (status, body) = service.handle(&method, &path, body);
    let response = format!(
        "HTTP/1.1 {status} STATUS\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();
}

struct Fixture {
    service: Arc<FakeService>,
    store: Arc<InMemory>,
    engine: DefaultEngine<TokioBackgroundExecutor>,
    registry: Arc<CommitCoordinatorRegistry>,
    client: Arc<dyn CommitCoordinatorClient>,
    table_root: Url,
    descriptor: TableDescriptor,
}

/// A table at version 0 registered with a fresh fake service.
async fn setup() -> Fixture {
    let service = Arc::new(FakeService::default());
    let endpoint = serve(service.clone()).await;
    let store = Arc::new(InMemory::new());
    let engine = DefaultEngine::new(store.clone());
    let table_root = Url::parse("memory:///table/").unwrap();
    let log_path = table_root.join("_delta_log/").unwrap();

    let builder = RestCommitCoordinatorBuilder::new();
    let registry = Arc::new(CommitCoordinatorRegistry::new());
    registry.register(Arc::new(builder.clone())).unwrap();
    let coordinator_conf = HashMap::from([
        (URL_KEY.to_string(), endpoint),
        (TOKEN_KEY.to_string(), "token".to_string()),
    ]);
    let client = builder.build(&engine, &coordinator_conf).unwrap();

    let schema = r#"{"type":"struct","fields":[{"name":"id","type":"long","nullable":true,"metadata":{}}]}"#;
    let metadata = Metadata::try_new(None, None, schema, vec![], 0, HashMap::new()).unwrap();
    let protocol =
        Protocol::try_new(1, 2, None::<Vec<TableFeature>>, None::<Vec<TableFeature>>).unwrap();
    let table_conf = client
        .register_table(&engine, &log_path, None, 0, &metadata, &protocol)
        .unwrap();
    assert!(table_conf.contains_key(TABLE_ID_KEY));

    let commit_0 = [
        json!({"commitInfo": {"timestamp": 0, "operation": "CREATE TABLE"}}),
        json!({"protocol": {"minReaderVersion": 1, "minWriterVersion": 2}}),
        json!({"metaData": {
            "id": "test-table",
            "format": {"provider": "parquet", "options": {}},
            "schemaString": schema,
            "partitionColumns": [],
            "createdTime": 0,
            "configuration": {
                COORDINATED_COMMITS_COORDINATOR_NAME: "rest",
                COORDINATED_COMMITS_COORDINATOR_CONF: serde_json::to_string(&coordinator_conf).unwrap(),
                COORDINATED_COMMITS_TABLE_CONF: serde_json::to_string(&table_conf).unwrap(),
            }
        }}),
    ]
    .map(|action| action.to_string())
    .join("\n");
    store
        .put(
            &Path::from("table/_delta_log/00000000000000000000.json"),
            commit_0.into(),
        )
        .await
        .unwrap();

    Fixture {
        service,
        store,
        engine,
        registry,
        client,
        table_root,
        descriptor: TableDescriptor::new(log_path, None, table_conf),
    }
}

fn versions(fixture: &Fixture, start: Option<Version>, end: Option<Version>) -> Vec<Version> {
    fixture
        .client
        .get_commits(&fixture.engine, &fixture.descriptor, start, end)
        .unwrap()
        .commits()
        .iter()
        .map(|c| c.version())
        .collect()
}

fn snapshot(fixture: &Fixture) -> Arc<Snapshot> {
    Snapshot::builder_for(fixture.table_root.clone())
        .with_coordinator_registry(fixture.registry.clone())
        .build(&fixture.engine)
        .unwrap()
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn commit_through_the_service() {
    let fixture = setup().await;
    let engine = &fixture.engine;

    for expected in 1..=2 {
        let txn = snapshot(&fixture)
            .transaction(engine)
            .unwrap()
            .with_operation("WRITE".to_string());
        let CommitResult::CommittedTransaction(committed) = txn.commit(engine).unwrap() else {
            panic!("commit {expected} should succeed");
        };
        assert_eq!(committed.commit_version(), expected);
        assert!(committed
            .commit_file()
            .location
            .path()
            .starts_with("/table/_delta_log/_staged_commits/"));
    }
    assert_eq!(versions(&fixture, None, None), vec![1, 2]);
    assert_eq!(versions(&fixture, Some(2), Some(2)), vec![2]);
    assert_eq!(snapshot(&fixture).version(), 2);

    // a writer on a stale snapshot is told about the conflict
    let stale = Snapshot::builder_for(fixture.table_root.clone())
        .with_coordinator_registry(fixture.registry.clone())
        .at_version(1)
        .build(engine)
        .unwrap();
    match stale.transaction(engine).unwrap().commit(engine).unwrap() {
        CommitResult::ConflictedTransaction(conflicted) => {
            assert_eq!(conflicted.conflict_version(), 2)
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn backfill_publishes_and_reports() {
    let fixture = setup().await;
    let engine = &fixture.engine;
    for _ in 1..=3 {
        let result = snapshot(&fixture)
            .transaction(engine)
            .unwrap()
            .commit(engine)
            .unwrap();
        assert!(result.is_committed());
    }

    fixture
        .client
        .backfill_to_version(engine, &fixture.descriptor, 2, None)
        .unwrap();
    for version in 1..=2 {
        let path = Path::from(format!("table/_delta_log/{version:020}.json"));
        fixture.store.head(&path).await.unwrap();
    }
    let unpublished = Path::from(format!("table/_delta_log/{:020}.json", 3));
    assert!(fixture.store.head(&unpublished).await.is_err());
    // the service stopped tracking what was published
    assert_eq!(fixture.service.tracked_versions(), vec![3]);

    // readers combine the published log with what the service still tracks
    let latest = snapshot(&fixture);
    assert_eq!(latest.version(), 3);

    // again, with a hint: nothing changes
    fixture
        .client
        .backfill_to_version(engine, &fixture.descriptor, 2, Some(2))
        .unwrap();
    assert_eq!(fixture.service.tracked_versions(), vec![3]);

    let res = fixture
        .client
        .backfill_to_version(engine, &fixture.descriptor, 7, None);
    assert!(matches!(
        res,
        Err(Error::InvalidBackfillVersion {
            version: 7,
            latest_version: Some(3)
        })
    ));
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn unregistered_tables_fail() {
    let fixture = setup().await;
    let unknown = TableDescriptor::new(
        fixture.descriptor.log_path().clone(),
        None,
        HashMap::from([(TABLE_ID_KEY.to_string(), "no-such-table".to_string())]),
    );
    let res = fixture
        .client
        .get_commits(&fixture.engine, &unknown, None, None);
    assert!(matches!(res, Err(Error::CommitFailed(_))));

    let missing_id = TableDescriptor::new(
        fixture.descriptor.log_path().clone(),
        None,
        HashMap::new(),
    );
    let res = fixture
        .client
        .get_commits(&fixture.engine, &missing_id, None, None);
    assert!(matches!(res, Err(Error::CommitFailed(_))));
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn backfill_before_any_ratified_commit() {
    let fixture = setup().await;
    let engine = &fixture.engine;

    // the service reports -1 until something is ratified, so only published versions qualify
    fixture
        .client
        .backfill_to_version(engine, &fixture.descriptor, 0, None)
        .unwrap();
    assert!(fixture.service.tracked_versions().is_empty());

    let res = fixture
        .client
        .backfill_to_version(engine, &fixture.descriptor, 1, None);
    assert!(matches!(
        res,
        Err(Error::InvalidBackfillVersion {
            version: 1,
            latest_version: None
        })
    ));
    let unpublished = Path::from(format!("table/_delta_log/{:020}.json", 1));
    assert!(fixture.store.head(&unpublished).await.is_err());
}
