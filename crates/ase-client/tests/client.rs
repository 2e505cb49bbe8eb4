//! End-to-end tests against the mock ASE server.
//!
//! The mock speaks the real packet and package codecs over TCP, so these
//! tests exercise the full wire path: login, language commands, cursors,
//! prepared statements and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use ase_client::{Config, Connection, Error, Value};
use ase_testing::{MockAseServer, MockResponse, MockResultSet, MockServerBuilder};

fn user_rows() -> MockResponse {
    MockResponse::rows(
        vec![
            MockResultSet::int_column("id"),
            MockResultSet::varchar_column("name"),
        ],
        vec![
            vec![Value::Int(1), Value::Chars("Alice".into())],
            vec![Value::Int(2), Value::Chars("Bob".into())],
        ],
    )
}

fn config_for(server: &MockAseServer) -> Config {
    Config::new(server.host(), "sa", "secret")
        .port(server.port())
        .encrypt(false)
}

async fn start_server(builder: MockServerBuilder) -> MockAseServer {
    builder.build().await.expect("mock server failed to start")
}

#[tokio::test]
async fn test_plaintext_login_and_logout() {
    let server = start_server(MockAseServer::builder().with_password("secret")).await;

    let conn = Connection::connect(config_for(&server)).await.unwrap();
    assert!(!conn.has_session_key());
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_plaintext_login_rejects_wrong_password() {
    let server = start_server(MockAseServer::builder().with_password("secret")).await;

    let config = Config::new(server.host(), "sa", "wrong")
        .port(server.port())
        .encrypt(false);
    let result = Connection::connect(config).await;
    assert!(result.is_err(), "login with a wrong password must fail");
}

#[tokio::test]
async fn test_encrypted_login() {
    let server = start_server(MockAseServer::builder().with_password("secret")).await;

    let config = Config::new(server.host(), "sa", "secret").port(server.port());
    let conn = Connection::connect(config).await.unwrap();
    assert!(conn.has_session_key());
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_encrypted_login_rejects_wrong_password() {
    let server = start_server(MockAseServer::builder().with_password("secret")).await;

    let config = Config::new(server.host(), "sa", "wrong").port(server.port());
    assert!(Connection::connect(config).await.is_err());
}

#[tokio::test]
async fn test_query_streams_rows() {
    let server = start_server(
        MockAseServer::builder().with_response("select id, name from users", user_rows()),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut rows = conn.query("select id, name from users").await.unwrap();
    assert_eq!(rows.formats().len(), 2);

    let first = rows.next_row().await.unwrap().unwrap();
    assert_eq!(first.get(0), Some(&Value::Int(1)));
    assert_eq!(first.get_by_name("name"), Some(&Value::Chars("Alice".into())));

    let second = rows.next_row().await.unwrap().unwrap();
    assert_eq!(second.get_by_name("id"), Some(&Value::Int(2)));

    assert!(rows.next_row().await.unwrap().is_none());
    rows.close().await.unwrap();

    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_query_multiple_result_sets() {
    let sets = MockResponse::ResultSets(vec![
        MockResultSet::new(
            vec![MockResultSet::int_column("a")],
            vec![vec![Value::Int(1)]],
        ),
        MockResultSet::new(
            vec![MockResultSet::varchar_column("b")],
            vec![vec![Value::Chars("two".into())], vec![Value::Chars("three".into())]],
        ),
    ]);
    let server =
        start_server(MockAseServer::builder().with_response("select a select b", sets)).await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut rows = conn.query("select a select b").await.unwrap();
    let row = rows.next_row().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::Int(1)));
    assert!(rows.next_row().await.unwrap().is_none());

    assert!(rows.next_resultset().await.unwrap());
    assert_eq!(rows.formats()[0].name, "b");
    let row = rows.next_row().await.unwrap().unwrap();
    assert_eq!(row.get(0), Some(&Value::Chars("two".into())));

    rows.close().await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_execute_reports_affected_rows() {
    let server = start_server(
        MockAseServer::builder()
            .with_response("delete from t where id < 10", MockResponse::affected(9)),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let result = conn.execute("delete from t where id < 10").await.unwrap();
    assert_eq!(result.rows_affected, 9);

    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_server_error_surfaces_and_connection_recovers() {
    let server = start_server(
        MockAseServer::builder()
            .with_response("select * from missing", MockResponse::error(208, "missing not found"))
            .with_response("select 1", MockResponse::affected(0)),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let err = conn.query("select * from missing").await.unwrap_err();
    match err {
        Error::Server { number, class, message, .. } => {
            assert_eq!(number, 208);
            assert_eq!(class, 14);
            assert!(message.contains("missing not found"));
        }
        other => panic!("expected a server error, got {other:?}"),
    }

    // The failed response must not poison the next command.
    conn.execute("select 1").await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_cursor_fetches_in_batches() {
    let response = MockResponse::rows(
        vec![MockResultSet::int_column("n")],
        (1..=5).map(|n| vec![Value::Int(n)]).collect(),
    );
    let server =
        start_server(MockAseServer::builder().with_response("select n from seq", response)).await;

    let config = config_for(&server).cursor_fetch_rows(2);
    let mut conn = Connection::connect(config).await.unwrap();

    let mut cursor = conn.declare_cursor("c1", "select n from seq").await.unwrap();
    assert!(cursor.id() > 0);
    assert_eq!(cursor.formats().len(), 1);

    let mut fetched = Vec::new();
    let mut batches = 0;
    while !cursor.is_closed() {
        let batch = conn.fetch_cursor(&mut cursor).await.unwrap();
        batches += 1;
        for row in batch {
            fetched.push(row.get(0).cloned().unwrap());
        }
    }
    assert_eq!(batches, 3);
    assert_eq!(
        fetched,
        (1..=5).map(Value::Int).collect::<Vec<_>>()
    );

    conn.close_cursor(cursor).await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_cursor_close_with_split_dealloc() {
    let response = MockResponse::rows(
        vec![MockResultSet::int_column("n")],
        vec![vec![Value::Int(1)]],
    );
    let server = start_server(
        MockAseServer::builder()
            .with_response("select n from t", response)
            .with_split_cursor_dealloc(),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let cursor = conn.declare_cursor("c1", "select n from t").await.unwrap();
    conn.close_cursor(cursor).await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_fetch_after_exhaustion_returns_no_rows() {
    let response = MockResponse::rows(
        vec![MockResultSet::int_column("n")],
        vec![vec![Value::Int(1)]],
    );
    let server =
        start_server(MockAseServer::builder().with_response("select n from t", response)).await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let mut cursor = conn.declare_cursor("c1", "select n from t").await.unwrap();
    let batch = conn.fetch_cursor(&mut cursor).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert!(cursor.is_closed());

    let empty = conn.fetch_cursor(&mut cursor).await.unwrap();
    assert!(empty.is_empty());

    conn.close_cursor(cursor).await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_prepared_statement_with_parameters() {
    let server = start_server(
        MockAseServer::builder()
            .with_param_formats(
                "update t set name = ? where id = ?",
                vec![
                    MockResultSet::varchar_column("name"),
                    MockResultSet::int_column("id"),
                ],
            )
            .with_response("update t set name = ? where id = ?", MockResponse::affected(1)),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let stmt = conn.prepare("update t set name = ? where id = ?").await.unwrap();
    assert!(stmt.param_formats().is_some());

    let result = conn
        .execute_prepared(&stmt, vec![Value::Chars("Carol".into()), Value::Int(3)])
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    conn.close_statement(stmt).await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_prepared_query_streams_rows() {
    let server = start_server(
        MockAseServer::builder().with_response("select id, name from users", user_rows()),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    let stmt = conn.prepare("select id, name from users").await.unwrap();
    assert!(stmt.row_formats().is_some());

    let mut rows = conn.query_prepared(&stmt, Vec::new()).await.unwrap();
    let mut count = 0;
    while let Some(row) = rows.next_row().await.unwrap() {
        assert_eq!(row.len(), 2);
        count += 1;
    }
    rows.close().await.unwrap();
    assert_eq!(count, 2);

    conn.close_statement(stmt).await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_execute_immediate() {
    let server = start_server(
        MockAseServer::builder().with_response("truncate table t", MockResponse::affected(0)),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    conn.execute_immediate("truncate table t").await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_prepare_rejects_bad_statement() {
    let server = start_server(
        MockAseServer::builder()
            .with_response("select * from", MockResponse::error(102, "incorrect syntax")),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    // The mock acknowledges the prepare; execution then fails.
    let stmt = conn.prepare("select * from").await.unwrap();
    let err = conn.execute_prepared(&stmt, Vec::new()).await.unwrap_err();
    assert!(matches!(err, Error::Server { number: 102, .. }));

    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_cancel_leaves_connection_usable() {
    let server = start_server(
        MockAseServer::builder().with_response("select 1", MockResponse::affected(0)),
    )
    .await;
    let mut conn = Connection::connect(config_for(&server)).await.unwrap();

    conn.cancel().await.unwrap();
    conn.execute("select 1").await.unwrap();
    conn.logout().await.unwrap();
}

#[tokio::test]
async fn test_connect_selects_database() {
    let server = start_server(MockAseServer::builder()).await;

    let config = config_for(&server).database("pubs2");
    let conn = Connection::connect(config).await.unwrap();
    conn.logout().await.unwrap();
}
