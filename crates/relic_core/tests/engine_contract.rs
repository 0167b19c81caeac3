//! Engine pipeline contract, exercised against the programmable fake
//! driver: statement shapes, relation batching, error translation context,
//! and option validation — no real database involved.

use relic_core::schema::{ModelRegistry, Table, col};
use relic_core::{
    Casing, Database, DatabaseOptions, DbError, DialectFamily, ErrorKind, Filter, Fragment,
    GetOptions, IdStrategy, Include, IncludeArgs, ListOptions, QueryOutput, Record, Value,
};
use relic_test_support::{FakeDriver, blog_registry};

fn post_row(id: &str, author: &str, title: &str, views: i64) -> Vec<Value> {
    vec![
        Value::Text(id.to_string()),
        Value::Text(author.to_string()),
        Value::Text(title.to_string()),
        Value::Int(views),
        Value::Bool(false),
        Value::Null,
    ]
}

fn posts_output(rows: Vec<Vec<Value>>) -> QueryOutput {
    let row_count = rows.len() as u64;
    QueryOutput {
        columns: vec![
            "id".into(),
            "author_id".into(),
            "title".into(),
            "views".into(),
            "published".into(),
            "updated_at".into(),
        ],
        rows,
        row_count,
    }
}

fn database(fake: FakeDriver) -> Database {
    Database::new(DatabaseOptions::new(fake.as_driver_arc(), blog_registry()))
}

#[tokio::test]
async fn test_include_of_n_relations_issues_n_secondary_queries() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_result(
            "FROM \"posts\"",
            posts_output(vec![
                post_row("p1", "u1", "first", 10),
                post_row("p2", "u1", "second", 20),
                post_row("p3", "u2", "third", 30),
            ]),
        )
        .with_default_result(QueryOutput::empty());

    let db = database(fake.clone());
    let posts = db.model("posts").unwrap();
    let results = posts
        .list(
            ListOptions::new()
                .include(Include::new().relation("author").relation("comments")),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);

    // One primary query plus exactly one batched query per relation,
    // regardless of the three parent rows.
    let selects = fake.executed_matching("SELECT");
    assert_eq!(selects.len(), 3);
    let author_queries = fake.executed_matching("FROM \"users\"");
    assert_eq!(author_queries.len(), 1);
    let comment_queries = fake.executed_matching("FROM \"comments\"");
    assert_eq!(comment_queries.len(), 1);

    // The batch collects distinct foreign keys only.
    let (_, params) = &author_queries[0];
    assert_eq!(
        params,
        &vec![Value::Text("u1".into()), Value::Text("u2".into())]
    );
}

#[tokio::test]
async fn test_many_through_include_is_a_single_join_query() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_result(
            "FROM \"posts\"",
            posts_output(vec![
                post_row("p1", "u1", "first", 1),
                post_row("p2", "u1", "second", 2),
            ]),
        )
        .with_default_result(QueryOutput::empty());

    let db = database(fake.clone());
    let results = db
        .model("posts")
        .unwrap()
        .list(ListOptions::new().include(Include::new().relation("tags")))
        .await
        .unwrap();
    assert_eq!(results.len(), 2);

    let joins = fake.executed_matching("JOIN \"post_tags\"");
    assert_eq!(joins.len(), 1);
    let (sql, params) = &joins[0];
    assert!(sql.contains("\"post_tags\".\"post_id\" IN ($1, $2)"), "{}", sql);
    assert!(sql.contains("AS \"_parent_key\""), "{}", sql);
    assert_eq!(
        params,
        &vec![Value::Text("p1".into()), Value::Text("p2".into())]
    );

    // With no join rows every parent still carries an empty collection.
    for post in &results {
        match post.related("tags") {
            Some(relic_core::RelationValue::Many(tags)) => assert!(tags.is_empty()),
            other => panic!("expected tags, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_driver_error_gains_table_context() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_error("INSERT", DbError::new(ErrorKind::UniqueViolation, "duplicate"));

    let db = database(fake);
    let posts = db.model("posts").unwrap();
    let err = posts
        .create(relic_core::Record::from_iter([
            ("id".to_string(), Value::Text("p1".into())),
            ("author_id".to_string(), Value::Text("u1".into())),
            ("title".to_string(), Value::Text("x".into())),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UniqueViolation);
    assert_eq!(err.table.as_deref(), Some("posts"));
}

#[tokio::test]
async fn test_include_depth_rejected_past_cap() {
    let db = database(FakeDriver::new(DialectFamily::Postgres));
    let posts = db.model("posts").unwrap();

    let mut include = Include::new().relation("comments");
    for _ in 0..3 {
        include = Include::new().relation_with(
            "comments",
            IncludeArgs {
                include: Some(include),
                ..IncludeArgs::default()
            },
        );
    }

    let err = posts
        .list(ListOptions::new().include(include))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_nullable_column_without_default_is_required() {
    let registry = ModelRegistry::builder()
        .table(
            "notes",
            Table::new("notes")
                .column("id", col::uuid().primary_generated(IdStrategy::Uuid))
                .column("body", col::text())
                .column("archived_at", col::timestamptz().nullable()),
        )
        .build()
        .unwrap();
    let fake = FakeDriver::new(DialectFamily::Postgres).with_result(
        "INSERT INTO \"notes\"",
        QueryOutput {
            columns: vec!["id".into(), "body".into(), "archived_at".into()],
            rows: vec![vec![
                Value::Text("n1".into()),
                Value::Text("draft".into()),
                Value::Null,
            ]],
            row_count: 1,
        },
    );
    let db = Database::new(DatabaseOptions::new(fake.clone().as_driver_arc(), registry));
    let notes = db.model("notes").unwrap();

    // Nullable without a default is still required; omitting it fails
    // before any SQL is emitted.
    let err = notes
        .create(Record::from_iter([(
            "body".to_string(),
            Value::Text("draft".into()),
        )]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.column.as_deref(), Some("archived_at"));
    assert!(fake.stats().executed.is_empty());

    // An explicit null satisfies the requirement.
    notes
        .create(Record::from_iter([
            ("body".to_string(), Value::Text("draft".into())),
            ("archived_at".to_string(), Value::Null),
        ]))
        .await
        .unwrap();
    let inserts = fake.executed_matching("INSERT INTO \"notes\"");
    assert_eq!(inserts.len(), 1);
    let (sql, params) = &inserts[0];
    assert!(sql.contains("\"archived_at\""), "{}", sql);
    assert!(params.contains(&Value::Null));
}

#[tokio::test]
async fn test_empty_update_payload_rejected() {
    let db = database(FakeDriver::new(DialectFamily::Postgres));
    let posts = db.model("posts").unwrap();

    let err = posts
        .update(Filter::eq("id", "p1"), relic_core::Record::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    // A payload holding only read-only columns strips down to empty too.
    let err = posts
        .update(
            Filter::eq("id", "p1"),
            relic_core::Record::from_iter([(
                "updated_at".to_string(),
                Value::Text("2024-01-01T00:00:00Z".into()),
            )]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_unknown_model_and_relation() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_result("FROM \"posts\"", posts_output(vec![post_row("p1", "u1", "t", 1)]));
    let db = database(fake);
    assert!(db.model("missing").is_err());

    let posts = db.model("posts").unwrap();
    let err = posts
        .list(ListOptions::new().include(Include::new().relation("reviews")))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_get_limits_to_one_row() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_result("FROM \"posts\"", posts_output(vec![post_row("p1", "u1", "t", 1)]));
    let db = database(fake.clone());

    let post = db
        .model("posts")
        .unwrap()
        .get(GetOptions::new(Filter::eq("id", "p1")))
        .await
        .unwrap();
    assert!(post.is_some());

    let (sql, params) = fake.executed_matching("FROM \"posts\"").remove(0);
    assert!(sql.contains("LIMIT $2"), "{}", sql);
    assert_eq!(params[1], Value::Int(1));
}

#[tokio::test]
async fn test_transaction_routes_through_one_handle() {
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_default_result(QueryOutput::empty());
    let db = database(fake.clone());

    let tx = db.begin().await.unwrap();
    tx.query(&Fragment::raw("SELECT 1")).await.unwrap();
    tx.commit().await.unwrap();

    let rolled = db.begin().await.unwrap();
    rolled.rollback().await.unwrap();

    let stats = fake.stats();
    assert_eq!(stats.begin_calls, 2);
    assert_eq!(stats.commit_calls, 1);
    assert_eq!(stats.rollback_calls, 1);
}

#[tokio::test]
async fn test_close_and_health_delegate_to_driver() {
    let fake = FakeDriver::new(DialectFamily::Postgres);
    let db = database(fake.clone());

    assert!(db.is_healthy().await);
    fake.set_healthy(false);
    assert!(!db.is_healthy().await);

    db.close().await.unwrap();
    assert_eq!(fake.stats().close_calls, 1);
}

#[tokio::test]
async fn test_internals_expose_registry_and_tenant_graph() {
    let db = database(FakeDriver::new(DialectFamily::Postgres));
    let internals = db.internals();

    assert_eq!(internals.registry.models().len(), 5);
    assert!(internals.tenant_graph.directly_scoped.is_empty());
    assert_eq!(internals.dialect.param(3), "$3");
}

#[tokio::test]
async fn test_casing_threads_through_statements() {
    let registry = blog_registry();
    let fake = FakeDriver::new(DialectFamily::Postgres)
        .with_default_result(QueryOutput::empty());
    let db = Database::new(
        DatabaseOptions::new(fake.clone().as_driver_arc(), registry).casing(Casing::Preserve),
    );

    let _ = db
        .model("posts")
        .unwrap()
        .list(ListOptions::new().filter(Filter::eq("updated_at", Value::Null)))
        .await
        .unwrap();

    let (sql, _) = fake.executed_matching("FROM \"posts\"").remove(0);
    assert!(sql.contains("\"updated_at\" IS NULL"));
}
