//! End-to-end scenarios over the embedded backend: the schema is
//! materialized from the registry's own DDL rendering, then exercised
//! through the client façade.

use relic_core::schema::{Model, ModelRegistry, SelectSpec, Table, VisibilityTier, col};
use relic_core::sql::{create_indexes, create_table};
use relic_core::{
    Casing, Database, DatabaseOptions, ErrorKind, Filter, Fragment, GetOptions, Include,
    IncludeArgs, ListOptions, GroupByOptions, AggregateOptions, AggregateSpec, Record,
    RelationValue, SortDirection, Value,
};
use relic_driver_sqlite::SqliteDriver;
use relic_test_support::blog_registry;
use std::sync::Arc;
use std::time::Duration;

async fn materialize(db: &Database) {
    let internals = db.internals();
    let mut statements = Vec::new();
    for model in internals.registry.models().values() {
        statements.push(create_table(internals.dialect, &model.table, Casing::SnakeCase));
        statements.extend(create_indexes(
            internals.dialect,
            &model.table,
            Casing::SnakeCase,
        ));
    }
    for sql in statements {
        db.query(&Fragment::raw(sql)).await.expect("DDL applies");
    }
}

async fn blog_db() -> Database {
    let driver = SqliteDriver::open_in_memory().expect("in-memory sqlite");
    let db = Database::new(DatabaseOptions::new(Arc::new(driver), blog_registry()));
    materialize(&db).await;
    db
}

fn record(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> Record {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

async fn seed_user(db: &Database, name: &str, email: &str) -> Value {
    let user = db
        .model("users")
        .unwrap()
        .create(record([
            ("email", Value::Text(email.to_string())),
            ("password_hash", Value::Text("hash".into())),
            ("name", Value::Text(name.to_string())),
        ]))
        .await
        .unwrap();
    user.get("id").unwrap().clone()
}

async fn seed_post(db: &Database, author: &Value, title: &str, views: i64) -> Value {
    let post = db
        .model("posts")
        .unwrap()
        .create(record([
            ("author_id", author.clone()),
            ("title", Value::Text(title.to_string())),
            ("views", Value::Int(views)),
        ]))
        .await
        .unwrap();
    post.get("id").unwrap().clone()
}

#[tokio::test]
async fn test_create_then_read_respects_visibility() {
    let db = blog_db().await;
    let users = db.model("users").unwrap();

    let id = Value::Uuid(uuid::Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap());
    users
        .create(record([
            ("id", id.clone()),
            ("email", Value::Text("a@b".into())),
            ("password_hash", Value::Text("h".into())),
            ("name", Value::Text("Alice".into())),
        ]))
        .await
        .unwrap();

    let rows = users
        .list(ListOptions::new().select(SelectSpec::Not(VisibilityTier::Sensitive)))
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.get("id"), Some(&id));
    assert_eq!(row.get("name"), Some(&Value::Text("Alice".into())));
    assert!(row.get("email").is_none());
    assert!(row.get("password_hash").is_none());

    // Hidden columns come back only on explicit selection.
    let explicit = users
        .list(ListOptions::new().select(SelectSpec::Columns(vec!["password_hash".into()])))
        .await
        .unwrap();
    assert_eq!(
        explicit[0].get("password_hash"),
        Some(&Value::Text("h".into()))
    );
}

#[tokio::test]
async fn test_upsert_create_then_update_path() {
    let registry = ModelRegistry::builder()
        .model(
            "flags",
            Model::new(
                Table::new("flags")
                    .column("id", col::uuid().primary())
                    .column("name", col::text().unique())
                    .column("enabled", col::boolean()),
            ),
        )
        .build()
        .unwrap();
    let driver = SqliteDriver::open_in_memory().unwrap();
    let db = Database::new(DatabaseOptions::new(Arc::new(driver), registry));
    materialize(&db).await;

    let flags = db.model("flags").unwrap();
    let id = Value::Uuid(uuid::Uuid::parse_str("66666666-6666-6666-6666-666666666666").unwrap());

    let created = flags
        .upsert(
            Filter::eq("name", "new"),
            record([
                ("id", id.clone()),
                ("name", Value::Text("new".into())),
                ("enabled", Value::Bool(false)),
            ]),
            record([("enabled", Value::Bool(true))]),
        )
        .await
        .unwrap();
    assert_eq!(created.get("enabled"), Some(&Value::Bool(false)));

    let updated = flags
        .upsert(
            Filter::eq("name", "new"),
            record([
                ("id", id.clone()),
                ("name", Value::Text("new".into())),
                ("enabled", Value::Bool(false)),
            ]),
            record([("enabled", Value::Bool(true))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.get("enabled"), Some(&Value::Bool(true)));
    assert_eq!(updated.get("id"), Some(&id));
}

#[tokio::test]
async fn test_pagination_is_stable_under_order() {
    let db = blog_db().await;
    let author = seed_user(&db, "Ann", "ann@example.com").await;
    seed_post(&db, &author, "popular", 100).await;
    seed_post(&db, &author, "quiet", 5).await;

    let posts = db.model("posts").unwrap();

    let first = posts
        .list_and_count(
            ListOptions::new()
                .order_by("views", SortDirection::Descending)
                .limit(1)
                .offset(0),
        )
        .await
        .unwrap();
    assert_eq!(first.total, 2);
    assert_eq!(first.data.len(), 1);
    assert_eq!(first.data[0].get("views"), Some(&Value::Int(100)));

    let second = posts
        .list_and_count(
            ListOptions::new()
                .order_by("views", SortDirection::Descending)
                .limit(1)
                .offset(1),
        )
        .await
        .unwrap();
    assert_eq!(second.total, 2);
    assert_eq!(second.data[0].get("views"), Some(&Value::Int(5)));
}

#[tokio::test]
async fn test_foreign_key_violation_translates() {
    let db = blog_db().await;
    let posts = db.model("posts").unwrap();

    let err = posts
        .create(record([
            ("author_id", Value::Uuid(uuid::Uuid::new_v4())),
            ("title", Value::Text("orphan".into())),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ForeignKeyViolation);
    assert_eq!(err.table.as_deref(), Some("posts"));
}

#[tokio::test]
async fn test_include_loads_relations() {
    let db = blog_db().await;
    let author = seed_user(&db, "Ann", "ann@example.com").await;
    let post_id = seed_post(&db, &author, "with comment", 1).await;

    db.model("comments")
        .unwrap()
        .create(record([
            ("post_id", post_id.clone()),
            ("body", Value::Text("nice".into())),
        ]))
        .await
        .unwrap();

    let tag = db
        .model("tags")
        .unwrap()
        .create(record([("label", Value::Text("rust".into()))]))
        .await
        .unwrap();
    db.model("post_tags")
        .unwrap()
        .create(record([
            ("post_id", post_id.clone()),
            ("tag_id", tag.get("id").unwrap().clone()),
        ]))
        .await
        .unwrap();

    let rows = db
        .model("posts")
        .unwrap()
        .list(
            ListOptions::new()
                .filter(Filter::eq("id", post_id.clone()))
                .include(
                    Include::new()
                        .relation("comments")
                        .relation("author")
                        .relation("tags"),
                ),
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    let post = &rows[0];

    match post.related("comments") {
        Some(RelationValue::Many(comments)) => {
            assert_eq!(comments.len(), 1);
            assert_eq!(comments[0].get("body"), Some(&Value::Text("nice".into())));
        }
        other => panic!("expected comments, got {:?}", other),
    }
    match post.related("author") {
        Some(RelationValue::One(Some(author_row))) => {
            assert_eq!(author_row.get("name"), Some(&Value::Text("Ann".into())));
        }
        other => panic!("expected author, got {:?}", other),
    }
    match post.related("tags") {
        Some(RelationValue::Many(tags)) => {
            assert_eq!(tags.len(), 1);
            assert_eq!(tags[0].get("label"), Some(&Value::Text("rust".into())));
        }
        other => panic!("expected tags, got {:?}", other),
    }

    let json = post.clone().into_json();
    assert_eq!(json["title"], "with comment");
    assert_eq!(json["comments"][0]["body"], "nice");
    assert_eq!(json["author"]["name"], "Ann");
    assert_eq!(json["tags"][0]["label"], "rust");
}

#[tokio::test]
async fn test_nested_include_arguments_apply() {
    let db = blog_db().await;
    let author = seed_user(&db, "Ann", "ann@example.com").await;
    let post_id = seed_post(&db, &author, "filtered", 1).await;

    let comments = db.model("comments").unwrap();
    for body in ["keep", "drop"] {
        comments
            .create(record([
                ("post_id", post_id.clone()),
                ("body", Value::Text(body.into())),
            ]))
            .await
            .unwrap();
    }

    let rows = db
        .model("posts")
        .unwrap()
        .list(ListOptions::new().include(Include::new().relation_with(
            "comments",
            IncludeArgs {
                filter: Some(Filter::eq("body", "keep")),
                select: Some(SelectSpec::Columns(vec!["body".into()])),
                ..IncludeArgs::default()
            },
        )))
        .await
        .unwrap();

    match rows[0].related("comments") {
        Some(RelationValue::Many(loaded)) => {
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0].get("body"), Some(&Value::Text("keep".into())));
            // The bucketing key was force-added and trimmed back out.
            assert!(loaded[0].get("post_id").is_none());
        }
        other => panic!("expected comments, got {:?}", other),
    }
}

#[tokio::test]
async fn test_auto_update_column_advances() {
    let db = blog_db().await;
    let author = seed_user(&db, "Ann", "ann@example.com").await;
    let post_id = seed_post(&db, &author, "stamped", 1).await;
    let posts = db.model("posts").unwrap();

    let before = posts
        .get_or_throw(GetOptions::new(Filter::eq("id", post_id.clone())))
        .await
        .unwrap();
    let Some(Value::DateTime(before_stamp)) = before.get("updated_at").cloned() else {
        panic!("updated_at missing or untyped: {:?}", before.get("updated_at"));
    };

    tokio::time::sleep(Duration::from_millis(20)).await;

    let after = posts
        .update(
            Filter::eq("id", post_id),
            record([("views", Value::Int(200))]),
        )
        .await
        .unwrap();
    assert_eq!(after.get("views"), Some(&Value::Int(200)));
    let Some(Value::DateTime(after_stamp)) = after.get("updated_at").cloned() else {
        panic!("updated_at missing after update");
    };

    assert!(after_stamp > before_stamp, "{} !> {}", after_stamp, before_stamp);
}

#[tokio::test]
async fn test_inserted_values_round_trip() {
    let db = blog_db().await;
    let users = db.model("users").unwrap();

    let created = users
        .create(record([
            ("email", Value::Text("round@trip".into())),
            ("password_hash", Value::Text("h".into())),
            ("name", Value::Text("Röund Tríp".into())),
        ]))
        .await
        .unwrap();

    let id = created.get("id").unwrap().clone();
    assert!(matches!(id, Value::Uuid(_)), "generated id decodes as uuid");
    assert!(matches!(created.get("created_at"), Some(Value::DateTime(_))));

    let fetched = users
        .get_or_throw(GetOptions::new(Filter::eq("id", id)))
        .await
        .unwrap();
    assert_eq!(fetched.get("name"), Some(&Value::Text("Röund Tríp".into())));
    assert_eq!(fetched.get("created_at"), created.get("created_at"));
}

#[tokio::test]
async fn test_single_row_mutations_raise_not_found() {
    let db = blog_db().await;
    let posts = db.model("posts").unwrap();
    let missing = Filter::eq("id", Value::Uuid(uuid::Uuid::new_v4()));

    let err = posts
        .update(missing.clone(), record([("views", Value::Int(1))]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.table.as_deref(), Some("posts"));

    let err = posts.delete(missing.clone()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = posts.get_or_throw(GetOptions::new(missing)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);

    // The non-throwing projections stay quiet on zero matches.
    let affected = posts
        .update_many(
            Some(Filter::eq("title", "nothing")),
            record([("views", Value::Int(0))]),
        )
        .await
        .unwrap();
    assert_eq!(affected.count, 0);
    let affected = posts
        .delete_many(Some(Filter::eq("title", "nothing")))
        .await
        .unwrap();
    assert_eq!(affected.count, 0);
}

#[tokio::test]
async fn test_create_many_generates_distinct_ids() {
    let db = blog_db().await;
    let author = seed_user(&db, "Bulk", "bulk@example.com").await;

    let rows: Vec<Record> = (0..40)
        .map(|i| {
            record([
                ("author_id", author.clone()),
                ("title", Value::Text(format!("post {}", i))),
            ])
        })
        .collect();

    let returned = db
        .model("posts")
        .unwrap()
        .create_many_and_return(rows)
        .await
        .unwrap();
    assert_eq!(returned.len(), 40);

    let mut ids: Vec<Value> = returned
        .iter()
        .map(|e| e.get("id").unwrap().clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 40, "all generated ids are distinct");

    // Defaults fired for columns the rows never mentioned.
    assert!(returned.iter().all(|e| e.get("views") == Some(&Value::Int(0))));
}

#[tokio::test]
async fn test_count_aggregate_and_group_by() {
    let db = blog_db().await;
    let author = seed_user(&db, "Agg", "agg@example.com").await;
    seed_post(&db, &author, "a", 10).await;
    seed_post(&db, &author, "b", 30).await;
    let posts = db.model("posts").unwrap();
    posts
        .update_many(
            Some(Filter::eq("title", "b")),
            record([("published", Value::Bool(true))]),
        )
        .await
        .unwrap();

    assert_eq!(posts.count(None).await.unwrap(), 2);
    assert_eq!(
        posts.count(Some(Filter::gt("views", 20))).await.unwrap(),
        1
    );

    let totals = posts
        .aggregate(AggregateOptions {
            filter: None,
            spec: AggregateSpec {
                count: true,
                sum: vec!["views".into()],
                ..AggregateSpec::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(totals.get("_count"), Some(&Value::Int(2)));
    assert_eq!(totals.get("_sum_views"), Some(&Value::Int(40)));

    let grouped = posts
        .group_by(GroupByOptions {
            by: vec!["published".into()],
            spec: AggregateSpec {
                count: true,
                ..AggregateSpec::default()
            },
            ..GroupByOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(grouped.len(), 2);
    for row in &grouped {
        assert_eq!(row.get("_count"), Some(&Value::Int(1)));
        assert!(matches!(row.get("published"), Some(Value::Bool(_))));
    }

    let err = posts
        .aggregate(AggregateOptions {
            filter: None,
            spec: AggregateSpec {
                sum: vec!["title".into()],
                ..AggregateSpec::default()
            },
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_raw_fragments_compose_and_execute() {
    let db = blog_db().await;
    let author = seed_user(&db, "Raw", "raw@example.com").await;
    seed_post(&db, &author, "raw post", 7).await;

    let inner = Fragment::raw("SELECT id FROM users WHERE name = ").bind("Raw");
    let outer = Fragment::raw("SELECT title, views FROM posts WHERE author_id IN (")
        .append(inner)
        .push(") ORDER BY title");

    let output = db.query(&outer).await.unwrap();
    assert_eq!(output.rows.len(), 1);
    assert_eq!(output.rows[0][0], Value::Text("raw post".into()));
    assert_eq!(output.rows[0][1], Value::Int(7));
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let db = blog_db().await;
    let author = seed_user(&db, "Tx", "tx@example.com").await;
    let post_id = seed_post(&db, &author, "tx post", 1).await;

    let tx = db.begin().await.unwrap();
    tx.model("posts")
        .unwrap()
        .update(
            Filter::eq("id", post_id.clone()),
            record([("views", Value::Int(99))]),
        )
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let post = db
        .model("posts")
        .unwrap()
        .get_or_throw(GetOptions::new(Filter::eq("id", post_id.clone())))
        .await
        .unwrap();
    assert_eq!(post.get("views"), Some(&Value::Int(1)));

    let tx = db.begin().await.unwrap();
    tx.model("posts")
        .unwrap()
        .update(
            Filter::eq("id", post_id.clone()),
            record([("views", Value::Int(42))]),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let post = db
        .model("posts")
        .unwrap()
        .get_or_throw(GetOptions::new(Filter::eq("id", post_id)))
        .await
        .unwrap();
    assert_eq!(post.get("views"), Some(&Value::Int(42)));
}

#[tokio::test]
async fn test_explicit_null_satisfies_required_nullable_column() {
    let registry = ModelRegistry::builder()
        .model(
            "notes",
            Model::new(
                Table::new("notes")
                    .column("id", col::uuid().primary())
                    .column("body", col::text())
                    .column("archived_at", col::timestamptz().nullable()),
            ),
        )
        .build()
        .unwrap();
    let driver = SqliteDriver::open_in_memory().unwrap();
    let db = Database::new(DatabaseOptions::new(Arc::new(driver), registry));
    materialize(&db).await;

    let notes = db.model("notes").unwrap();
    let id = Value::Uuid(uuid::Uuid::new_v4());

    let err = notes
        .create(record([
            ("id", id.clone()),
            ("body", Value::Text("draft".into())),
        ]))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.column.as_deref(), Some("archived_at"));

    let created = notes
        .create(record([
            ("id", id.clone()),
            ("body", Value::Text("draft".into())),
            ("archived_at", Value::Null),
        ]))
        .await
        .unwrap();
    assert_eq!(created.get("archived_at"), Some(&Value::Null));

    let fetched = notes
        .get_or_throw(GetOptions::new(Filter::eq("id", id)))
        .await
        .unwrap();
    assert_eq!(fetched.get("archived_at"), Some(&Value::Null));
}

#[tokio::test]
async fn test_file_backed_database_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blog.db");

    {
        let driver = SqliteDriver::open(&path).unwrap();
        let db = Database::new(DatabaseOptions::new(Arc::new(driver), blog_registry()));
        materialize(&db).await;
        seed_user(&db, "Durable", "durable@example.com").await;
        db.close().await.unwrap();
    }

    let driver = SqliteDriver::open(&path).unwrap();
    let db = Database::new(DatabaseOptions::new(Arc::new(driver), blog_registry()));
    let users = db
        .model("users")
        .unwrap()
        .list(ListOptions::new())
        .await
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].get("name"), Some(&Value::Text("Durable".into())));
}

#[tokio::test]
async fn test_unique_violation_carries_column() {
    let db = blog_db().await;
    seed_user(&db, "First", "same@example.com").await;

    let err = db
        .model("users")
        .unwrap()
        .create(record([
            ("email", Value::Text("same@example.com".into())),
            ("password_hash", Value::Text("h".into())),
            ("name", Value::Text("Second".into())),
        ]))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::UniqueViolation);
    assert_eq!(err.table.as_deref(), Some("users"));
    assert_eq!(err.column.as_deref(), Some("email"));
}
