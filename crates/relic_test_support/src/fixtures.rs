//! Shared schema fixtures: a small blog domain exercising visibility
//! tiers, defaults, auto-update columns, and all three relation kinds.

use relic_core::IdStrategy;
use relic_core::schema::{Index, Model, ModelRegistry, Relation, Table, col};

pub fn users_table() -> Table {
    Table::new("users")
        .column("id", col::uuid().primary_generated(IdStrategy::Uuid))
        .column("email", col::text().unique().sensitive())
        .column("password_hash", col::text().hidden())
        .column("name", col::text())
        .column("created_at", col::timestamptz().default_now().read_only())
        .index(Index::new(["email"]).unique())
}

fn posts_table() -> Table {
    Table::new("posts")
        .column("id", col::uuid().primary_generated(IdStrategy::Uuid))
        .column("author_id", col::uuid().references("users", "id"))
        .column("title", col::text())
        .column("views", col::integer().default_value(0))
        .column("published", col::boolean().default_value(false))
        .column("updated_at", col::timestamptz().default_now().auto_update())
}

fn comments_table() -> Table {
    Table::new("comments")
        .column("id", col::uuid().primary_generated(IdStrategy::Uuid))
        .column("post_id", col::uuid().references("posts", "id"))
        .column("body", col::text())
}

fn tags_table() -> Table {
    Table::new("tags")
        .column("id", col::uuid().primary_generated(IdStrategy::Uuid))
        .column("label", col::text().unique())
}

fn post_tags_table() -> Table {
    Table::new("post_tags")
        .column("post_id", col::uuid().primary().references("posts", "id"))
        .column("tag_id", col::uuid().primary().references("tags", "id"))
}

/// The full registry: users ↔ posts ↔ comments plus tags through a join
/// table.
pub fn blog_registry() -> ModelRegistry {
    ModelRegistry::builder()
        .model(
            "users",
            Model::new(users_table()).relation("posts", Relation::many("posts", "author_id")),
        )
        .model(
            "posts",
            Model::new(posts_table())
                .relation("author", Relation::one("users", "author_id"))
                .relation("comments", Relation::many("comments", "post_id"))
                .relation(
                    "tags",
                    Relation::many_through("tags", "post_tags", "post_id", "tag_id"),
                ),
        )
        .model(
            "comments",
            Model::new(comments_table()).relation("post", Relation::one("posts", "post_id")),
        )
        .table("tags", tags_table())
        .table("post_tags", post_tags_table())
        .build()
        .expect("fixture registry is valid")
}
