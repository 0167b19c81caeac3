use super::relation::{Relation, RelationKind};
use super::table::Table;
use crate::error::DbError;
use crate::tenant::{self, TenantGraph};
use indexmap::IndexMap;

/// Model names that would collide with the client façade surface.
pub const RESERVED_MODEL_NAMES: &[&str] = &["query", "close", "is_healthy", "internals", "begin", "model"];

/// A registered model: its table plus named relations to other models.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub table: Table,
    pub relations: IndexMap<String, Relation>,
}

impl Model {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            relations: IndexMap::new(),
        }
    }

    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }
}

/// Immutable map from model name to model, with a validated relation graph
/// and precomputed tenant graph.
///
/// Relations are declared against model names; validation materializes each
/// target and checks the foreign key lives on the correct side (source
/// table for `one`, target table for `many`), so cyclic schemas fail fast
/// instead of at query time.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, Model>,
    tenant_graph: TenantGraph,
}

impl ModelRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            models: IndexMap::new(),
        }
    }

    pub fn model(&self, name: &str) -> Result<&Model, DbError> {
        self.models
            .get(name)
            .ok_or_else(|| DbError::validation(format!("unknown model {}", name)))
    }

    pub fn models(&self) -> &IndexMap<String, Model> {
        &self.models
    }

    pub fn tenant_graph(&self) -> &TenantGraph {
        &self.tenant_graph
    }

    /// Find the model registered for a physical table name.
    pub fn model_for_table(&self, table: &str) -> Option<(&str, &Model)> {
        self.models
            .iter()
            .find(|(_, m)| m.table.name == table)
            .map(|(n, m)| (n.as_str(), m))
    }
}

pub struct RegistryBuilder {
    models: IndexMap<String, Model>,
}

impl RegistryBuilder {
    pub fn model(mut self, name: impl Into<String>, model: Model) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    /// Shorthand for a model without relations.
    pub fn table(self, name: impl Into<String>, table: Table) -> Self {
        self.model(name, Model::new(table))
    }

    pub fn build(self) -> Result<ModelRegistry, DbError> {
        for name in self.models.keys() {
            if RESERVED_MODEL_NAMES.contains(&name.as_str()) {
                return Err(DbError::validation(format!(
                    "model name {} collides with the client surface",
                    name
                )));
            }
        }

        for (model_name, model) in &self.models {
            for (relation_name, relation) in &model.relations {
                let target = self.models.get(&relation.target).ok_or_else(|| {
                    DbError::validation(format!(
                        "relation {}.{} targets unknown model {}",
                        model_name, relation_name, relation.target
                    ))
                })?;

                match &relation.kind {
                    RelationKind::One { foreign_key } => {
                        if model.table.get_column(foreign_key).is_none() {
                            return Err(DbError::validation(format!(
                                "relation {}.{}: foreign key {} not on source table {}",
                                model_name, relation_name, foreign_key, model.table.name
                            )));
                        }
                    }
                    RelationKind::Many { foreign_key } => {
                        if target.table.get_column(foreign_key).is_none() {
                            return Err(DbError::validation(format!(
                                "relation {}.{}: foreign key {} not on target table {}",
                                model_name, relation_name, foreign_key, target.table.name
                            )));
                        }
                    }
                    RelationKind::ManyThrough {
                        join_table,
                        this_key,
                        that_key,
                    } => {
                        let join = self
                            .models
                            .values()
                            .find(|m| m.table.name == *join_table)
                            .map(|m| &m.table)
                            .ok_or_else(|| {
                                DbError::validation(format!(
                                    "relation {}.{}: join table {} is not registered",
                                    model_name, relation_name, join_table
                                ))
                            })?;
                        for key in [this_key, that_key] {
                            if join.get_column(key).is_none() {
                                return Err(DbError::validation(format!(
                                    "relation {}.{}: column {} not on join table {}",
                                    model_name, relation_name, key, join_table
                                )));
                            }
                        }
                    }
                }
            }
        }

        let tenant_graph = tenant::compute(&self.models)?;

        Ok(ModelRegistry {
            models: self.models,
            tenant_graph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::schema::col;

    fn users_table() -> Table {
        Table::new("users")
            .column("id", col::uuid().primary())
            .column("name", col::text())
    }

    fn posts_table() -> Table {
        Table::new("posts")
            .column("id", col::uuid().primary())
            .column("author_id", col::uuid().references("users", "id"))
            .column("title", col::text())
    }

    #[test]
    fn test_valid_registry_builds() {
        let registry = ModelRegistry::builder()
            .model(
                "users",
                Model::new(users_table()).relation("posts", Relation::many("posts", "author_id")),
            )
            .model(
                "posts",
                Model::new(posts_table()).relation("author", Relation::one("users", "author_id")),
            )
            .build()
            .unwrap();

        assert_eq!(registry.models().len(), 2);
        assert!(registry.model("users").is_ok());
        assert!(registry.model("nope").is_err());
    }

    #[test]
    fn test_reserved_names_rejected() {
        for reserved in ["query", "close", "is_healthy", "internals"] {
            let err = ModelRegistry::builder()
                .table(reserved, users_table())
                .build()
                .unwrap_err();
            assert_eq!(err.kind, ErrorKind::Validation, "{} should be rejected", reserved);
        }
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = ModelRegistry::builder()
            .model(
                "posts",
                Model::new(posts_table()).relation("author", Relation::one("users", "author_id")),
            )
            .build()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("unknown model"));
    }

    #[test]
    fn test_foreign_key_must_be_on_correct_side() {
        // `one` requires the fk on the source table.
        let err = ModelRegistry::builder()
            .table("users", users_table())
            .model(
                "posts",
                Model::new(posts_table()).relation("author", Relation::one("users", "user_ref")),
            )
            .build()
            .unwrap_err();
        assert!(err.message.contains("not on source table"));

        // `many` requires the fk on the target table.
        let err = ModelRegistry::builder()
            .model(
                "users",
                Model::new(users_table()).relation("posts", Relation::many("posts", "writer_id")),
            )
            .table("posts", posts_table())
            .build()
            .unwrap_err();
        assert!(err.message.contains("not on target table"));
    }

    #[test]
    fn test_cyclic_relations_allowed() {
        let a = Table::new("a")
            .column("id", col::uuid().primary())
            .column("b_id", col::uuid().nullable().references("b", "id"));
        let b = Table::new("b")
            .column("id", col::uuid().primary())
            .column("a_id", col::uuid().nullable().references("a", "id"));

        let registry = ModelRegistry::builder()
            .model("a", Model::new(a).relation("b", Relation::one("b", "b_id")))
            .model("b", Model::new(b).relation("a", Relation::one("a", "a_id")))
            .build();
        assert!(registry.is_ok());
    }
}
