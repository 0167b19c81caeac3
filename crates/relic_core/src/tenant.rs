//! Static tenant classification of a registered schema.
//!
//! The engine does not enforce tenancy; it derives the partition below once
//! at registry build time and exposes it to policy layers through the client
//! internals.

use crate::error::DbError;
use crate::schema::Model;
use indexmap::IndexMap;
use std::collections::HashSet;

/// Partition of registered models by their place in the tenant hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantGraph {
    /// The model whose primary key tenant columns point at. At most one.
    pub root: Option<String>,
    /// Models with a column flagged as tenant discriminator.
    pub directly_scoped: Vec<String>,
    /// Models that reference a scoped model, transitively.
    pub indirectly_scoped: Vec<String>,
    /// Models explicitly marked shared.
    pub shared: Vec<String>,
}

impl TenantGraph {
    pub fn is_scoped(&self, model: &str) -> bool {
        self.directly_scoped.iter().any(|m| m == model)
            || self.indirectly_scoped.iter().any(|m| m == model)
    }
}

/// Classify every model. Registry order is preserved within each class.
pub fn compute(models: &IndexMap<String, Model>) -> Result<TenantGraph, DbError> {
    let mut graph = TenantGraph::default();

    // Table names resolve to model names; references carry table names.
    let mut model_by_table: IndexMap<&str, &str> = IndexMap::new();
    for (model_name, model) in models {
        model_by_table.insert(model.table.name.as_str(), model_name.as_str());
    }

    let mut root_tables: Vec<&str> = Vec::new();
    for model in models.values() {
        for column in model.table.columns.values() {
            if column.tenant {
                if let Some(fk) = &column.references {
                    if !root_tables.contains(&fk.table.as_str()) {
                        root_tables.push(fk.table.as_str());
                    }
                }
            }
        }
    }

    for (model_name, model) in models {
        if model.table.shared {
            graph.shared.push(model_name.clone());
        } else if model.table.has_tenant_column() {
            graph.directly_scoped.push(model_name.clone());
        }
    }

    let mut roots: Vec<String> = Vec::new();
    for table in &root_tables {
        let Some(model_name) = model_by_table.get(table) else {
            continue;
        };
        let model = &models[*model_name];
        if model.table.shared || model.table.has_tenant_column() {
            continue;
        }
        roots.push((*model_name).to_string());
    }
    if roots.len() > 1 {
        return Err(DbError::validation(format!(
            "multiple tenant roots: {}",
            roots.join(", ")
        )));
    }
    graph.root = roots.into_iter().next();

    // Fixpoint over reference edges: anything pointing at a scoped table
    // becomes indirectly scoped itself.
    let mut scoped_tables: HashSet<&str> = models
        .iter()
        .filter(|(name, _)| graph.directly_scoped.contains(name))
        .map(|(_, m)| m.table.name.as_str())
        .collect();

    loop {
        let mut changed = false;
        for (model_name, model) in models {
            if model.table.shared
                || graph.root.as_deref() == Some(model_name.as_str())
                || graph.directly_scoped.contains(model_name)
                || graph.indirectly_scoped.contains(model_name)
            {
                continue;
            }
            let references_scoped = model
                .table
                .columns
                .values()
                .filter_map(|c| c.references.as_ref())
                .any(|fk| scoped_tables.contains(fk.table.as_str()));
            if references_scoped {
                graph.indirectly_scoped.push(model_name.clone());
                scoped_tables.insert(model.table.name.as_str());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Model, Table, col};

    fn model(table: Table) -> Model {
        Model {
            table,
            relations: IndexMap::new(),
        }
    }

    fn sample_models() -> IndexMap<String, Model> {
        let orgs = Table::new("organizations")
            .column("id", col::uuid().primary())
            .column("name", col::text());
        let projects = Table::new("projects")
            .column("id", col::uuid().primary())
            .column("org_id", col::tenant("organizations"))
            .column("name", col::text());
        let tasks = Table::new("tasks")
            .column("id", col::uuid().primary())
            .column("project_id", col::uuid().references("projects", "id"))
            .column("title", col::text());
        let countries = Table::new("countries")
            .column("code", col::varchar(2).primary())
            .column("name", col::text())
            .shared();

        let mut models = IndexMap::new();
        models.insert("organizations".to_string(), model(orgs));
        models.insert("projects".to_string(), model(projects));
        models.insert("tasks".to_string(), model(tasks));
        models.insert("countries".to_string(), model(countries));
        models
    }

    #[test]
    fn test_partition() {
        let graph = compute(&sample_models()).unwrap();
        assert_eq!(graph.root.as_deref(), Some("organizations"));
        assert_eq!(graph.directly_scoped, vec!["projects"]);
        assert_eq!(graph.indirectly_scoped, vec!["tasks"]);
        assert_eq!(graph.shared, vec!["countries"]);
        assert!(graph.is_scoped("tasks"));
        assert!(!graph.is_scoped("countries"));
    }

    #[test]
    fn test_transitive_indirect_scope() {
        let mut models = sample_models();
        let comments = Table::new("comments")
            .column("id", col::uuid().primary())
            .column("task_id", col::uuid().references("tasks", "id"))
            .column("body", col::text());
        models.insert("comments".to_string(), model(comments));

        let graph = compute(&models).unwrap();
        assert_eq!(graph.indirectly_scoped, vec!["tasks", "comments"]);
    }

    #[test]
    fn test_two_roots_rejected() {
        let mut models = sample_models();
        let teams = Table::new("teams").column("id", col::uuid().primary());
        let boards = Table::new("boards")
            .column("id", col::uuid().primary())
            .column("team_id", col::tenant("teams"));
        models.insert("teams".to_string(), model(teams));
        models.insert("boards".to_string(), model(boards));

        let err = compute(&models).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Validation);
    }
}
