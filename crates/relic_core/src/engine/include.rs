//! Relation loading.
//!
//! After the primary query returns, each requested relation costs exactly
//! one batched secondary query regardless of parent-row count: foreign keys
//! are collected, fetched with `IN`, and bucketed back onto the parents in
//! parent order. Nested select/filter/ordering apply to the secondary
//! query; nested includes recurse within the depth cap enforced upstream.

use super::options::{Include, IncludeArgs};
use super::{Entity, ModelHandle, RelationValue};
use crate::Value;
use crate::error::DbError;
use crate::schema::RelationKind;
use crate::sql::{Filter, FilterCompiler, Statement};
use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;

/// Alias carrying the join-table key through a many-through query.
const PARENT_KEY_ALIAS: &str = "_parent_key";

pub(crate) fn expand<'a, 'b: 'a>(
    handle: &'a ModelHandle<'b>,
    parents: &'a mut Vec<Entity>,
    include: &'a Include,
) -> BoxFuture<'a, Result<(), DbError>> {
    async move {
        if parents.is_empty() {
            return Ok(());
        }

        for (relation_name, args) in &include.relations {
            let relation = handle.model.relations.get(relation_name).ok_or_else(|| {
                DbError::validation(format!(
                    "unknown relation {} on {}",
                    relation_name, handle.name
                ))
            })?;
            let target_model = handle.ctx.registry.model(&relation.target)?;
            let target = ModelHandle::new(
                handle.ctx,
                handle.exec,
                relation.target.as_str(),
                target_model,
            );

            match &relation.kind {
                RelationKind::One { foreign_key } => {
                    expand_one(handle, &target, parents, relation_name, foreign_key, args).await?;
                }
                RelationKind::Many { foreign_key } => {
                    expand_many(handle, &target, parents, relation_name, foreign_key, args).await?;
                }
                RelationKind::ManyThrough {
                    join_table,
                    this_key,
                    that_key,
                } => {
                    expand_many_through(
                        handle,
                        &target,
                        parents,
                        relation_name,
                        join_table,
                        this_key,
                        that_key,
                        args,
                    )
                    .await?;
                }
            }
        }
        Ok(())
    }
    .boxed()
}

/// Secondary fetch shared by `one` and `many`: target rows whose
/// `key_column` is in `keys`, shaped and recursed. Returns the rows plus
/// whether the key column was force-added and must be trimmed after
/// bucketing.
async fn fetch_related(
    target: &ModelHandle<'_>,
    args: &IncludeArgs,
    key_column: &str,
    keys: Vec<Value>,
) -> Result<(Vec<Entity>, bool), DbError> {
    let mut projection = target.model.table.resolve_projection(args.select.as_ref())?;
    let trim_key = !projection.iter().any(|c| c == key_column);
    if trim_key {
        projection.push(key_column.to_string());
    }

    let mut conditions = vec![Filter::is_in(key_column, keys)];
    if let Some(filter) = &args.filter {
        conditions.push(filter.clone());
    }
    let filter = if conditions.len() == 1 {
        conditions.pop().expect("one condition")
    } else {
        Filter::And(conditions)
    };

    let builder = target.builder();
    let statement = builder.select(
        &target.model.table,
        &projection,
        Some(&filter),
        &args.order_by,
        None,
        None,
    )?;
    let output = target.run(statement).await?;
    let mut entities = target.shape_rows(output);

    if let Some(nested) = &args.include {
        expand(target, &mut entities, nested).await?;
    }
    Ok((entities, trim_key))
}

async fn expand_one(
    handle: &ModelHandle<'_>,
    target: &ModelHandle<'_>,
    parents: &mut [Entity],
    relation_name: &str,
    foreign_key: &str,
    args: &IncludeArgs,
) -> Result<(), DbError> {
    if handle.model.table.get_column(foreign_key).is_none() {
        return Err(DbError::validation(format!(
            "relation {} foreign key {} missing on {}",
            relation_name, foreign_key, handle.name
        )));
    }
    let (target_pk, _) = target.model.table.single_primary_key().ok_or_else(|| {
        DbError::validation(format!(
            "relation {} target {} needs a single primary key",
            relation_name, target.name
        ))
    })?;

    let keys = collect_keys(parents, foreign_key);
    let (entities, trim_key) = fetch_related(target, args, target_pk, keys).await?;

    let mut by_pk: IndexMap<Value, Entity> = IndexMap::new();
    for entity in entities {
        if let Some(pk) = entity.get(target_pk).cloned() {
            by_pk.insert(pk, entity);
        }
    }

    for parent in parents.iter_mut() {
        let related = parent
            .get(foreign_key)
            .filter(|v| !v.is_null())
            .and_then(|fk| by_pk.get(fk))
            .cloned()
            .map(|mut entity| {
                if trim_key {
                    entity.fields.shift_remove(target_pk);
                }
                Box::new(entity)
            });
        parent
            .relations
            .insert(relation_name.to_string(), RelationValue::One(related));
    }
    Ok(())
}

async fn expand_many(
    handle: &ModelHandle<'_>,
    target: &ModelHandle<'_>,
    parents: &mut [Entity],
    relation_name: &str,
    foreign_key: &str,
    args: &IncludeArgs,
) -> Result<(), DbError> {
    let (parent_pk, _) = handle.model.table.single_primary_key().ok_or_else(|| {
        DbError::validation(format!(
            "relation {} requires a single primary key on {}",
            relation_name, handle.name
        ))
    })?;

    let keys = collect_keys(parents, parent_pk);
    let (entities, trim_key) = fetch_related(target, args, foreign_key, keys).await?;

    let mut buckets: IndexMap<Value, Vec<Entity>> = IndexMap::new();
    for mut entity in entities {
        let Some(key) = entity.get(foreign_key).cloned() else {
            continue;
        };
        if trim_key {
            entity.fields.shift_remove(foreign_key);
        }
        buckets.entry(key).or_default().push(entity);
    }

    for parent in parents.iter_mut() {
        let rows = parent
            .get(parent_pk)
            .and_then(|pk| buckets.get(pk))
            .cloned()
            .unwrap_or_default();
        parent
            .relations
            .insert(relation_name.to_string(), RelationValue::Many(rows));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn expand_many_through(
    handle: &ModelHandle<'_>,
    target: &ModelHandle<'_>,
    parents: &mut [Entity],
    relation_name: &str,
    join_table: &str,
    this_key: &str,
    that_key: &str,
    args: &IncludeArgs,
) -> Result<(), DbError> {
    let (parent_pk, _) = handle.model.table.single_primary_key().ok_or_else(|| {
        DbError::validation(format!(
            "relation {} requires a single primary key on {}",
            relation_name, handle.name
        ))
    })?;
    let (target_pk, _) = target.model.table.single_primary_key().ok_or_else(|| {
        DbError::validation(format!(
            "relation {} target {} needs a single primary key",
            relation_name, target.name
        ))
    })?;
    let (_, join_model) = handle
        .ctx
        .registry
        .model_for_table(join_table)
        .ok_or_else(|| {
            DbError::validation(format!(
                "relation {} join table {} is not registered",
                relation_name, join_table
            ))
        })?;
    let join_this_column = join_model.table.get_column(this_key).ok_or_else(|| {
        DbError::validation(format!(
            "relation {} key {} missing on join table {}",
            relation_name, this_key, join_table
        ))
    })?;

    let keys = collect_keys(parents, parent_pk);
    let statement = build_through_statement(
        target, join_table, this_key, that_key, target_pk, args, keys,
    )?;
    let output = target.run(statement).await?;
    let mut entities = target.shape_rows(output);

    // The alias is not a target column, so the converter skipped it; decode
    // it with the join table's key column metadata to match parent keys.
    let mut keyed: Vec<(Value, Entity)> = Vec::with_capacity(entities.len());
    for mut entity in entities.drain(..) {
        let Some(raw) = entity.fields.shift_remove(PARENT_KEY_ALIAS) else {
            continue;
        };
        let key = target.ctx.converter.decode(join_this_column, raw);
        keyed.push((key, entity));
    }

    let mut children: Vec<Entity> = keyed.iter().map(|(_, e)| e.clone()).collect();
    if let Some(nested) = &args.include {
        expand(target, &mut children, nested).await?;
    }

    let projection = target.model.table.resolve_projection(args.select.as_ref())?;
    let trim_key = !projection.iter().any(|c| c == target_pk);

    let mut buckets: IndexMap<Value, Vec<Entity>> = IndexMap::new();
    for ((key, _), mut entity) in keyed.into_iter().zip(children) {
        if trim_key {
            entity.fields.shift_remove(target_pk);
        }
        buckets.entry(key).or_default().push(entity);
    }

    for parent in parents.iter_mut() {
        let rows = parent
            .get(parent_pk)
            .and_then(|pk| buckets.get(pk))
            .cloned()
            .unwrap_or_default();
        parent
            .relations
            .insert(relation_name.to_string(), RelationValue::Many(rows));
    }
    Ok(())
}

/// One join query against the through-table. Projection columns are
/// table-qualified; the nested filter compiles against the target table
/// unqualified, so target column names shadow join-table ones there.
fn build_through_statement(
    target: &ModelHandle<'_>,
    join_table: &str,
    this_key: &str,
    that_key: &str,
    target_pk: &str,
    args: &IncludeArgs,
    keys: Vec<Value>,
) -> Result<Statement, DbError> {
    let dialect = target.ctx.dialect.as_ref();
    let casing = target.ctx.casing;
    let table = &target.model.table;

    let mut projection = table.resolve_projection(args.select.as_ref())?;
    if !projection.iter().any(|c| c == target_pk) {
        projection.push(target_pk.to_string());
    }

    let t = dialect.quote_ident(&table.name);
    let j = dialect.quote_ident(join_table);

    let mut selections: Vec<String> = Vec::with_capacity(projection.len() + 1);
    for logical in &projection {
        if table.get_column(logical).is_none() {
            return Err(DbError::validation(format!(
                "unknown column {} on {}",
                logical, table.name
            )));
        }
        let stored = casing.column(logical);
        let quoted = format!("{}.{}", t, dialect.quote_ident(&stored));
        if stored == *logical {
            selections.push(quoted);
        } else {
            selections.push(format!("{} AS {}", quoted, dialect.quote_ident(logical)));
        }
    }
    selections.push(format!(
        "{}.{} AS {}",
        j,
        dialect.quote_ident(&casing.column(this_key)),
        dialect.quote_ident(PARENT_KEY_ALIAS)
    ));

    let mut params: Vec<Value> = Vec::new();
    let key_condition = if keys.is_empty() {
        "1 = 0".to_string()
    } else {
        let placeholders: Vec<String> = keys
            .into_iter()
            .map(|key| {
                params.push(key);
                dialect.param(params.len())
            })
            .collect();
        format!(
            "{}.{} IN ({})",
            j,
            dialect.quote_ident(&casing.column(this_key)),
            placeholders.join(", ")
        )
    };

    let mut sql = format!(
        "SELECT {} FROM {} JOIN {} ON {}.{} = {}.{} WHERE {}",
        selections.join(", "),
        t,
        j,
        j,
        dialect.quote_ident(&casing.column(that_key)),
        t,
        dialect.quote_ident(&casing.column(target_pk)),
        key_condition
    );

    if let Some(filter) = &args.filter {
        let compiler = FilterCompiler::new(dialect, table, casing);
        let clause = compiler.compile(filter, &mut params)?;
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }

    if !args.order_by.is_empty() {
        let mut parts = Vec::with_capacity(args.order_by.len());
        for (column, direction) in &args.order_by {
            if table.get_column(column).is_none() {
                return Err(DbError::validation(format!(
                    "unknown column {} on {}",
                    column, table.name
                )));
            }
            parts.push(format!(
                "{}.{} {}",
                t,
                dialect.quote_ident(&casing.column(column)),
                direction.as_sql()
            ));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&parts.join(", "));
    }

    Ok(Statement { text: sql, params })
}

/// Distinct, order-preserving, non-null key values from the parent rows.
fn collect_keys(parents: &[Entity], column: &str) -> Vec<Value> {
    let mut keys: Vec<Value> = Vec::new();
    for parent in parents {
        if let Some(value) = parent.get(column) {
            if !value.is_null() && !keys.contains(value) {
                keys.push(value.clone());
            }
        }
    }
    keys
}
