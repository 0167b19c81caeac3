//! The per-model operation pipeline.
//!
//! Every operation runs the same stages: validate options, fill generated
//! IDs and strip read-only columns, build SQL, encode parameters, execute,
//! translate errors, decode rows, expand includes, project. The throwing
//! variants (`get_or_throw`, `update`, `delete`) are thin projections that
//! materialize `NOT_FOUND` over the same flow.

mod include;
mod options;

pub use options::{
    AggregateOptions, GetOptions, GroupByOptions, Include, IncludeArgs, ListOptions,
    MAX_INCLUDE_DEPTH,
};

use crate::Value;
use crate::convert::ValueConverter;
use crate::dialect::Dialect;
use crate::driver::{Exec, QueryOutput};
use crate::error::DbError;
use crate::ids;
use crate::schema::{ColumnDef, DefaultValue, Model, ModelRegistry, SqlType, Table};
use crate::sql::{
    Casing, Cell, Filter, InsertPlan, InsertRow, QueryBuilder, Record, Statement, UpdatePlan,
};
use indexmap::IndexMap;

/// Rows per INSERT statement unless the client overrides it; keeps multi-row
/// inserts under backend parameter-count limits.
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 1000;

/// A loaded relation attached to an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// `one` relations: a single row or `None` when the foreign key is null
    /// or dangling.
    One(Option<Box<Entity>>),
    /// `many` relations: possibly empty.
    Many(Vec<Entity>),
}

/// One result row: projected fields plus any included relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub fields: Record,
    pub relations: IndexMap<String, RelationValue>,
}

impl Entity {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    pub fn related(&self, relation: &str) -> Option<&RelationValue> {
        self.relations.get(relation)
    }

    pub fn into_fields(self) -> Record {
        self.fields
    }

    /// Project into JSON, nesting included relations as objects and
    /// arrays.
    pub fn into_json(self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (name, value) in self.fields {
            object.insert(name, value.into_json());
        }
        for (name, relation) in self.relations {
            let rendered = match relation {
                RelationValue::One(None) => serde_json::Value::Null,
                RelationValue::One(Some(entity)) => entity.into_json(),
                RelationValue::Many(entities) => serde_json::Value::Array(
                    entities.into_iter().map(Entity::into_json).collect(),
                ),
            };
            object.insert(name, rendered);
        }
        serde_json::Value::Object(object)
    }
}

/// `list_and_count` result. The two statements run sequentially and are not
/// wrapped in a transaction; wrap the call in `begin()` when a consistent
/// snapshot matters.
#[derive(Debug, Clone, PartialEq)]
pub struct ListAndCount {
    pub data: Vec<Entity>,
    pub total: u64,
}

/// Count of affected rows for the `*_many` mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffectedRows {
    pub count: u64,
}

/// Shared, immutable engine state assembled by the client.
pub struct EngineContext {
    pub dialect: Box<dyn Dialect>,
    pub converter: ValueConverter,
    pub registry: ModelRegistry,
    pub casing: Casing,
    pub insert_batch_size: usize,
}

/// The operation surface for one registered model, bound to an executor
/// (the driver pool or an open transaction).
pub struct ModelHandle<'a> {
    pub(crate) ctx: &'a EngineContext,
    pub(crate) exec: Exec<'a>,
    pub(crate) name: &'a str,
    pub(crate) model: &'a Model,
}

impl<'a> ModelHandle<'a> {
    pub fn new(ctx: &'a EngineContext, exec: Exec<'a>, name: &'a str, model: &'a Model) -> Self {
        Self {
            ctx,
            exec,
            name,
            model,
        }
    }

    fn table(&self) -> &Table {
        &self.model.table
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self.ctx.dialect.as_ref(), self.ctx.casing)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn get(&self, options: GetOptions) -> Result<Option<Entity>, DbError> {
        check_include_depth(options.include.as_ref())?;
        let projection = self.table().resolve_projection(options.select.as_ref())?;
        let statement = self.builder().select(
            self.table(),
            &projection,
            Some(&options.filter),
            &[],
            Some(1),
            None,
        )?;

        let output = self.run(statement).await?;
        let mut entities = self.shape_rows(output);
        if let Some(include) = &options.include {
            include::expand(self, &mut entities, include).await?;
        }
        Ok(entities.into_iter().next())
    }

    /// `get` that materializes the missing row as `NOT_FOUND`.
    pub async fn get_or_throw(&self, options: GetOptions) -> Result<Entity, DbError> {
        self.get(options)
            .await?
            .ok_or_else(|| DbError::not_found(self.table().name.clone()))
    }

    pub async fn list(&self, options: ListOptions) -> Result<Vec<Entity>, DbError> {
        check_include_depth(options.include.as_ref())?;
        let projection = self.table().resolve_projection(options.select.as_ref())?;
        let statement = self.builder().select(
            self.table(),
            &projection,
            options.filter.as_ref(),
            &options.order_by,
            options.limit,
            options.offset,
        )?;

        let output = self.run(statement).await?;
        let mut entities = self.shape_rows(output);
        if let Some(include) = &options.include {
            include::expand(self, &mut entities, include).await?;
        }
        Ok(entities)
    }

    pub async fn list_and_count(&self, options: ListOptions) -> Result<ListAndCount, DbError> {
        let filter = options.filter.clone();
        let data = self.list(options).await?;
        let total = self.count(filter).await?;
        Ok(ListAndCount { data, total })
    }

    pub async fn count(&self, filter: Option<Filter>) -> Result<u64, DbError> {
        let statement = self.builder().count(self.table(), filter.as_ref())?;
        let output = self.run(statement).await?;
        Ok(scalar_count(&output))
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    pub async fn create(&self, data: Record) -> Result<Entity, DbError> {
        let prepared = self.prepare_insert_row(&data)?;
        let plan = InsertPlan {
            columns: prepared.keys().cloned().collect(),
            rows: vec![InsertRow {
                cells: prepared.values().cloned().collect(),
            }],
        };

        if self.ctx.dialect.supports_returning() {
            let statement = self.builder().insert(self.table(), &plan, true)?;
            let output = self.run(statement).await?;
            let entity = self
                .shape_rows(output)
                .into_iter()
                .next()
                .ok_or_else(|| DbError::unknown("insert returned no row"))?;
            return Ok(self.project_default(entity));
        }

        let statement = self.builder().insert(self.table(), &plan, false)?;
        self.run(statement).await?;
        self.fetch_by_primary_key(&prepared).await
    }

    pub async fn create_many(&self, rows: Vec<Record>) -> Result<AffectedRows, DbError> {
        let statements = self.insert_many_statements(rows, false)?;
        let mut count = 0;
        for statement in statements {
            let output = self.run(statement).await?;
            count += output.row_count;
        }
        Ok(AffectedRows { count })
    }

    pub async fn create_many_and_return(&self, rows: Vec<Record>) -> Result<Vec<Entity>, DbError> {
        if !self.ctx.dialect.supports_returning() {
            return Err(DbError::unsupported(
                "create_many_and_return requires RETURNING support",
            ));
        }
        let statements = self.insert_many_statements(rows, true)?;
        let mut entities = Vec::new();
        for statement in statements {
            let output = self.run(statement).await?;
            entities.extend(
                self.shape_rows(output)
                    .into_iter()
                    .map(|e| self.project_default(e)),
            );
        }
        Ok(entities)
    }

    pub async fn update(&self, filter: Filter, data: Record) -> Result<Entity, DbError> {
        let plan = self.prepare_update(&data)?;

        if self.ctx.dialect.supports_returning() {
            let statement = self
                .builder()
                .update(self.table(), &plan, Some(&filter), true)?;
            let output = self.run(statement).await?;
            let entity = self
                .shape_rows(output)
                .into_iter()
                .next()
                .ok_or_else(|| DbError::not_found(self.table().name.clone()))?;
            return Ok(self.project_default(entity));
        }

        let statement = self
            .builder()
            .update(self.table(), &plan, Some(&filter), false)?;
        let output = self.run(statement).await?;
        if output.row_count == 0 {
            return Err(DbError::not_found(self.table().name.clone()));
        }
        self.fetch_one_by_filter(&filter).await
    }

    pub async fn update_many(&self, filter: Option<Filter>, data: Record) -> Result<AffectedRows, DbError> {
        let plan = self.prepare_update(&data)?;
        let statement = self
            .builder()
            .update(self.table(), &plan, filter.as_ref(), false)?;
        let output = self.run(statement).await?;
        Ok(AffectedRows {
            count: output.row_count,
        })
    }

    /// `INSERT .. ON CONFLICT DO UPDATE`. The filter names the conflict
    /// target and must be simple equality over unique or primary columns;
    /// whether those columns actually carry a unique index is left to the
    /// database to enforce.
    pub async fn upsert(
        &self,
        filter: Filter,
        create: Record,
        update: Record,
    ) -> Result<Entity, DbError> {
        let conflict_targets = conflict_targets(&filter, self.table())?;
        let prepared = self.prepare_insert_row(&create)?;
        let insert_plan = InsertPlan {
            columns: prepared.keys().cloned().collect(),
            rows: vec![InsertRow {
                cells: prepared.values().cloned().collect(),
            }],
        };
        let update_plan = self.prepare_update(&update)?;

        let returning = self.ctx.dialect.supports_returning();
        let statement = self.builder().upsert(
            self.table(),
            &insert_plan,
            &conflict_targets,
            &update_plan,
            returning,
        )?;
        let output = self.run(statement).await?;

        if returning {
            let entity = self
                .shape_rows(output)
                .into_iter()
                .next()
                .ok_or_else(|| DbError::unknown("upsert returned no row"))?;
            Ok(self.project_default(entity))
        } else {
            self.fetch_one_by_filter(&filter).await
        }
    }

    pub async fn delete(&self, filter: Filter) -> Result<Entity, DbError> {
        if self.ctx.dialect.supports_returning() {
            let statement = self.builder().delete(self.table(), Some(&filter), true)?;
            let output = self.run(statement).await?;
            let entity = self
                .shape_rows(output)
                .into_iter()
                .next()
                .ok_or_else(|| DbError::not_found(self.table().name.clone()))?;
            return Ok(self.project_default(entity));
        }

        // Without RETURNING the row is captured before it disappears.
        let entity = self.fetch_one_by_filter(&filter).await.map_err(|e| {
            if e.is_not_found() {
                DbError::not_found(self.table().name.clone())
            } else {
                e
            }
        })?;
        let statement = self.builder().delete(self.table(), Some(&filter), false)?;
        let output = self.run(statement).await?;
        if output.row_count == 0 {
            return Err(DbError::not_found(self.table().name.clone()));
        }
        Ok(entity)
    }

    pub async fn delete_many(&self, filter: Option<Filter>) -> Result<AffectedRows, DbError> {
        let statement = self.builder().delete(self.table(), filter.as_ref(), false)?;
        let output = self.run(statement).await?;
        Ok(AffectedRows {
            count: output.row_count,
        })
    }

    // ---------------------------------------------------------------------
    // Aggregation
    // ---------------------------------------------------------------------

    pub async fn aggregate(&self, options: AggregateOptions) -> Result<Record, DbError> {
        if options.spec.is_empty() {
            return Err(DbError::validation(format!(
                "empty aggregate spec on {}",
                self.name
            )));
        }
        self.check_numeric_aggregates(&options.spec)?;
        let statement = self.builder().aggregate(
            self.table(),
            &options.spec,
            &[],
            options.filter.as_ref(),
            &[],
            None,
            None,
        )?;
        let output = self.run(statement).await?;
        let mut records = self.shape_loose_rows(output);
        records
            .pop()
            .ok_or_else(|| DbError::unknown("aggregate returned no row"))
    }

    pub async fn group_by(&self, options: GroupByOptions) -> Result<Vec<Record>, DbError> {
        if options.by.is_empty() {
            return Err(DbError::validation(format!(
                "group_by on {} requires at least one column",
                self.name
            )));
        }
        self.check_numeric_aggregates(&options.spec)?;
        let statement = self.builder().aggregate(
            self.table(),
            &options.spec,
            &options.by,
            options.filter.as_ref(),
            &options.order_by,
            options.limit,
            options.offset,
        )?;
        let output = self.run(statement).await?;
        Ok(self.shape_loose_rows(output))
    }

    // ---------------------------------------------------------------------
    // Pipeline plumbing
    // ---------------------------------------------------------------------

    pub(crate) async fn run(&self, statement: Statement) -> Result<QueryOutput, DbError> {
        let params = self.ctx.converter.encode_params(statement.params);

        let preview = if statement.text.len() > 120 {
            format!("{}...", &statement.text[..120])
        } else {
            statement.text.clone()
        };
        log::debug!("[{}] {} ({} params)", self.name, preview.replace('\n', " "), params.len());

        let start = std::time::Instant::now();
        let result = self.exec.run(&statement.text, &params).await;
        match result {
            Ok(output) => {
                log::debug!(
                    "[{}] completed in {:.2}ms, {} rows",
                    self.name,
                    start.elapsed().as_secs_f64() * 1000.0,
                    output.rows.len()
                );
                Ok(output)
            }
            Err(e) => {
                log::debug!("[{}] statement failed: {}", self.name, e);
                if e.table.is_none() {
                    Err(e.with_table(self.table().name.clone()))
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Rows to entities, decoding cells against this model's columns and
    /// mapping stored names back to logical ones.
    pub(crate) fn shape_rows(&self, output: QueryOutput) -> Vec<Entity> {
        let logical: Vec<(String, Option<&ColumnDef>)> = output
            .columns
            .iter()
            .map(|name| {
                let logical = self.logical_column_name(name);
                let column = self.table().get_column(&logical);
                (logical, column)
            })
            .collect();

        output
            .rows
            .into_iter()
            .map(|row| {
                let mut fields = Record::new();
                for ((name, column), value) in logical.iter().zip(row) {
                    let decoded = match column {
                        Some(column) => self.ctx.converter.decode(column, value),
                        None => value,
                    };
                    fields.insert(name.clone(), decoded);
                }
                Entity {
                    fields,
                    relations: IndexMap::new(),
                }
            })
            .collect()
    }

    /// Rows to records without requiring every column to be on the table
    /// (aggregate aliases pass through undecoded).
    fn shape_loose_rows(&self, output: QueryOutput) -> Vec<Record> {
        self.shape_rows(output)
            .into_iter()
            .map(Entity::into_fields)
            .collect()
    }

    fn logical_column_name(&self, returned: &str) -> String {
        if self.table().get_column(returned).is_some() {
            return returned.to_string();
        }
        // RETURNING * yields stored names; find the logical column that
        // cases to it.
        for name in self.table().all_columns() {
            if self.ctx.casing.column(name) == returned {
                return name.to_string();
            }
        }
        returned.to_string()
    }

    /// Mutation results carry `RETURNING *`; trim to the default read shape
    /// so hidden columns never leak out of writes.
    fn project_default(&self, mut entity: Entity) -> Entity {
        let read: Vec<String> = self
            .table()
            .read_columns()
            .iter()
            .map(|s| s.to_string())
            .collect();
        entity.fields.retain(|name, _| read.contains(name));
        entity
    }

    fn check_numeric_aggregates(&self, spec: &crate::sql::AggregateSpec) -> Result<(), DbError> {
        for column in spec.columns() {
            let def = self.table().get_column(column).ok_or_else(|| {
                DbError::validation(format!("unknown column {} on {}", column, self.name))
            })?;
            if !def.sql_type.is_numeric() {
                return Err(DbError::validation(format!(
                    "aggregate over non-numeric column {} on {}",
                    column, self.name
                ))
                .with_column(column.to_string()));
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Write preparation
    // ---------------------------------------------------------------------

    /// Normalize one insert payload: reject unknown columns, strip
    /// read-only ones, fill generated IDs and now-defaults, then check
    /// presence against the table's derived insert shape. Returns cells
    /// keyed by logical column in declaration order.
    fn prepare_insert_row(&self, data: &Record) -> Result<IndexMap<String, Cell>, DbError> {
        for key in data.keys() {
            if self.table().get_column(key).is_none() {
                return Err(DbError::validation(format!(
                    "unknown column {} on {}",
                    key, self.name
                ))
                .with_column(key.clone()));
            }
        }

        let mut cells: IndexMap<String, Cell> = IndexMap::new();
        for (name, column) in &self.table().columns {
            match data.get(name) {
                Some(_) if column.read_only => {
                    log::debug!("[{}] dropping read-only column {} from insert", self.name, name);
                }
                Some(value) => {
                    validate_value(self.name, name, column, value)?;
                    cells.insert(name.clone(), Cell::Param(value.clone()));
                }
                None => {
                    if let Some(strategy) = column.generate {
                        ids::check_generated_column(name, column)?;
                        cells.insert(name.clone(), Cell::Param(generated_value(column, strategy)));
                    } else if matches!(column.default_value, Some(DefaultValue::Now)) {
                        cells.insert(name.clone(), Cell::Now);
                    }
                    // Literal and database-side defaults fire on their own.
                }
            }
        }

        // Only defaulted columns may be omitted; a nullable column without
        // a default takes an explicit null.
        for name in &self.table().insert_shape().required {
            if !cells.contains_key(name) {
                return Err(DbError::validation(format!(
                    "missing required column {} on {}",
                    name, self.name
                ))
                .with_column(name.clone()));
            }
        }

        if cells.is_empty() {
            return Err(DbError::validation(format!(
                "empty create payload on {}",
                self.name
            )));
        }
        Ok(cells)
    }

    fn insert_many_statements(
        &self,
        rows: Vec<Record>,
        returning: bool,
    ) -> Result<Vec<Statement>, DbError> {
        if rows.is_empty() {
            return Err(DbError::validation(format!(
                "create_many on {} requires at least one row",
                self.name
            )));
        }

        let prepared: Vec<IndexMap<String, Cell>> = rows
            .iter()
            .map(|row| self.prepare_insert_row(row))
            .collect::<Result<_, _>>()?;

        // One column list for the whole statement: the table-ordered union
        // of every row's columns. Missing cells fall back to the column's
        // declared default or NULL.
        let mut columns: Vec<String> = Vec::new();
        for (name, _) in &self.table().columns {
            if prepared.iter().any(|row| row.contains_key(name)) {
                columns.push(name.clone());
            }
        }

        let mut insert_rows = Vec::with_capacity(prepared.len());
        for row in &prepared {
            let mut cells = Vec::with_capacity(columns.len());
            for name in &columns {
                let cell = match row.get(name) {
                    Some(cell) => cell.clone(),
                    None => {
                        // Every undefaulted column passed the per-row
                        // presence check, so a gap here must be fillable
                        // from the declared default.
                        let column = self.table().get_column(name).expect("column from union");
                        match &column.default_value {
                            Some(DefaultValue::Now) => Cell::Now,
                            Some(DefaultValue::Literal(value)) => Cell::Param(value.clone()),
                            None => {
                                return Err(DbError::validation(format!(
                                    "rows disagree on column {} on {}; supply it in every row or none",
                                    name, self.name
                                )));
                            }
                        }
                    }
                };
                cells.push(cell);
            }
            insert_rows.push(InsertRow { cells });
        }

        let mut statements = Vec::new();
        for chunk in insert_rows.chunks(self.ctx.insert_batch_size.max(1)) {
            let plan = InsertPlan {
                columns: columns.clone(),
                rows: chunk.to_vec(),
            };
            statements.push(self.builder().insert(self.table(), &plan, returning)?);
        }
        Ok(statements)
    }

    /// Update SET list: caller data restricted to the table's derived
    /// update shape, then every auto-update column as the current
    /// timestamp.
    fn prepare_update(&self, data: &Record) -> Result<UpdatePlan, DbError> {
        for key in data.keys() {
            if self.table().get_column(key).is_none() {
                return Err(DbError::validation(format!(
                    "unknown column {} on {}",
                    key, self.name
                ))
                .with_column(key.clone()));
            }
        }

        let updatable = self.table().update_columns();
        let mut assignments = Vec::new();
        for (name, column) in &self.table().columns {
            if let Some(value) = data.get(name) {
                if !updatable.contains(&name.as_str()) {
                    log::debug!("[{}] dropping {} from update payload", self.name, name);
                    continue;
                }
                validate_value(self.name, name, column, value)?;
                assignments.push((name.clone(), Cell::Param(value.clone())));
            }
        }

        if assignments.is_empty() {
            return Err(DbError::validation(format!(
                "empty update payload on {}",
                self.name
            )));
        }

        for (name, column) in &self.table().columns {
            if column.auto_update {
                assignments.push((name.clone(), Cell::Now));
            }
        }

        Ok(UpdatePlan { assignments })
    }

    // ---------------------------------------------------------------------
    // RETURNING fallbacks
    // ---------------------------------------------------------------------

    async fn fetch_by_primary_key(&self, cells: &IndexMap<String, Cell>) -> Result<Entity, DbError> {
        let (pk_name, _) = self.table().single_primary_key().ok_or_else(|| {
            DbError::unsupported(format!(
                "backend without RETURNING needs a single primary key on {}",
                self.name
            ))
        })?;
        let pk_value = match cells.get(pk_name) {
            Some(Cell::Param(value)) => value.clone(),
            _ => {
                return Err(DbError::unsupported(format!(
                    "backend without RETURNING needs an explicit or generated {} on {}",
                    pk_name, self.name
                )));
            }
        };
        self.fetch_one_by_filter(&Filter::eq(pk_name, pk_value)).await
    }

    async fn fetch_one_by_filter(&self, filter: &Filter) -> Result<Entity, DbError> {
        let projection = self.table().resolve_projection(None)?;
        let statement =
            self.builder()
                .select(self.table(), &projection, Some(filter), &[], Some(1), None)?;
        let output = self.run(statement).await?;
        self.shape_rows(output)
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found(self.table().name.clone()))
    }
}

fn check_include_depth(include: Option<&Include>) -> Result<(), DbError> {
    if let Some(include) = include {
        let depth = include.depth();
        if depth > MAX_INCLUDE_DEPTH {
            return Err(DbError::validation(format!(
                "include nesting of {} exceeds the maximum of {}",
                depth, MAX_INCLUDE_DEPTH
            )));
        }
    }
    Ok(())
}

fn scalar_count(output: &QueryOutput) -> u64 {
    output
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(|value| match value {
            Value::Int(i) => Some(*i as u64),
            Value::Decimal(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

fn generated_value(column: &ColumnDef, strategy: crate::ids::IdStrategy) -> Value {
    let id = ids::generate(strategy);
    if matches!(column.sql_type, SqlType::Uuid) {
        if let Ok(parsed) = uuid::Uuid::parse_str(&id) {
            return Value::Uuid(parsed);
        }
    }
    Value::Text(id)
}

fn validate_value(model: &str, name: &str, column: &ColumnDef, value: &Value) -> Result<(), DbError> {
    if value.is_null() {
        // Explicit nulls pass through; non-nullable columns fail at the
        // database with a NOT_NULL_VIOLATION.
        return Ok(());
    }
    if let SqlType::Enum { values, .. } = &column.sql_type {
        if let Value::Text(s) = value {
            if !values.contains(s) {
                return Err(DbError::validation(format!(
                    "value {} is not a member of enum column {} on {}",
                    s, name, model
                ))
                .with_column(name.to_string()));
            }
        }
    }
    if let (Some(validator), Value::Json(json)) = (column.json_validator, value) {
        if let Err(message) = validator(json) {
            return Err(DbError::validation(format!(
                "invalid JSON payload for {} on {}: {}",
                name, model, message
            ))
            .with_column(name.to_string()));
        }
    }
    Ok(())
}

fn conflict_targets(filter: &Filter, table: &Table) -> Result<Vec<String>, DbError> {
    fn collect(filter: &Filter, out: &mut Vec<String>) -> bool {
        match filter {
            Filter::Cond(column, crate::sql::Cond::Eq(_)) => {
                out.push(column.clone());
                true
            }
            Filter::And(filters) => filters.iter().all(|f| collect(f, out)),
            _ => false,
        }
    }

    let mut targets = Vec::new();
    if !collect(filter, &mut targets) || targets.is_empty() {
        return Err(DbError::validation(
            "upsert filter must be simple equality over unique or primary columns",
        ));
    }
    for column in &targets {
        let def = table.get_column(column).ok_or_else(|| {
            DbError::validation(format!("unknown column {} on {}", column, table.name))
        })?;
        if !def.unique && !def.primary {
            return Err(DbError::validation(format!(
                "upsert conflict target {} on {} is neither unique nor primary",
                column, table.name
            ))
            .with_column(column.clone()));
        }
    }
    Ok(targets)
}
