use super::filter::{Filter, FilterCompiler};
use super::{Casing, SortDirection, Statement};
use crate::Value;
use crate::dialect::Dialect;
use crate::error::DbError;
use crate::schema::Table;

/// One slot of a write statement: either a bound parameter or the dialect's
/// current-timestamp expression rendered inline.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Param(Value),
    Now,
}

/// A single VALUES row, cells in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub cells: Vec<Cell>,
}

/// Insert statement input: one column list shared by all rows.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertPlan {
    /// Logical column names.
    pub columns: Vec<String>,
    pub rows: Vec<InsertRow>,
}

/// Update SET-list input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdatePlan {
    pub assignments: Vec<(String, Cell)>,
}

/// Aggregate selection over numeric columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateSpec {
    pub count: bool,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggregateSpec {
    pub fn is_empty(&self) -> bool {
        !self.count
            && self.sum.is_empty()
            && self.avg.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }

    /// Every column the spec touches, for validation.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.sum
            .iter()
            .chain(&self.avg)
            .chain(&self.min)
            .chain(&self.max)
            .map(String::as_str)
    }
}

/// Builds CRUD statements against a specific dialect.
///
/// Every builder returns `Statement { text, params }`; identifiers are
/// always dialect-quoted and caller data only ever lands in `params`.
/// Rebuilding with the same inputs yields byte-identical output.
pub struct QueryBuilder<'a> {
    dialect: &'a dyn Dialect,
    casing: Casing,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect, casing: Casing) -> Self {
        Self { dialect, casing }
    }

    fn table_ref(&self, table: &Table) -> String {
        self.dialect.quote_ident(&table.name)
    }

    fn stored(&self, logical: &str) -> String {
        self.casing.column(logical)
    }

    fn quoted(&self, logical: &str) -> String {
        self.dialect.quote_ident(&self.stored(logical))
    }

    /// Projection entry, aliased back to the logical name when casing
    /// changes it so result columns always carry logical names.
    fn projection_entry(&self, logical: &str) -> String {
        let stored = self.stored(logical);
        let quoted = self.dialect.quote_ident(&stored);
        if stored == logical {
            quoted
        } else {
            format!("{} AS {}", quoted, self.dialect.quote_ident(logical))
        }
    }

    fn check_column(&self, table: &Table, logical: &str) -> Result<(), DbError> {
        if table.get_column(logical).is_none() {
            return Err(DbError::validation(format!(
                "unknown column {} on {}",
                logical, table.name
            ))
            .with_table(table.name.clone())
            .with_column(logical.to_string()));
        }
        Ok(())
    }

    fn where_clause(
        &self,
        table: &Table,
        filter: Option<&Filter>,
        params: &mut Vec<Value>,
    ) -> Result<Option<String>, DbError> {
        match filter {
            None => Ok(None),
            Some(filter) => {
                let compiler = FilterCompiler::new(self.dialect, table, self.casing);
                Ok(Some(compiler.compile(filter, params)?))
            }
        }
    }

    fn order_clause(
        &self,
        table: &Table,
        order_by: &[(String, SortDirection)],
    ) -> Result<Option<String>, DbError> {
        if order_by.is_empty() {
            return Ok(None);
        }
        let mut parts = Vec::with_capacity(order_by.len());
        for (column, direction) in order_by {
            self.check_column(table, column)?;
            parts.push(format!("{} {}", self.quoted(column), direction.as_sql()));
        }
        Ok(Some(parts.join(", ")))
    }

    fn limit_offset(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        params: &mut Vec<Value>,
        sql: &mut String,
    ) {
        match (limit, offset) {
            (Some(limit), offset) => {
                params.push(Value::Int(limit as i64));
                sql.push_str(&format!(" LIMIT {}", self.dialect.param(params.len())));
                if let Some(offset) = offset {
                    params.push(Value::Int(offset as i64));
                    sql.push_str(&format!(" OFFSET {}", self.dialect.param(params.len())));
                }
            }
            (None, Some(offset)) => {
                if let Some(no_limit) = self.dialect.no_limit() {
                    sql.push_str(&format!(" LIMIT {}", no_limit));
                }
                params.push(Value::Int(offset as i64));
                sql.push_str(&format!(" OFFSET {}", self.dialect.param(params.len())));
            }
            (None, None) => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn select(
        &self,
        table: &Table,
        projection: &[String],
        filter: Option<&Filter>,
        order_by: &[(String, SortDirection)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Statement, DbError> {
        if projection.is_empty() {
            return Err(DbError::validation(format!(
                "empty projection on {}",
                table.name
            )));
        }
        for column in projection {
            self.check_column(table, column)?;
        }

        let mut params = Vec::new();
        let columns: Vec<String> = projection.iter().map(|c| self.projection_entry(c)).collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.table_ref(table)
        );

        if let Some(where_clause) = self.where_clause(table, filter, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if let Some(order_clause) = self.order_clause(table, order_by)? {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_clause);
        }
        self.limit_offset(limit, offset, &mut params, &mut sql);

        Ok(Statement { text: sql, params })
    }

    pub fn count(&self, table: &Table, filter: Option<&Filter>) -> Result<Statement, DbError> {
        let mut params = Vec::new();
        let mut sql = format!("SELECT COUNT(*) AS \"_count\" FROM {}", self.table_ref(table));
        if let Some(where_clause) = self.where_clause(table, filter, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        Ok(Statement { text: sql, params })
    }

    pub fn insert(
        &self,
        table: &Table,
        plan: &InsertPlan,
        returning: bool,
    ) -> Result<Statement, DbError> {
        if plan.columns.is_empty() || plan.rows.is_empty() {
            return Err(DbError::validation(format!(
                "empty insert payload for {}",
                table.name
            )));
        }
        for column in &plan.columns {
            self.check_column(table, column)?;
        }

        let mut params = Vec::new();
        let columns: Vec<String> = plan.columns.iter().map(|c| self.quoted(c)).collect();
        let mut rows = Vec::with_capacity(plan.rows.len());
        for row in &plan.rows {
            if row.cells.len() != plan.columns.len() {
                return Err(DbError::validation(format!(
                    "insert row arity mismatch for {}",
                    table.name
                )));
            }
            let rendered: Vec<String> = row
                .cells
                .iter()
                .map(|cell| self.render_cell(cell, &mut params))
                .collect();
            rows.push(format!("({})", rendered.join(", ")));
        }

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table_ref(table),
            columns.join(", "),
            rows.join(", ")
        );
        if returning && self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }

        Ok(Statement { text: sql, params })
    }

    pub fn update(
        &self,
        table: &Table,
        plan: &UpdatePlan,
        filter: Option<&Filter>,
        returning: bool,
    ) -> Result<Statement, DbError> {
        if plan.assignments.is_empty() {
            return Err(DbError::validation(format!(
                "empty update payload for {}",
                table.name
            )));
        }

        let mut params = Vec::new();
        let set_clause = self.set_clause(table, plan, &mut params)?;
        let mut sql = format!("UPDATE {} SET {}", self.table_ref(table), set_clause);

        if let Some(where_clause) = self.where_clause(table, filter, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if returning && self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }

        Ok(Statement { text: sql, params })
    }

    /// `INSERT .. ON CONFLICT(targets) DO UPDATE SET ..`. The conflict
    /// targets must correspond to a unique or primary index; the engine
    /// leaves validating that to the database.
    pub fn upsert(
        &self,
        table: &Table,
        insert: &InsertPlan,
        conflict_targets: &[String],
        update: &UpdatePlan,
        returning: bool,
    ) -> Result<Statement, DbError> {
        if conflict_targets.is_empty() {
            return Err(DbError::validation(format!(
                "upsert on {} requires conflict targets",
                table.name
            )));
        }
        if update.assignments.is_empty() {
            return Err(DbError::validation(format!(
                "empty upsert update payload for {}",
                table.name
            )));
        }

        let base = self.insert(table, insert, false)?;
        let mut params = base.params;
        let set_clause = self.set_clause(table, update, &mut params)?;

        let stored_targets: Vec<String> = conflict_targets.iter().map(|c| self.stored(c)).collect();
        let mut sql = format!(
            "{} {}",
            base.text,
            self.dialect.upsert_conflict(&stored_targets, &set_clause)
        );
        if returning && self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }

        Ok(Statement { text: sql, params })
    }

    pub fn delete(
        &self,
        table: &Table,
        filter: Option<&Filter>,
        returning: bool,
    ) -> Result<Statement, DbError> {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table_ref(table));
        if let Some(where_clause) = self.where_clause(table, filter, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if returning && self.dialect.supports_returning() {
            sql.push_str(" RETURNING *");
        }
        Ok(Statement { text: sql, params })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn aggregate(
        &self,
        table: &Table,
        spec: &AggregateSpec,
        by: &[String],
        filter: Option<&Filter>,
        order_by: &[(String, SortDirection)],
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Statement, DbError> {
        if spec.is_empty() && by.is_empty() {
            return Err(DbError::validation(format!(
                "empty aggregate selection on {}",
                table.name
            )));
        }
        for column in spec.columns().chain(by.iter().map(String::as_str)) {
            self.check_column(table, column)?;
        }

        let mut selections: Vec<String> = by.iter().map(|c| self.projection_entry(c)).collect();
        if spec.count {
            selections.push("COUNT(*) AS \"_count\"".to_string());
        }
        for (function, columns) in [
            ("SUM", &spec.sum),
            ("AVG", &spec.avg),
            ("MIN", &spec.min),
            ("MAX", &spec.max),
        ] {
            for column in columns {
                selections.push(format!(
                    "{}({}) AS {}",
                    function,
                    self.quoted(column),
                    self.dialect
                        .quote_ident(&format!("_{}_{}", function.to_lowercase(), column))
                ));
            }
        }

        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {}",
            selections.join(", "),
            self.table_ref(table)
        );
        if let Some(where_clause) = self.where_clause(table, filter, &mut params)? {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if !by.is_empty() {
            let grouped: Vec<String> = by.iter().map(|c| self.quoted(c)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&grouped.join(", "));
        }
        if let Some(order_clause) = self.order_clause(table, order_by)? {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_clause);
        }
        self.limit_offset(limit, offset, &mut params, &mut sql);

        Ok(Statement { text: sql, params })
    }

    fn render_cell(&self, cell: &Cell, params: &mut Vec<Value>) -> String {
        match cell {
            Cell::Param(value) => {
                params.push(value.clone());
                self.dialect.param(params.len())
            }
            Cell::Now => self.dialect.now().to_string(),
        }
    }

    fn set_clause(
        &self,
        table: &Table,
        plan: &UpdatePlan,
        params: &mut Vec<Value>,
    ) -> Result<String, DbError> {
        let mut assignments = Vec::with_capacity(plan.assignments.len());
        for (column, cell) in &plan.assignments {
            self.check_column(table, column)?;
            let rendered = self.render_cell(cell, params);
            assignments.push(format!("{} = {}", self.quoted(column), rendered));
        }
        Ok(assignments.join(", "))
    }
}
