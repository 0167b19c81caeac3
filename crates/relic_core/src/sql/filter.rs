use super::Casing;
use crate::Value;
use crate::dialect::Dialect;
use crate::error::DbError;
use crate::schema::Table;

/// Per-column condition.
///
/// The operator set is closed. String pattern operators carry an
/// `insensitive` flag; the dialect decides how case folding is spelled.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Contains { value: String, insensitive: bool },
    StartsWith { value: String, insensitive: bool },
    EndsWith { value: String, insensitive: bool },
    /// Caller-supplied LIKE pattern, passed through unescaped.
    Like { pattern: String, insensitive: bool },
    IsNull(bool),
    ArrayContains(Vec<Value>),
    ArrayContainedBy(Vec<Value>),
    ArrayOverlaps(Vec<Value>),
    JsonContains(serde_json::Value),
}

/// Composable filter tree compiled into a WHERE clause.
///
/// Leaves bind a column to a [`Cond`]; `And`/`Or`/`Not` nest with explicit
/// parentheses. Direct equality against `Null` renders as `IS NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Cond(String, Cond),
}

impl Filter {
    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Or(filters.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Self::Not(Box::new(filter))
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Eq(value.into()))
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Ne(value.into()))
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Gt(value.into()))
    }

    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Gte(value.into()))
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Lt(value.into()))
    }

    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cond(column.into(), Cond::Lte(value.into()))
    }

    pub fn is_in(column: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Cond(
            column.into(),
            Cond::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in(column: impl Into<String>, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::Cond(
            column.into(),
            Cond::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn contains(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cond(
            column.into(),
            Cond::Contains {
                value: value.into(),
                insensitive: false,
            },
        )
    }

    pub fn starts_with(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cond(
            column.into(),
            Cond::StartsWith {
                value: value.into(),
                insensitive: false,
            },
        )
    }

    pub fn ends_with(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Cond(
            column.into(),
            Cond::EndsWith {
                value: value.into(),
                insensitive: false,
            },
        )
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::Cond(column.into(), Cond::IsNull(true))
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::Cond(column.into(), Cond::IsNull(false))
    }

    pub fn cond(column: impl Into<String>, cond: Cond) -> Self {
        Self::Cond(column.into(), cond)
    }
}

/// Escape LIKE metacharacters so a user value matches literally inside a
/// generated pattern. The escape character is `\`, declared via `ESCAPE`.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Compiles filter trees into WHERE text, appending parameters to a shared
/// list. Placeholder indices always come from the current parameter count,
/// so a compiler can be handed a list that already holds earlier bindings.
pub struct FilterCompiler<'a> {
    dialect: &'a dyn Dialect,
    table: &'a Table,
    casing: Casing,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(dialect: &'a dyn Dialect, table: &'a Table, casing: Casing) -> Self {
        Self {
            dialect,
            table,
            casing,
        }
    }

    pub fn compile(&self, filter: &Filter, params: &mut Vec<Value>) -> Result<String, DbError> {
        match filter {
            Filter::And(filters) => self.compile_group(filters, " AND ", "1 = 1", params),
            Filter::Or(filters) => self.compile_group(filters, " OR ", "1 = 0", params),
            Filter::Not(inner) => Ok(format!("NOT ({})", self.compile(inner, params)?)),
            Filter::Cond(column, cond) => self.compile_cond(column, cond, params),
        }
    }

    fn compile_group(
        &self,
        filters: &[Filter],
        joiner: &str,
        empty: &str,
        params: &mut Vec<Value>,
    ) -> Result<String, DbError> {
        if filters.is_empty() {
            return Ok(empty.to_string());
        }
        let parts: Vec<String> = filters
            .iter()
            .map(|f| self.compile(f, params))
            .collect::<Result<_, _>>()?;
        Ok(format!("({})", parts.join(joiner)))
    }

    fn quoted_column(&self, column: &str) -> Result<String, DbError> {
        if self.table.get_column(column).is_none() {
            return Err(DbError::validation(format!(
                "unknown column {} on {}",
                column, self.table.name
            ))
            .with_table(self.table.name.clone())
            .with_column(column.to_string()));
        }
        Ok(self.dialect.quote_ident(&self.casing.column(column)))
    }

    fn push_param(&self, value: Value, params: &mut Vec<Value>) -> String {
        params.push(value);
        self.dialect.param(params.len())
    }

    fn compile_cond(
        &self,
        column: &str,
        cond: &Cond,
        params: &mut Vec<Value>,
    ) -> Result<String, DbError> {
        let col = self.quoted_column(column)?;

        let rendered = match cond {
            Cond::Eq(Value::Null) => format!("{} IS NULL", col),
            Cond::Ne(Value::Null) => format!("{} IS NOT NULL", col),
            Cond::Eq(value) => {
                format!("{} = {}", col, self.push_param(value.clone(), params))
            }
            Cond::Ne(value) => {
                format!("{} <> {}", col, self.push_param(value.clone(), params))
            }
            Cond::Gt(value) => {
                format!("{} > {}", col, self.push_param(value.clone(), params))
            }
            Cond::Gte(value) => {
                format!("{} >= {}", col, self.push_param(value.clone(), params))
            }
            Cond::Lt(value) => {
                format!("{} < {}", col, self.push_param(value.clone(), params))
            }
            Cond::Lte(value) => {
                format!("{} <= {}", col, self.push_param(value.clone(), params))
            }
            // Empty lists short-circuit instead of emitting `IN ()`.
            Cond::In(values) if values.is_empty() => "1 = 0".to_string(),
            Cond::NotIn(values) if values.is_empty() => "1 = 1".to_string(),
            Cond::In(values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.push_param(v.clone(), params))
                    .collect();
                format!("{} IN ({})", col, placeholders.join(", "))
            }
            Cond::NotIn(values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.push_param(v.clone(), params))
                    .collect();
                format!("{} NOT IN ({})", col, placeholders.join(", "))
            }
            Cond::Contains { value, insensitive } => {
                let pattern = format!("%{}%", escape_like(value));
                self.like_clause(&col, pattern, *insensitive, params)
            }
            Cond::StartsWith { value, insensitive } => {
                let pattern = format!("{}%", escape_like(value));
                self.like_clause(&col, pattern, *insensitive, params)
            }
            Cond::EndsWith { value, insensitive } => {
                let pattern = format!("%{}", escape_like(value));
                self.like_clause(&col, pattern, *insensitive, params)
            }
            Cond::Like { pattern, insensitive } => {
                self.like_clause(&col, pattern.clone(), *insensitive, params)
            }
            Cond::IsNull(true) => format!("{} IS NULL", col),
            Cond::IsNull(false) => format!("{} IS NOT NULL", col),
            Cond::ArrayContains(values) => {
                self.array_op(&col, "@>", values.clone(), params)?
            }
            Cond::ArrayContainedBy(values) => {
                self.array_op(&col, "<@", values.clone(), params)?
            }
            Cond::ArrayOverlaps(values) => {
                self.array_op(&col, "&&", values.clone(), params)?
            }
            Cond::JsonContains(json) => {
                if !self.dialect.supports_jsonb_path() {
                    return Err(DbError::unsupported(
                        "JSONB operators are not supported by this dialect",
                    ));
                }
                format!(
                    "{} @> {}",
                    col,
                    self.push_param(Value::Json(json.clone()), params)
                )
            }
        };

        Ok(rendered)
    }

    fn like_clause(
        &self,
        quoted_column: &str,
        pattern: String,
        insensitive: bool,
        params: &mut Vec<Value>,
    ) -> String {
        let placeholder = self.push_param(Value::Text(pattern), params);
        if insensitive {
            self.dialect.insensitive_like(quoted_column, &placeholder)
        } else {
            format!("{} LIKE {} ESCAPE '\\'", quoted_column, placeholder)
        }
    }

    fn array_op(
        &self,
        quoted_column: &str,
        op: &str,
        values: Vec<Value>,
        params: &mut Vec<Value>,
    ) -> Result<String, DbError> {
        if !self.dialect.supports_array_ops() {
            return Err(DbError::unsupported(
                "array operators are not supported by this dialect",
            ));
        }
        Ok(format!(
            "{} {} {}",
            quoted_column,
            op,
            self.push_param(Value::Array(values), params)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::schema::{Table, col};

    fn posts() -> Table {
        Table::new("posts")
            .column("id", col::uuid().primary())
            .column("title", col::text())
            .column("views", col::integer())
            .column("tags", col::text_array())
            .column("meta", col::jsonb())
            .column("deleted_at", col::timestamptz().nullable())
    }

    fn compile_pg(filter: &Filter) -> (String, Vec<Value>) {
        let table = posts();
        let compiler = FilterCompiler::new(&PostgresDialect, &table, Casing::SnakeCase);
        let mut params = Vec::new();
        let text = compiler.compile(filter, &mut params).unwrap();
        (text, params)
    }

    #[test]
    fn test_equality_and_null() {
        let (text, params) = compile_pg(&Filter::eq("views", 10));
        assert_eq!(text, "\"views\" = $1");
        assert_eq!(params, vec![Value::Int(10)]);

        let (text, params) = compile_pg(&Filter::eq("deleted_at", Value::Null));
        assert_eq!(text, "\"deleted_at\" IS NULL");
        assert!(params.is_empty());
    }

    #[test]
    fn test_boolean_composition_parenthesized() {
        let filter = Filter::or([
            Filter::eq("views", 1),
            Filter::and([Filter::gt("views", 5), Filter::not(Filter::eq("title", "x"))]),
        ]);
        let (text, params) = compile_pg(&filter);
        assert_eq!(
            text,
            "(\"views\" = $1 OR (\"views\" > $2 AND NOT (\"title\" = $3)))"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_empty_in_short_circuits() {
        let (text, params) = compile_pg(&Filter::is_in("views", Vec::<i64>::new()));
        assert_eq!(text, "1 = 0");
        assert!(params.is_empty());

        let (text, _) = compile_pg(&Filter::not_in("views", Vec::<i64>::new()));
        assert_eq!(text, "1 = 1");
    }

    #[test]
    fn test_contains_escapes_metacharacters() {
        let (text, params) = compile_pg(&Filter::contains("title", "50%_off\\deal"));
        assert_eq!(text, "\"title\" LIKE $1 ESCAPE '\\'");
        assert_eq!(
            params,
            vec![Value::Text("%50\\%\\_off\\\\deal%".to_string())]
        );
    }

    #[test]
    fn test_insensitive_mode_per_dialect() {
        let filter = Filter::cond(
            "title",
            Cond::StartsWith {
                value: "Rust".to_string(),
                insensitive: true,
            },
        );

        let (pg_text, _) = compile_pg(&filter);
        assert_eq!(pg_text, "\"title\" ILIKE $1 ESCAPE '\\'");

        let table = posts();
        let compiler = FilterCompiler::new(&SqliteDialect, &table, Casing::SnakeCase);
        let mut params = Vec::new();
        let sqlite_text = compiler.compile(&filter, &mut params).unwrap();
        assert_eq!(sqlite_text, "\"title\" COLLATE NOCASE LIKE ? ESCAPE '\\'");
    }

    #[test]
    fn test_array_ops_guarded_by_dialect() {
        let filter = Filter::cond("tags", Cond::ArrayContains(vec![Value::Text("rust".into())]));

        let (text, params) = compile_pg(&filter);
        assert_eq!(text, "\"tags\" @> $1");
        assert_eq!(params.len(), 1);

        let table = posts();
        let compiler = FilterCompiler::new(&SqliteDialect, &table, Casing::SnakeCase);
        let mut params = Vec::new();
        let err = compiler.compile(&filter, &mut params).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Unsupported);
        assert!(params.is_empty());
    }

    #[test]
    fn test_json_contains_guarded_by_dialect() {
        let filter = Filter::cond("meta", Cond::JsonContains(serde_json::json!({"k": 1})));

        let (text, _) = compile_pg(&filter);
        assert_eq!(text, "\"meta\" @> $1");

        let table = posts();
        let compiler = FilterCompiler::new(&SqliteDialect, &table, Casing::SnakeCase);
        let err = compiler.compile(&filter, &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Unsupported);
    }

    #[test]
    fn test_unknown_column_rejected() {
        let table = posts();
        let compiler = FilterCompiler::new(&PostgresDialect, &table, Casing::SnakeCase);
        let err = compiler
            .compile(&Filter::eq("nope", 1), &mut Vec::new())
            .unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::Validation);
    }

    #[test]
    fn test_placeholder_numbering_continues() {
        let table = posts();
        let compiler = FilterCompiler::new(&PostgresDialect, &table, Casing::SnakeCase);
        let mut params = vec![Value::Int(99)];
        let text = compiler.compile(&Filter::eq("views", 10), &mut params).unwrap();
        assert_eq!(text, "\"views\" = $2");
    }
}
