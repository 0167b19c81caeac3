use crate::Value;
use crate::ids::IdStrategy;
use serde::{Deserialize, Serialize};

/// Read-side access class of a column.
///
/// Governs default projection only; writability is orthogonal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Normal,
    /// Excluded when the caller opts out via `select: not sensitive`.
    Sensitive,
    /// Excluded from every default projection; returned only on explicit
    /// selection.
    Hidden,
}

/// Canonical logical column type. Dialects map these to physical DDL types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlType {
    Uuid,
    Text,
    Varchar(u32),
    Boolean,
    Integer,
    BigInt,
    Decimal { precision: u8, scale: u8 },
    Real,
    Double,
    Serial,
    TimestampTz,
    Date,
    Time,
    Jsonb,
    TextArray,
    IntegerArray,
    Enum { name: String, values: Vec<String> },
}

impl SqlType {
    /// Whether a generated string ID can be stored in this type.
    pub fn is_string_like(&self) -> bool {
        matches!(self, Self::Uuid | Self::Text | Self::Varchar(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::BigInt | Self::Decimal { .. } | Self::Real | Self::Double | Self::Serial
        )
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::TextArray | Self::IntegerArray)
    }
}

/// Column default applied when an insert omits the column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// Current timestamp, rendered inline as the dialect's now() expression.
    Now,
    Literal(Value),
}

/// Foreign-key target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

/// Immutable column descriptor.
///
/// Built once through the constructors in [`col`] and the chainable
/// modifiers below; every modifier consumes and returns the descriptor, so
/// a shared column is never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub sql_type: SqlType,
    pub nullable: bool,
    pub primary: bool,
    pub unique: bool,
    pub default_value: Option<DefaultValue>,
    /// ID strategy for primary columns; implies the column may be omitted
    /// on insert.
    pub generate: Option<IdStrategy>,
    /// Never written from caller-supplied data.
    pub read_only: bool,
    /// Set to the current time on every update; implies `read_only`.
    pub auto_update: bool,
    pub visibility: Visibility,
    pub references: Option<ForeignKey>,
    /// Marks the tenant discriminator column.
    pub tenant: bool,
    /// Semantic format hint (e.g. "email"); not enforced by the engine.
    pub format: Option<String>,
    /// Arbitrary SQL check expression attached to the column.
    pub check: Option<String>,
    /// Optional runtime validator for JSONB payloads.
    pub json_validator: Option<fn(&serde_json::Value) -> Result<(), String>>,
}

impl ColumnDef {
    fn new(sql_type: SqlType) -> Self {
        Self {
            sql_type,
            nullable: false,
            primary: false,
            unique: false,
            default_value: None,
            generate: None,
            read_only: false,
            auto_update: false,
            visibility: Visibility::Normal,
            references: None,
            tenant: false,
            format: None,
            check: None,
            json_validator: None,
        }
    }

    /// Whether the column may be omitted on insert.
    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
            || self.generate.is_some()
            || matches!(self.sql_type, SqlType::Serial)
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Primary key with an engine-side ID strategy. The strategy's
    /// string-like requirement is checked at first use, not here.
    pub fn primary_generated(mut self, strategy: IdStrategy) -> Self {
        self.primary = true;
        self.generate = Some(strategy);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(DefaultValue::Literal(value.into()));
        self
    }

    /// Default to the current timestamp (`dialect.now()` at insert time).
    pub fn default_now(mut self) -> Self {
        self.default_value = Some(DefaultValue::Now);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.visibility = Visibility::Sensitive;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visibility = Visibility::Hidden;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Refresh to the current time on every update. Auto-update columns are
    /// never written from caller data.
    pub fn auto_update(mut self) -> Self {
        self.auto_update = true;
        self.read_only = true;
        self
    }

    pub fn check(mut self, expr: impl Into<String>) -> Self {
        self.check = Some(expr.into());
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn json_validator(mut self, validator: fn(&serde_json::Value) -> Result<(), String>) -> Self {
        self.json_validator = Some(validator);
        self
    }
}

/// Column constructors, one per logical type.
///
/// ```
/// use relic_core::col;
/// use relic_core::ids::IdStrategy;
///
/// let id = col::uuid().primary_generated(IdStrategy::Uuid);
/// let email = col::text().unique().sensitive();
/// let updated_at = col::timestamptz().auto_update();
/// ```
pub mod col {
    use super::*;

    pub fn uuid() -> ColumnDef {
        ColumnDef::new(SqlType::Uuid)
    }

    pub fn text() -> ColumnDef {
        ColumnDef::new(SqlType::Text)
    }

    pub fn varchar(length: u32) -> ColumnDef {
        ColumnDef::new(SqlType::Varchar(length))
    }

    pub fn boolean() -> ColumnDef {
        ColumnDef::new(SqlType::Boolean)
    }

    pub fn integer() -> ColumnDef {
        ColumnDef::new(SqlType::Integer)
    }

    pub fn big_integer() -> ColumnDef {
        ColumnDef::new(SqlType::BigInt)
    }

    pub fn decimal(precision: u8, scale: u8) -> ColumnDef {
        ColumnDef::new(SqlType::Decimal { precision, scale })
    }

    pub fn real() -> ColumnDef {
        ColumnDef::new(SqlType::Real)
    }

    pub fn double() -> ColumnDef {
        ColumnDef::new(SqlType::Double)
    }

    pub fn serial() -> ColumnDef {
        ColumnDef::new(SqlType::Serial)
    }

    pub fn timestamptz() -> ColumnDef {
        ColumnDef::new(SqlType::TimestampTz)
    }

    pub fn date() -> ColumnDef {
        ColumnDef::new(SqlType::Date)
    }

    pub fn time() -> ColumnDef {
        ColumnDef::new(SqlType::Time)
    }

    pub fn jsonb() -> ColumnDef {
        ColumnDef::new(SqlType::Jsonb)
    }

    pub fn text_array() -> ColumnDef {
        ColumnDef::new(SqlType::TextArray)
    }

    pub fn integer_array() -> ColumnDef {
        ColumnDef::new(SqlType::IntegerArray)
    }

    pub fn enumeration(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> ColumnDef {
        ColumnDef::new(SqlType::Enum {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Tenant discriminator: a uuid foreign key into the given table's `id`
    /// column, flagged for the tenant graph.
    pub fn tenant(target_table: impl Into<String>) -> ColumnDef {
        let mut column = uuid().references(target_table, "id");
        column.tenant = true;
        column
    }
}
