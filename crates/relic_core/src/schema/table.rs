use super::column::ColumnDef;
use indexmap::IndexMap;

/// Secondary index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Index {
    pub fn new(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Table definition: named, ordered columns plus indexes.
///
/// Column insertion order is authoritative; it defines both DDL column order
/// and the default projection order. Tables are built once at program start
/// and shared immutably afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, ColumnDef>,
    pub indexes: Vec<Index>,
    /// Excluded from the tenant hierarchy.
    pub shared: bool,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
            indexes: Vec::new(),
            shared: false,
        }
    }

    pub fn column(mut self, name: impl Into<String>, column: ColumnDef) -> Self {
        self.columns.insert(name.into(), column);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn shared(mut self) -> Self {
        self.shared = true;
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.get(name)
    }

    /// Primary-key column names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, c)| c.primary)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// The single primary-key column, when the key is not composite.
    pub fn single_primary_key(&self) -> Option<(&str, &ColumnDef)> {
        let mut primaries = self.columns.iter().filter(|(_, c)| c.primary);
        let first = primaries.next()?;
        if primaries.next().is_some() {
            return None;
        }
        Some((first.0.as_str(), first.1))
    }

    /// Whether any column carries the tenant flag.
    pub fn has_tenant_column(&self) -> bool {
        self.columns.values().any(|c| c.tenant)
    }
}
