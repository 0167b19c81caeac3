//! Option shapes for the per-model operations.

use crate::schema::SelectSpec;
use crate::sql::{AggregateSpec, Filter, SortDirection};
use indexmap::IndexMap;

/// How many levels of nested includes an operation may request.
pub const MAX_INCLUDE_DEPTH: usize = 3;

/// Relation-loading request: relation name to per-relation arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Include {
    pub relations: IndexMap<String, IncludeArgs>,
}

impl Include {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a relation with default arguments.
    pub fn relation(mut self, name: impl Into<String>) -> Self {
        self.relations.insert(name.into(), IncludeArgs::default());
        self
    }

    /// Include a relation with nested select/filter/ordering.
    pub fn relation_with(mut self, name: impl Into<String>, args: IncludeArgs) -> Self {
        self.relations.insert(name.into(), args);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Deepest nesting level, counting this one.
    pub fn depth(&self) -> usize {
        1 + self
            .relations
            .values()
            .filter_map(|args| args.include.as_ref())
            .map(Include::depth)
            .max()
            .unwrap_or(0)
    }
}

/// Arguments applied to one included relation's secondary query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeArgs {
    pub select: Option<SelectSpec>,
    pub filter: Option<Filter>,
    pub order_by: Vec<(String, SortDirection)>,
    pub include: Option<Include>,
}

/// `get` / `get_or_throw`: a required filter plus result shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct GetOptions {
    pub filter: Filter,
    pub select: Option<SelectSpec>,
    pub include: Option<Include>,
}

impl GetOptions {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            select: None,
            include: None,
        }
    }

    pub fn select(mut self, select: SelectSpec) -> Self {
        self.select = Some(select);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = Some(include);
        self
    }
}

/// `list` / `list_and_count`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub filter: Option<Filter>,
    pub select: Option<SelectSpec>,
    pub include: Option<Include>,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select(mut self, select: SelectSpec) -> Self {
        self.select = Some(select);
        self
    }

    pub fn include(mut self, include: Include) -> Self {
        self.include = Some(include);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// `aggregate`: aggregate functions over optionally filtered rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateOptions {
    pub filter: Option<Filter>,
    pub spec: AggregateSpec,
}

/// `group_by`: aggregates bucketed by one or more columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByOptions {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub spec: AggregateSpec,
    pub order_by: Vec<(String, SortDirection)>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_depth() {
        let flat = Include::new().relation("comments");
        assert_eq!(flat.depth(), 1);

        let nested = Include::new().relation_with(
            "comments",
            IncludeArgs {
                include: Some(Include::new().relation_with(
                    "author",
                    IncludeArgs {
                        include: Some(Include::new().relation("organization")),
                        ..IncludeArgs::default()
                    },
                )),
                ..IncludeArgs::default()
            },
        );
        assert_eq!(nested.depth(), 3);
    }
}
