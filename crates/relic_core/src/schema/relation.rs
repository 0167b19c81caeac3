/// How related rows are reached from a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// Single related row through a foreign key on *this* table.
    One { foreign_key: String },
    /// Zero or more rows whose foreign key on the *target* table points at
    /// this table's primary key.
    Many { foreign_key: String },
    /// Zero or more rows reached through a join table.
    ManyThrough {
        join_table: String,
        this_key: String,
        that_key: String,
    },
}

/// A named edge to another model.
///
/// The target is held by model name, not by handle, so cyclic schemas can be
/// declared in any order; the registry resolves and validates targets when
/// it is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub target: String,
    pub kind: RelationKind,
}

impl Relation {
    pub fn one(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RelationKind::One {
                foreign_key: foreign_key.into(),
            },
        }
    }

    pub fn many(target: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            kind: RelationKind::Many {
                foreign_key: foreign_key.into(),
            },
        }
    }

    /// Relation over a join table. `this_key` points at the source table's
    /// primary key, `that_key` at the target's.
    pub fn many_through(
        target: impl Into<String>,
        join_table: impl Into<String>,
        this_key: impl Into<String>,
        that_key: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            kind: RelationKind::ManyThrough {
                join_table: join_table.into(),
                this_key: this_key.into(),
                that_key: that_key.into(),
            },
        }
    }

    /// Convert a `many` relation into a many-through relation over a join
    /// table. `this_key` points at the source table's primary key,
    /// `that_key` at the target's.
    pub fn through(
        mut self,
        join_table: impl Into<String>,
        this_key: impl Into<String>,
        that_key: impl Into<String>,
    ) -> Self {
        self.kind = RelationKind::ManyThrough {
            join_table: join_table.into(),
            this_key: this_key.into(),
            that_key: that_key.into(),
        };
        self
    }

    pub fn is_many(&self) -> bool {
        matches!(self.kind, RelationKind::Many { .. } | RelationKind::ManyThrough { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_through_rewrites_kind() {
        let relation = Relation::many("tags", "").through("post_tags", "post_id", "tag_id");
        match relation.kind {
            RelationKind::ManyThrough {
                ref join_table,
                ref this_key,
                ref that_key,
            } => {
                assert_eq!(join_table, "post_tags");
                assert_eq!(this_key, "post_id");
                assert_eq!(that_key, "tag_id");
            }
            _ => panic!("expected many-through"),
        }
        assert!(relation.is_many());
    }
}
