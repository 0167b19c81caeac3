use super::Statement;
use crate::Value;
use crate::dialect::Dialect;

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Param(Value),
}

/// A raw SQL fragment: text pieces interleaved with bound values.
///
/// Fragments compose — appending one fragment into another splices its
/// values, and placeholder tokens are only assigned at render time against
/// a concrete dialect, so the same fragment renders as `$1, $2` on Postgres
/// and `?, ?` on SQLite. Values are never interpolated into the text.
///
/// ```
/// use relic_core::sql::Fragment;
/// use relic_core::PostgresDialect;
///
/// let inner = Fragment::raw("SELECT id FROM users WHERE active = ").bind(true);
/// let outer = Fragment::raw("SELECT * FROM posts WHERE author_id IN (")
///     .append(inner)
///     .push(")");
/// let statement = outer.render(&PostgresDialect);
/// assert_eq!(
///     statement.text,
///     "SELECT * FROM posts WHERE author_id IN (SELECT id FROM users WHERE active = $1)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            pieces: vec![Piece::Text(text.into())],
        }
    }

    /// Append literal SQL text. Never pass user data here; bind it.
    pub fn push(mut self, text: impl Into<String>) -> Self {
        self.pieces.push(Piece::Text(text.into()));
        self
    }

    /// Bind a value at the current position.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.pieces.push(Piece::Param(value.into()));
        self
    }

    /// Splice another fragment in place: its text and values keep their
    /// relative order inside this fragment.
    pub fn append(mut self, other: Fragment) -> Self {
        self.pieces.extend(other.pieces);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Bound values in order, without rendering.
    pub fn values(&self) -> Vec<&Value> {
        self.pieces
            .iter()
            .filter_map(|p| match p {
                Piece::Param(v) => Some(v),
                Piece::Text(_) => None,
            })
            .collect()
    }

    /// Render against a dialect, assigning placeholder tokens by position.
    pub fn render(&self, dialect: &dyn Dialect) -> Statement {
        let mut text = String::new();
        let mut params = Vec::new();
        for piece in &self.pieces {
            match piece {
                Piece::Text(t) => text.push_str(t),
                Piece::Param(v) => {
                    params.push(v.clone());
                    text.push_str(&dialect.param(params.len()));
                }
            }
        }
        Statement { text, params }
    }
}
