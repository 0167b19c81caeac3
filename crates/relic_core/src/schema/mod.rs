mod column;
mod registry;
mod relation;
mod shapes;
mod table;

pub use column::{ColumnDef, DefaultValue, ForeignKey, SqlType, Visibility, col};
pub use registry::{Model, ModelRegistry, RegistryBuilder, RESERVED_MODEL_NAMES};
pub use relation::{Relation, RelationKind};
pub use shapes::{InsertShape, SelectSpec, VisibilityTier};
pub use table::{Index, Table};
