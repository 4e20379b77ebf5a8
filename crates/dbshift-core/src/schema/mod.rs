mod column;
mod constraint;
mod model;
mod naming;
mod table;
mod types;

pub use column::{ColumnDef, GeneratedColumn, GeneratedKind, Generation};
pub use constraint::{
    normalize_expression, CheckDef, ConstraintKind, ExclusionDef, ForeignKeyDef, IndexDef,
    ReferentialAction, UniqueDef,
};
pub use model::SchemaModel;
pub use naming::NamingStrategy;
pub use table::TableDef;
pub use types::LogicalType;
