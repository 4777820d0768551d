pub mod descriptor;
pub mod model;

pub use descriptor::{Descriptor, FieldDescriptor, KeyDescriptor, SchemaError};
pub use model::{FieldDef, FieldKind, ModelSchema};
