pub mod decoder;
pub mod types;


pub use decoder::{decode, validate};
pub use types::{
    ChangeEvent, ColumnDescriptor, EventKind, FieldChange, FieldValue, SchemaDescriptor,
};
