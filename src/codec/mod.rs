pub mod bytes;
pub mod columns;
pub mod dynamic;
pub mod rows;

pub use bytes::{ pack_vector, PackedVector, Transformers, VectorTransformer };
pub use columns::build_columns;
pub use rows::{ decode_column, parse_columns };
