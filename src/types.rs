//! Values, semantic types and column metadata exchanged between the engine, the statement layer and
//! the protocol layer.
//!
//! The protocol layer uses [`ColumnInfo`] and [`FieldType`] to decide how to encode the [`Datum`]s
//! of a row. Both are fixed for the whole lifetime of a result set.

mod column;
mod datum;
mod field_type;

pub use self::{
    column::ColumnInfo,
    datum::Datum,
    field_type::{FieldKind, FieldType, flag},
};
