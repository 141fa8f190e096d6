use std::{fmt, mem::size_of};

use serde::{Deserialize, Serialize};

/// A single value of a row or a bound argument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    /// Character and binary data alike. Interpretation is up to the field type of the column.
    Bytes(Vec<u8>),
}

impl Datum {
    /// Estimated memory footprint in bytes, including heap allocations. Used to decide when a row
    /// container has to spill to disk.
    pub fn mem_size(&self) -> usize {
        let heap = match self {
            Datum::Bytes(bytes) => bytes.capacity(),
            _ => 0,
        };
        size_of::<Datum>() + heap
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Short name of the variant. Used in error messages, so the value itself does not end up in
    /// logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Datum::Null => "NULL",
            Datum::Int(_) => "signed integer",
            Datum::UInt(_) => "unsigned integer",
            Datum::Double(_) => "double",
            Datum::Bytes(_) => "bytes",
        }
    }
}

impl From<i64> for Datum {
    fn from(value: i64) -> Self {
        Datum::Int(value)
    }
}

impl From<u64> for Datum {
    fn from(value: u64) -> Self {
        Datum::UInt(value)
    }
}

impl From<f64> for Datum {
    fn from(value: f64) -> Self {
        Datum::Double(value)
    }
}

impl From<&str> for Datum {
    fn from(value: &str) -> Self {
        Datum::Bytes(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for Datum {
    fn from(value: Vec<u8>) -> Self {
        Datum::Bytes(value)
    }
}

impl<T> From<Option<T>> for Datum
where
    T: Into<Datum>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Datum::Null)
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Int(i) => write!(f, "{i}"),
            Datum::UInt(u) => write!(f, "{u}"),
            Datum::Double(d) => write!(f, "{d}"),
            Datum::Bytes(bytes) => write!(f, "{}", String::from_utf8_lossy(bytes)),
        }
    }
}
