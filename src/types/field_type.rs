use super::Datum;

/// Bits of [`FieldType::flags`].
pub mod flag {
    pub const NOT_NULL: u16 = 1;
    pub const PRIMARY_KEY: u16 = 1 << 1;
    pub const BINARY: u16 = 1 << 7;
    pub const UNSIGNED: u16 = 1 << 5;
}

/// Semantic type of a column or parameter. The discriminants are the type codes used on the wire
/// by MySQL compatible protocols, which is also how clients declare parameter types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldKind {
    Decimal = 0x00,
    Tiny = 0x01,
    Short = 0x02,
    Long = 0x03,
    Float = 0x04,
    Double = 0x05,
    Null = 0x06,
    Timestamp = 0x07,
    LongLong = 0x08,
    Int24 = 0x09,
    Date = 0x0a,
    Time = 0x0b,
    DateTime = 0x0c,
    Year = 0x0d,
    VarChar = 0x0f,
    Bit = 0x10,
    Json = 0xf5,
    NewDecimal = 0xf6,
    Enum = 0xf7,
    Set = 0xf8,
    TinyBlob = 0xf9,
    MediumBlob = 0xfa,
    LongBlob = 0xfb,
    Blob = 0xfc,
    VarString = 0xfd,
    String = 0xfe,
}

impl FieldKind {
    /// `None` if `code` is not a type code known to this crate.
    pub fn from_code(code: u8) -> Option<Self> {
        let kind = match code {
            0x00 => FieldKind::Decimal,
            0x01 => FieldKind::Tiny,
            0x02 => FieldKind::Short,
            0x03 => FieldKind::Long,
            0x04 => FieldKind::Float,
            0x05 => FieldKind::Double,
            0x06 => FieldKind::Null,
            0x07 => FieldKind::Timestamp,
            0x08 => FieldKind::LongLong,
            0x09 => FieldKind::Int24,
            0x0a => FieldKind::Date,
            0x0b => FieldKind::Time,
            0x0c => FieldKind::DateTime,
            0x0d => FieldKind::Year,
            0x0f => FieldKind::VarChar,
            0x10 => FieldKind::Bit,
            0xf5 => FieldKind::Json,
            0xf6 => FieldKind::NewDecimal,
            0xf7 => FieldKind::Enum,
            0xf8 => FieldKind::Set,
            0xf9 => FieldKind::TinyBlob,
            0xfa => FieldKind::MediumBlob,
            0xfb => FieldKind::LongBlob,
            0xfc => FieldKind::Blob,
            0xfd => FieldKind::VarString,
            0xfe => FieldKind::String,
            _ => return None,
        };
        Some(kind)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            FieldKind::Tiny
                | FieldKind::Short
                | FieldKind::Long
                | FieldKind::LongLong
                | FieldKind::Int24
                | FieldKind::Year
                | FieldKind::Bit
        )
    }

    /// Character, binary, temporal and JSON types. Values of these are transferred as bytes.
    pub fn is_bytes_like(self) -> bool {
        !self.is_integer()
            && !matches!(
                self,
                FieldKind::Float | FieldKind::Double | FieldKind::Null
            )
    }

    /// `true` if an argument `value` may be bound to a parameter declared with this type. `NULL` is
    /// accepted by every type.
    pub fn accepts(self, value: &Datum, unsigned: bool) -> bool {
        match value {
            Datum::Null => true,
            Datum::Int(i) => {
                (self.is_integer() && (!unsigned || *i >= 0))
                    || matches!(
                        self,
                        FieldKind::Float
                            | FieldKind::Double
                            | FieldKind::Decimal
                            | FieldKind::NewDecimal
                    )
            }
            Datum::UInt(_) => {
                self.is_integer()
                    || matches!(
                        self,
                        FieldKind::Float
                            | FieldKind::Double
                            | FieldKind::Decimal
                            | FieldKind::NewDecimal
                    )
            }
            Datum::Double(_) => matches!(
                self,
                FieldKind::Float | FieldKind::Double | FieldKind::Decimal | FieldKind::NewDecimal
            ),
            Datum::Bytes(_) => self.is_bytes_like(),
        }
    }
}

/// Type of a column including the attributes the protocol layer needs to encode values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldType {
    pub kind: FieldKind,
    /// Bitset of [`flag`] constants.
    pub flags: u16,
    /// Maximum display length. `0` if unknown.
    pub flen: u32,
    /// Number of decimal digits.
    pub decimal: u8,
    pub charset: String,
    pub collation: String,
}

impl FieldType {
    /// Field type with no flags, unknown length and a binary character set.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            flags: 0,
            flen: 0,
            decimal: 0,
            charset: "binary".to_owned(),
            collation: "binary".to_owned(),
        }
    }

    /// Adds `flag` to the flags of this type.
    pub fn with_flag(mut self, flag: u16) -> Self {
        self.flags |= flag;
        self
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags & flag::UNSIGNED != 0
    }

    pub fn is_not_null(&self) -> bool {
        self.flags & flag::NOT_NULL != 0
    }
}
