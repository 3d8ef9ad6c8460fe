//! Identifiers and flag words shared by the accessor and the storage substrate.

use std::fmt::{Display, Formatter};
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ColumnError;

/// The first ID handed out to user defined tables.
///
/// Everything below is reserved for built-in types.
pub const FIRST_TABLE_ID: u32 = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
/// The type identifier a buffer, column or vector element is tagged with.
///
/// IDs below [FIRST_TABLE_ID] are built-in scalar types, anything else
/// refers to a table whose record IDs are the values.
pub struct Domain(pub u32);

impl Domain {
    pub const VOID: Self = Self(0);
    pub const BOOL: Self = Self(3);
    pub const INT8: Self = Self(4);
    pub const UINT8: Self = Self(5);
    pub const INT16: Self = Self(6);
    pub const UINT16: Self = Self(7);
    pub const INT32: Self = Self(8);
    pub const UINT32: Self = Self(9);
    pub const INT64: Self = Self(10);
    pub const UINT64: Self = Self(11);
    pub const FLOAT: Self = Self(12);
    /// Microseconds since the unix epoch.
    pub const TIME: Self = Self(13);
    pub const SHORT_TEXT: Self = Self(14);
    pub const TEXT: Self = Self(15);
    pub const LONG_TEXT: Self = Self(16);

    const BUILTINS: [(Self, &'static str); 16] = [
        (Self::VOID, "Void"),
        (Self::BOOL, "Bool"),
        (Self::INT8, "Int8"),
        (Self::UINT8, "UInt8"),
        (Self::INT16, "Int16"),
        (Self::UINT16, "UInt16"),
        (Self::INT32, "Int32"),
        (Self::UINT32, "UInt32"),
        (Self::INT64, "Int64"),
        (Self::UINT64, "UInt64"),
        (Self::FLOAT, "Float"),
        (Self::TIME, "Time"),
        (Self::SHORT_TEXT, "ShortText"),
        (Self::TEXT, "Text"),
        (Self::LONG_TEXT, "LongText"),
        // Alias accepted when parsing, never produced by `builtin_name`.
        (Self::SHORT_TEXT, "String"),
    ];

    #[inline]
    /// Returns `true` if the domain refers to a table.
    pub fn is_table(self) -> bool {
        self.0 >= FIRST_TABLE_ID
    }

    #[inline]
    pub fn is_text(self) -> bool {
        matches!(self, Self::SHORT_TEXT | Self::TEXT | Self::LONG_TEXT)
    }

    /// The width in bytes of a single value of this domain if the
    /// domain is fixed size.
    ///
    /// Table domains are stored as 4 byte record IDs.
    pub fn fixed_size(self) -> Option<usize> {
        if self.is_table() {
            return Some(4);
        }

        match self {
            Self::BOOL | Self::INT8 | Self::UINT8 => Some(1),
            Self::INT16 | Self::UINT16 => Some(2),
            Self::INT32 | Self::UINT32 => Some(4),
            Self::INT64 | Self::UINT64 | Self::FLOAT | Self::TIME => Some(8),
            _ => None,
        }
    }

    /// Returns the family of values the domain belongs to.
    pub fn family(self) -> DomainFamily {
        if self.is_table() {
            return DomainFamily::Reference;
        }

        match self {
            Self::BOOL => DomainFamily::Bool,
            Self::INT8
            | Self::UINT8
            | Self::INT16
            | Self::UINT16
            | Self::INT32
            | Self::UINT32
            | Self::INT64
            | Self::UINT64 => DomainFamily::Integer,
            Self::FLOAT => DomainFamily::Float,
            Self::TIME => DomainFamily::Time,
            Self::SHORT_TEXT | Self::TEXT | Self::LONG_TEXT => DomainFamily::Text,
            _ => DomainFamily::Void,
        }
    }

    /// Returns `true` if a value of the `other` domain can stand in for
    /// a value of this domain, e.g. as a table key.
    ///
    /// Domains are compatible when they share a family, references are
    /// only compatible with the exact same table.
    pub fn is_compatible(self, other: Domain) -> bool {
        match (self.family(), other.family()) {
            (DomainFamily::Reference, _) | (_, DomainFamily::Reference) => self == other,
            (DomainFamily::Void, _) | (_, DomainFamily::Void) => false,
            (a, b) => a == b,
        }
    }

    /// Returns `true` if a value of the `other` domain can be stored
    /// as-is in a slot typed with this domain.
    ///
    /// Text types accept one another, everything else must match exactly.
    pub fn accepts(self, other: Domain) -> bool {
        (self.is_text() && other.is_text()) || self == other
    }

    /// The name of the built-in type, if the domain is built-in.
    pub fn builtin_name(self) -> Option<&'static str> {
        Self::BUILTINS
            .iter()
            .find(|(domain, _)| *domain == self)
            .map(|(_, name)| *name)
    }

    /// Looks up a built-in type by its name.
    pub fn builtin_by_name(name: &str) -> Option<Self> {
        Self::BUILTINS
            .iter()
            .find(|(_, builtin)| builtin.eq_ignore_ascii_case(name))
            .map(|(domain, _)| *domain)
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.builtin_name() {
            Some(name) => write!(f, "{name}"),
            None if self.is_table() => write!(f, "Table(#{})", self.0),
            None => write!(f, "Type(#{})", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
/// A coarse grouping of domains used for compatibility checks.
pub enum DomainFamily {
    Void,
    Bool,
    Integer,
    Float,
    Time,
    Text,
    Reference,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
/// The ID of a record within a table.
pub struct RecordId(pub u32);

impl RecordId {
    /// The nil ID, it never identifies a record.
    pub const NIL: Self = Self(0);

    #[inline]
    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }
}

impl From<u32> for RecordId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
/// A substrate assigned handle to a column.
pub struct ColumnId(pub u32);

impl Display for ColumnId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "column#{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// The storage flags of a column.
///
/// The low bits hold the column type, the next group the compression
/// type and bit 8 marks a vector column as weighted.
pub struct ColumnFlags(pub u32);

impl ColumnFlags {
    pub const COLUMN_SCALAR: Self = Self(0x00);
    pub const COLUMN_VECTOR: Self = Self(0x01);
    pub const COLUMN_INDEX: Self = Self(0x02);
    pub const COLUMN_TYPE_MASK: u32 = 0x07;

    pub const COMPRESS_NONE: Self = Self(0x00);
    pub const COMPRESS_ZLIB: Self = Self(0x10);
    pub const COMPRESS_LZO: Self = Self(0x20);
    pub const COMPRESS_MASK: u32 = 0x70;

    pub const WITH_WEIGHT: Self = Self(0x100);

    #[inline]
    pub fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the column type held in the type bits.
    pub fn column_type(self) -> ColumnType {
        match self.0 & Self::COLUMN_TYPE_MASK {
            0x00 => ColumnType::Scalar,
            0x01 => ColumnType::Vector,
            0x02 => ColumnType::Index,
            other => ColumnType::Unknown(other),
        }
    }

    /// Returns the compression type held in the compression bits.
    ///
    /// Unrecognised bit patterns are treated as uncompressed.
    pub fn compression(self) -> CompressionType {
        match self.0 & Self::COMPRESS_MASK {
            0x10 => CompressionType::Zlib,
            0x20 => CompressionType::Lzo,
            _ => CompressionType::None,
        }
    }

    #[inline]
    /// Returns `true` if the weighted bit is set.
    pub fn is_weighted(self) -> bool {
        self.contains(Self::WITH_WEIGHT)
    }
}

impl BitOr for ColumnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ColumnType {
    Scalar,
    Vector,
    Index,
    Unknown(u32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
/// A compression scheme a column can be configured with.
pub enum CompressionType {
    None,
    Zlib,
    Lzo,
}

impl CompressionType {
    /// The flag bits representing the compression type.
    pub fn flags(self) -> ColumnFlags {
        match self {
            Self::None => ColumnFlags::COMPRESS_NONE,
            Self::Zlib => ColumnFlags::COMPRESS_ZLIB,
            Self::Lzo => ColumnFlags::COMPRESS_LZO,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Lzo => "lzo",
        }
    }
}

impl Display for CompressionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionType {
    type Err = ColumnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "zlib" => Ok(Self::Zlib),
            "lzo" => Ok(Self::Lzo),
            _ => Err(ColumnError::contract(format!(
                "compressed type should be <zlib> or <lzo>: <{s}>"
            ))),
        }
    }
}
