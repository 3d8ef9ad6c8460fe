//! Caller facing values passed into and returned from column accessors.

use bon::Builder;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ColumnError, ResolveError};
use crate::types::{Domain, DomainFamily, RecordId};

#[derive(Debug, Clone, PartialEq)]
/// A single value supplied by the caller.
///
/// Each variant has a natural domain which decides how it is encoded
/// when staged into a buffer, see [Value::natural_domain].
pub enum Value {
    Text(String),
    Bytes(Bytes),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    /// Microseconds since the unix epoch.
    Time(i64),
    /// A record of the given table.
    Reference { table: Domain, id: RecordId },
}

impl Value {
    /// The domain the value is encoded with when no other type is imposed.
    ///
    /// Integers use the narrowest of `Int32`, `Int64` and `UInt64` which
    /// holds them.
    pub fn natural_domain(&self) -> Domain {
        match self {
            Value::Text(_) | Value::Bytes(_) => Domain::TEXT,
            Value::Int(v) => {
                if i32::try_from(*v).is_ok() {
                    Domain::INT32
                } else {
                    Domain::INT64
                }
            },
            Value::UInt(v) => {
                if *v <= i32::MAX as u64 {
                    Domain::INT32
                } else if *v <= i64::MAX as u64 {
                    Domain::INT64
                } else {
                    Domain::UINT64
                }
            },
            Value::Float(_) => Domain::FLOAT,
            Value::Bool(_) => Domain::BOOL,
            Value::Time(_) => Domain::TIME,
            Value::Reference { table, .. } => *table,
        }
    }

    /// Appends the natural encoding of the value to `out` and returns the
    /// domain it was encoded with.
    ///
    /// Numbers are written little endian at the width of their domain.
    pub fn write_natural(&self, out: &mut BytesMut) -> Domain {
        let domain = self.natural_domain();
        match self {
            Value::Text(text) => out.put_slice(text.as_bytes()),
            Value::Bytes(bytes) => out.put_slice(bytes),
            Value::Int(v) => match domain {
                Domain::INT32 => out.put_i32_le(*v as i32),
                _ => out.put_i64_le(*v),
            },
            Value::UInt(v) => match domain {
                Domain::INT32 => out.put_i32_le(*v as i32),
                Domain::INT64 => out.put_i64_le(*v as i64),
                _ => out.put_u64_le(*v),
            },
            Value::Float(v) => out.put_f64_le(*v),
            Value::Bool(v) => out.put_u8(u8::from(*v)),
            Value::Time(v) => out.put_i64_le(*v),
            Value::Reference { id, .. } => out.put_u32_le(id.0),
        }
        domain
    }

    /// Appends the value encoded as `domain` to `out`.
    ///
    /// Integers are narrowed or widened to the width of the domain and
    /// must fit it. Anything outside the domain's family is rejected and
    /// nothing is written.
    pub fn write_as(&self, domain: Domain, out: &mut BytesMut) -> Result<(), ColumnError> {
        let mismatch = || {
            ColumnError::contract(format!(
                "value of {} cannot be stored as {domain}",
                self.natural_domain()
            ))
        };

        match (self, domain.family()) {
            (Value::Text(_) | Value::Bytes(_), DomainFamily::Text) => {
                self.write_natural(out);
            },
            (Value::Int(_) | Value::UInt(_), DomainFamily::Integer) => {
                let v = self.as_i128().ok_or_else(mismatch)?;
                let fits = match domain {
                    Domain::INT8 => i8::try_from(v).map(|v| out.put_i8(v)).is_ok(),
                    Domain::UINT8 => u8::try_from(v).map(|v| out.put_u8(v)).is_ok(),
                    Domain::INT16 => i16::try_from(v).map(|v| out.put_i16_le(v)).is_ok(),
                    Domain::UINT16 => u16::try_from(v).map(|v| out.put_u16_le(v)).is_ok(),
                    Domain::INT32 => i32::try_from(v).map(|v| out.put_i32_le(v)).is_ok(),
                    Domain::UINT32 => u32::try_from(v).map(|v| out.put_u32_le(v)).is_ok(),
                    Domain::INT64 => i64::try_from(v).map(|v| out.put_i64_le(v)).is_ok(),
                    _ => u64::try_from(v).map(|v| out.put_u64_le(v)).is_ok(),
                };
                if !fits {
                    return Err(ColumnError::contract(format!(
                        "integer {v} is out of range for {domain}"
                    )));
                }
            },
            (Value::Float(v), DomainFamily::Float) => out.put_f64_le(*v),
            (Value::Bool(v), DomainFamily::Bool) => out.put_u8(u8::from(*v)),
            (Value::Time(v) | Value::Int(v), DomainFamily::Time) => out.put_i64_le(*v),
            (Value::Reference { table, id }, DomainFamily::Reference) if *table == domain => {
                out.put_u32_le(id.0)
            },
            _ => return Err(mismatch()),
        }

        Ok(())
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int(v) => Some(*v as i128),
            Value::UInt(v) => Some(*v as i128),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::UInt(value as u64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Builder)]
/// One element of a vector write.
///
/// Both parts are optional: a missing weight is stored as `0` and a
/// missing value is stored as a present, empty element.
pub struct ElementSpec {
    #[builder(into)]
    pub value: Option<Value>,
    pub weight: Option<u32>,
}

impl ElementSpec {
    /// Creates a new element with both a value and a weight.
    pub fn new(value: impl Into<Value>, weight: u32) -> Self {
        Self {
            value: Some(value.into()),
            weight: Some(weight),
        }
    }

    #[inline]
    /// The weight that will be stored for the element.
    pub fn resolved_weight(&self) -> u32 {
        self.weight.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// The input of a column write.
pub enum ColumnInput {
    /// A single value, for scalar columns.
    Scalar(Value),
    /// An ordered sequence of elements, for vector columns.
    Elements(Vec<ElementSpec>),
}

impl From<Value> for ColumnInput {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<ElementSpec>> for ColumnInput {
    fn from(elements: Vec<ElementSpec>) -> Self {
        Self::Elements(elements)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A decoded vector element.
pub struct VectorElement {
    /// The raw bytes of the element.
    pub value: Bytes,
    /// The weight of the element, always `0` for unweighted vectors.
    pub weight: u32,
    /// The type of the element's bytes.
    pub domain: Domain,
}

impl VectorElement {
    pub fn new(value: impl Into<Bytes>, weight: u32, domain: Domain) -> Self {
        Self {
            value: value.into(),
            weight,
            domain,
        }
    }

    /// Returns the element as UTF-8 text if it is valid text.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    /// Returns the referenced record ID if the element is a 4 byte
    /// table reference.
    pub fn as_record_id(&self) -> Option<RecordId> {
        if !self.domain.is_table() {
            return None;
        }
        if self.value.len() != 4 {
            return None;
        }
        Some(RecordId(u32::from_le(bytemuck::pod_read_unaligned(&self.value))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A stored scalar value.
pub struct ScalarValue {
    /// The raw bytes, empty when nothing was ever stored.
    pub bytes: Bytes,
    pub domain: Domain,
}

impl ScalarValue {
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The result of a column read.
pub enum ColumnValue {
    Scalar(ScalarValue),
    Elements(Vec<VectorElement>),
}

impl ColumnValue {
    pub fn as_elements(&self) -> Option<&[VectorElement]> {
        match self {
            Self::Elements(elements) => Some(elements),
            Self::Scalar(_) => None,
        }
    }

    pub fn into_elements(self) -> Option<Vec<VectorElement>> {
        match self {
            Self::Elements(elements) => Some(elements),
            Self::Scalar(_) => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Elements(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A reference to a record, resolved against a table before use.
pub enum RecordRef {
    /// A raw record ID.
    Id(RecordId),
    /// A record which knows which table it belongs to.
    Record { table: Domain, id: RecordId },
    /// The key of a record in a keyed table.
    Key(Value),
}

impl RecordRef {
    /// Creates a reference that is resolved by looking up `key`.
    pub fn key(key: impl Into<Value>) -> Self {
        Self::Key(key.into())
    }
}

impl From<u32> for RecordRef {
    fn from(value: u32) -> Self {
        Self::Id(RecordId(value))
    }
}

impl From<RecordId> for RecordRef {
    fn from(value: RecordId) -> Self {
        Self::Id(value)
    }
}

impl TryFrom<Value> for RecordRef {
    type Error = ResolveError;

    /// Integers are taken as record IDs, references keep their table and
    /// everything else is looked up as a key.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int(v) => u32::try_from(v)
                .map(|id| Self::Id(RecordId(id)))
                .map_err(|_| ResolveError::OutOfRange(v.to_string())),
            Value::UInt(v) => u32::try_from(v)
                .map(|id| Self::Id(RecordId(id)))
                .map_err(|_| ResolveError::OutOfRange(v.to_string())),
            Value::Reference { table, id } => Ok(Self::Record { table, id }),
            other => Ok(Self::Key(other)),
        }
    }
}
