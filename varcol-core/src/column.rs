use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, instrument, trace};

use crate::buffer::{ElementClass, ScratchBuffer, ValueBuffer};
use crate::codec::{decode_all, encode_all};
use crate::compression;
use crate::defrag::{self, DefragOptions};
use crate::error::{ColumnError, StorageError};
use crate::substrate::{ColumnSchema, StorageSubstrate};
use crate::types::{ColumnId, ColumnType, CompressionType, Domain, RecordId};
use crate::value::{
    ColumnInput,
    ColumnValue,
    ElementSpec,
    RecordRef,
    ScalarValue,
    Value,
    VectorElement,
};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
/// The read and write path of a column, resolved once when it is bound.
pub enum ColumnKind {
    Scalar,
    Vector(ElementClass),
    WeightedVector(ElementClass),
}

impl ColumnKind {
    pub fn element_class(self) -> Option<ElementClass> {
        match self {
            Self::Scalar => None,
            Self::Vector(class) | Self::WeightedVector(class) => Some(class),
        }
    }
}

/// Reads and writes the values of one variable-size column.
///
/// The accessor owns the buffer each record's value is staged in and,
/// for weighted vectors, the per-element scratch buffer. Both are reused
/// across calls and released when the accessor is dropped.
pub struct ColumnAccessor<S: StorageSubstrate + ?Sized> {
    substrate: Arc<S>,
    schema: ColumnSchema,
    kind: ColumnKind,
    value: ValueBuffer,
    element_value: Option<ScratchBuffer>,
}

impl<S: StorageSubstrate + ?Sized> ColumnAccessor<S> {
    #[instrument(name = "bind-column", skip(substrate))]
    /// Binds the given column of the substrate.
    ///
    /// Index columns and unknown column types cannot be bound.
    pub fn bind(substrate: Arc<S>, column: ColumnId) -> Result<Self, ColumnError> {
        let schema = substrate
            .column_schema(column)
            .map_err(|source| ColumnError::Storage {
                operation: "bind",
                column: column.to_string(),
                source,
            })?;

        let class = if schema.range.is_table() {
            let table = substrate
                .table_schema(schema.range)
                .map_err(|source| ColumnError::Storage {
                    operation: "bind",
                    column: schema.name.clone(),
                    source,
                })?;
            ElementClass::UVector {
                table: table.id,
                key_domain: table.element_key_domain(),
            }
        } else {
            ElementClass::Vector {
                domain: schema.range,
            }
        };

        let kind = match schema.flags.column_type() {
            ColumnType::Scalar => ColumnKind::Scalar,
            ColumnType::Vector if schema.flags.is_weighted() => ColumnKind::WeightedVector(class),
            ColumnType::Vector => ColumnKind::Vector(class),
            ColumnType::Index => {
                return Err(ColumnError::contract(format!(
                    "{} is an index column and holds no values",
                    schema.name
                )))
            },
            ColumnType::Unknown(bits) => {
                return Err(ColumnError::contract(format!(
                    "{} has an unknown column type: {bits:#x}",
                    schema.name
                )))
            },
        };

        let element_value = match kind {
            ColumnKind::WeightedVector(class) => Some(ScratchBuffer::open(class)),
            _ => None,
        };
        let value = ValueBuffer::open(schema.range, schema.value_flags());

        debug!(column = %schema.name, kind = ?kind, "Bound column");

        Ok(Self {
            substrate,
            schema,
            kind,
            value,
            element_value,
        })
    }

    #[inline]
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    #[inline]
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    #[inline]
    pub fn substrate(&self) -> &Arc<S> {
        &self.substrate
    }

    #[instrument(skip_all, fields(column = %self.schema.name))]
    /// Reads the value of a record.
    ///
    /// Records that were never written read back as an empty value.
    pub fn get(&mut self, record: impl Into<RecordRef>) -> Result<ColumnValue, ColumnError> {
        let id = self.resolve(&record.into())?;

        self.value
            .reinit(self.schema.range, self.schema.value_flags());
        self.substrate
            .fetch_value(self.schema.id, id, &mut self.value)
            .map_err(|source| self.storage_error("get", source))?;

        let value = match self.kind {
            ColumnKind::Scalar => ColumnValue::Scalar(ScalarValue {
                bytes: Bytes::copy_from_slice(self.value.head()),
                domain: self.value.domain(),
            }),
            ColumnKind::Vector(_) | ColumnKind::WeightedVector(_) => ColumnValue::Elements(
                decode_all(&self.value)
                    .map(VectorElement::from)
                    .collect(),
            ),
        };

        trace!(record = %id, "Read record value");
        Ok(value)
    }

    #[instrument(skip_all, fields(column = %self.schema.name))]
    /// Replaces the value of a record.
    ///
    /// Scalar columns take a single value and vector columns a sequence of
    /// elements. The whole input is encoded before anything is committed,
    /// so a rejected input leaves the stored value untouched.
    ///
    /// Returns the accepted input.
    pub fn set(
        &mut self,
        record: impl Into<RecordRef>,
        input: impl Into<ColumnInput>,
    ) -> Result<ColumnInput, ColumnError> {
        let id = self.resolve(&record.into())?;
        let input = input.into();

        self.value
            .reinit(self.schema.range, self.schema.value_flags());

        match (self.kind, &input) {
            (ColumnKind::Scalar, ColumnInput::Scalar(value)) => {
                value.write_as(self.schema.range, self.value.body_mut())?;
            },
            (ColumnKind::Vector(class), ColumnInput::Elements(elements)) => {
                self.encode_plain(class, elements)?;
            },
            (ColumnKind::WeightedVector(class), ColumnInput::Elements(elements)) => {
                let scratch = self
                    .element_value
                    .get_or_insert_with(|| ScratchBuffer::open(class));
                encode_all(&mut self.value, scratch, elements)?;
                if let ElementClass::UVector { table, .. } = class {
                    self.check_keys(table, elements)?;
                }
            },
            (ColumnKind::Scalar, ColumnInput::Elements(_)) => {
                return Err(ColumnError::contract(format!(
                    "{} is a scalar column and takes a single value",
                    self.schema.name
                )));
            },
            (_, ColumnInput::Scalar(_)) => {
                return Err(ColumnError::contract(format!(
                    "{} is a vector column and takes a sequence of elements",
                    self.schema.name
                )));
            },
        }

        self.substrate
            .commit_value(self.schema.id, id, &self.value)
            .map_err(|source| self.storage_error("set", source))?;

        trace!(record = %id, elements = self.value.element_count(), "Committed record value");
        Ok(input)
    }

    /// Encodes the elements of an unweighted vector.
    ///
    /// Weights are ignored. Elements of a table range are resolved to
    /// record IDs of that table, everything else is stored as the range.
    fn encode_plain(
        &mut self,
        class: ElementClass,
        elements: &[ElementSpec],
    ) -> Result<(), ColumnError> {
        let range = self.schema.range;
        let mut element_value = BytesMut::new();

        for element in elements {
            element_value.clear();

            match (class, element.value.as_ref()) {
                (ElementClass::UVector { table, .. }, Some(value)) => {
                    let record = RecordRef::try_from(value.clone())?;
                    let id = self.substrate.resolve_record(table, &record)?;
                    self.value.add_element(&id.0.to_le_bytes(), 0, range)?;
                    continue;
                },
                (ElementClass::UVector { table, .. }, None) => {
                    return Err(ColumnError::contract(format!(
                        "elements of a reference vector to {table} must name a record"
                    )));
                },
                (ElementClass::Vector { .. }, Some(value)) => {
                    value.write_as(range, &mut element_value)?;
                },
                (ElementClass::Vector { .. }, None) => {},
            }

            self.value.add_element(&element_value, 0, range)?;
        }

        Ok(())
    }

    /// Checks that every element of a weighted reference vector names an
    /// existing record of `table`.
    ///
    /// Elements keep their staged key bytes and domain, only the lookup
    /// has to succeed.
    fn check_keys(&self, table: Domain, elements: &[ElementSpec]) -> Result<(), ColumnError> {
        for value in elements.iter().filter_map(|element| element.value.as_ref()) {
            let record = match value {
                Value::Reference { table, id } => RecordRef::Record {
                    table: *table,
                    id: *id,
                },
                key => RecordRef::Key(key.clone()),
            };
            self.substrate.resolve_record(table, &record)?;
        }
        Ok(())
    }

    /// Reports whether the column is compressed, optionally with the
    /// `requested` scheme, and whether the substrate supports it.
    pub fn compression_state(&self, requested: Option<CompressionType>) -> bool {
        compression::compression_state(self.schema.flags, requested, |compression| {
            self.substrate.supports_compression(compression)
        })
    }

    /// Like [Self::compression_state] with the scheme given by name.
    ///
    /// Names other than `none`, `zlib` and `lzo` are rejected.
    pub fn compression_state_by_name(&self, requested: Option<&str>) -> Result<bool, ColumnError> {
        let requested = requested
            .map(str::parse::<CompressionType>)
            .transpose()?;
        Ok(self.compression_state(requested))
    }

    #[instrument(skip_all, fields(column = %self.schema.name, threshold = options.threshold))]
    /// Compacts the column's segments, returning how many were reclaimed.
    pub fn defrag(&self, options: DefragOptions) -> Result<u32, ColumnError> {
        defrag::defrag(self.substrate.as_ref(), &self.schema, options)
    }

    /// Releases the accessor and the buffers it owns.
    pub fn finalize(self) {
        drop(self);
    }

    fn resolve(&self, record: &RecordRef) -> Result<RecordId, ColumnError> {
        let id = self.substrate.resolve_record(self.schema.domain, record)?;
        Ok(id)
    }

    fn storage_error(&self, operation: &'static str, source: StorageError) -> ColumnError {
        ColumnError::Storage {
            operation,
            column: self.schema.name.clone(),
            source,
        }
    }
}

impl<S: StorageSubstrate + ?Sized> Drop for ColumnAccessor<S> {
    fn drop(&mut self) {
        trace!(
            column = %self.schema.name,
            has_scratch = self.element_value.is_some(),
            "Releasing column accessor"
        );
    }
}

impl<S: StorageSubstrate + ?Sized> std::fmt::Debug for ColumnAccessor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnAccessor")
            .field("schema", &self.schema)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
