use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use tracing::trace;
use varcol_core::{Domain, RecordId, RecordRef, ResolveError, TableKind, TableSchema, Value};

use crate::store::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// A table's records and key lookup.
///
/// Record IDs are allocated densely starting at `1`. Keys are stored
/// encoded as the table's key domain.
pub(crate) struct Table {
    schema: TableSchema,
    keys: ahash::HashMap<Vec<u8>, RecordId>,
    records: u32,
}

impl Table {
    pub(crate) fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            keys: ahash::HashMap::default(),
            records: 0,
        }
    }

    #[inline]
    pub(crate) fn schema(&self) -> &TableSchema {
        &self.schema
    }

    #[inline]
    pub(crate) fn len(&self) -> u32 {
        self.records
    }

    /// Adds a record, returning its ID and whether it was newly created.
    ///
    /// Adding a key which already exists returns the existing record.
    pub(crate) fn add_record(&mut self, key: Option<&Value>) -> Result<(RecordId, bool), StoreError> {
        let key = match (self.schema.key_domain, key) {
            (None, None) => None,
            (None, Some(_)) => {
                return Err(StoreError::InvalidRecord(format!(
                    "table {:?} has no keys",
                    self.schema.name
                )))
            },
            (Some(_), None) => {
                return Err(StoreError::InvalidRecord(format!(
                    "table {:?} requires a key",
                    self.schema.name
                )))
            },
            (Some(key_domain), Some(key)) => {
                let mut encoded = BytesMut::new();
                key.write_as(key_domain, &mut encoded)
                    .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
                Some(encoded.to_vec())
            },
        };

        if let Some(id) = key.as_ref().and_then(|key| self.keys.get(key)) {
            return Ok((*id, false));
        }

        let id = self
            .records
            .checked_add(1)
            .map(RecordId)
            .ok_or_else(|| StoreError::InvalidRecord("table is full".to_string()))?;
        self.records = id.0;
        if let Some(key) = key {
            self.keys.insert(key, id);
        }

        trace!(table = %self.schema.name, record = %id, "Added record");
        Ok((id, true))
    }

    /// Resolves a reference to an existing record of this table.
    pub(crate) fn resolve(&self, record: &RecordRef) -> Result<RecordId, ResolveError> {
        match record {
            RecordRef::Id(id) => self.check_id(*id),
            RecordRef::Record { table, id } => {
                if *table != self.schema.id {
                    return Err(ResolveError::WrongTable {
                        expected: self.schema.id,
                        actual: *table,
                    });
                }
                self.check_id(*id)
            },
            RecordRef::Key(key) => {
                let key_domain = self
                    .schema
                    .key_domain
                    .ok_or(ResolveError::KeylessTable(self.schema.id))?;

                let unknown = || ResolveError::UnknownKey {
                    table: self.schema.id,
                    key: format!("{key:?}"),
                };

                let mut encoded = BytesMut::new();
                key.write_as(key_domain, &mut encoded)
                    .map_err(|_| unknown())?;
                self.keys.get(&encoded[..]).copied().ok_or_else(unknown)
            },
        }
    }

    fn check_id(&self, id: RecordId) -> Result<RecordId, ResolveError> {
        if id.is_nil() {
            return Err(ResolveError::NilId);
        }
        if id.0 > self.records {
            return Err(ResolveError::UnknownId {
                table: self.schema.id,
                id,
            });
        }
        Ok(id)
    }
}

/// The domain a table of the given kind is keyed by.
pub(crate) fn validate_key_domain(
    kind: TableKind,
    key_domain: Option<Domain>,
) -> Result<Option<Domain>, StoreError> {
    match (kind, key_domain) {
        (TableKind::NoKey, None) => Ok(None),
        (TableKind::NoKey, Some(_)) => Err(StoreError::InvalidSchema(
            "tables without keys cannot have a key type".to_string(),
        )),
        (_, None) => Ok(Some(Domain::SHORT_TEXT)),
        (_, Some(domain))
            if domain == Domain::VOID || (!domain.is_table() && domain.builtin_name().is_none()) =>
        {
            Err(StoreError::InvalidSchema(format!("{domain} cannot be used as a key")))
        },
        (_, Some(domain)) => Ok(Some(domain)),
    }
}
