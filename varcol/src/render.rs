//! Conversions between command line arguments, column values and JSON.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value as JsonValue};
use varcol_core::{
    ColumnValue,
    Domain,
    DomainFamily,
    ElementSpec,
    RecordId,
    RecordRef,
    StorageSubstrate,
    Value,
    VectorElement,
};

/// Parses a record argument, `#<id>` for a record ID and anything else
/// as a key of the table.
pub fn parse_record(
    substrate: &dyn StorageSubstrate,
    table: Domain,
    raw: &str,
) -> Result<RecordRef> {
    if let Some(id) = raw.strip_prefix('#') {
        let id = id
            .parse::<u32>()
            .with_context(|| format!("Invalid record ID {raw:?}"))?;
        return Ok(RecordRef::Id(RecordId(id)));
    }

    let schema = substrate.table_schema(table)?;
    let key_domain = schema
        .key_domain
        .ok_or_else(|| anyhow!("Table {:?} has no keys, use #<id>", schema.name))?;
    let key = parse_value(substrate, raw, key_domain)?;
    Ok(RecordRef::Key(key))
}

/// Parses `raw` as a value of the given domain.
///
/// References are given as `#<id>` or as a key of the referenced table.
pub fn parse_value(substrate: &dyn StorageSubstrate, raw: &str, domain: Domain) -> Result<Value> {
    let value = match domain.family() {
        DomainFamily::Text => Value::Text(raw.to_string()),
        DomainFamily::Integer => match raw.parse::<i64>() {
            Ok(v) => Value::Int(v),
            Err(_) => Value::UInt(
                raw.parse::<u64>()
                    .with_context(|| format!("Invalid integer {raw:?}"))?,
            ),
        },
        DomainFamily::Float => Value::Float(
            raw.parse()
                .with_context(|| format!("Invalid float {raw:?}"))?,
        ),
        DomainFamily::Bool => Value::Bool(
            raw.parse()
                .with_context(|| format!("Invalid bool {raw:?}"))?,
        ),
        DomainFamily::Time => Value::Time(
            raw.parse()
                .with_context(|| format!("Invalid timestamp {raw:?}"))?,
        ),
        DomainFamily::Reference => {
            let record = parse_record(substrate, domain, raw)?;
            let id = substrate.resolve_record(domain, &record)?;
            Value::Reference { table: domain, id }
        },
        DomainFamily::Void => bail!("Values of {domain} cannot be parsed"),
    };

    Ok(value)
}

/// Parses an element argument of the form `value[:weight]`.
///
/// The weight is only split off when `weighted` is set, an empty value
/// part leaves the element's value absent.
pub fn parse_element(
    substrate: &dyn StorageSubstrate,
    raw: &str,
    domain: Domain,
    weighted: bool,
) -> Result<ElementSpec> {
    let (value, weight) = match raw.rsplit_once(':') {
        Some((value, weight)) if weighted => {
            let weight = weight
                .parse::<u32>()
                .with_context(|| format!("Invalid weight in {raw:?}"))?;
            (value, Some(weight))
        },
        _ => (raw, None),
    };

    let value = if value.is_empty() && weighted {
        None
    } else {
        Some(parse_value(substrate, value, domain)?)
    };

    Ok(ElementSpec { value, weight })
}

/// Renders the raw bytes of a value as JSON.
pub fn render_bytes(bytes: &[u8], domain: Domain) -> JsonValue {
    if bytes.is_empty() {
        return JsonValue::Null;
    }

    let rendered = match (domain.family(), bytes.len()) {
        (DomainFamily::Text, _) => Some(json!(String::from_utf8_lossy(bytes))),
        (DomainFamily::Bool, 1) => Some(json!(bytes[0] != 0)),
        (DomainFamily::Integer, _) => render_integer(bytes, domain),
        (DomainFamily::Float, 8) => bytes.try_into().ok().map(|b| json!(f64::from_le_bytes(b))),
        (DomainFamily::Time, 8) => bytes.try_into().ok().map(|b| json!(i64::from_le_bytes(b))),
        (DomainFamily::Reference, 4) => bytes
            .try_into()
            .ok()
            .map(|b| json!(format!("#{}", u32::from_le_bytes(b)))),
        _ => None,
    };

    rendered.unwrap_or_else(|| json!(bytes))
}

fn render_integer(bytes: &[u8], domain: Domain) -> Option<JsonValue> {
    let value = match domain {
        Domain::INT8 => json!(i8::from_le_bytes(bytes.try_into().ok()?)),
        Domain::UINT8 => json!(u8::from_le_bytes(bytes.try_into().ok()?)),
        Domain::INT16 => json!(i16::from_le_bytes(bytes.try_into().ok()?)),
        Domain::UINT16 => json!(u16::from_le_bytes(bytes.try_into().ok()?)),
        Domain::INT32 => json!(i32::from_le_bytes(bytes.try_into().ok()?)),
        Domain::UINT32 => json!(u32::from_le_bytes(bytes.try_into().ok()?)),
        Domain::INT64 => json!(i64::from_le_bytes(bytes.try_into().ok()?)),
        _ => json!(u64::from_le_bytes(bytes.try_into().ok()?)),
    };
    Some(value)
}

fn render_element(element: &VectorElement, weighted: bool) -> JsonValue {
    let value = render_bytes(&element.value, element.domain);
    if weighted {
        json!({ "value": value, "weight": element.weight })
    } else {
        value
    }
}

/// Renders a column read as JSON.
pub fn render_value(value: &ColumnValue, weighted: bool) -> JsonValue {
    match value {
        ColumnValue::Scalar(scalar) => render_bytes(&scalar.bytes, scalar.domain),
        ColumnValue::Elements(elements) => JsonValue::Array(
            elements
                .iter()
                .map(|element| render_element(element, weighted))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use varcol_store::{SegmentStore, TableOptions};

    use super::*;

    #[test]
    fn test_render_bytes() {
        assert_eq!(render_bytes(b"ruby", Domain::SHORT_TEXT), json!("ruby"));
        assert_eq!(render_bytes(&7i32.to_le_bytes(), Domain::INT32), json!(7));
        assert_eq!(render_bytes(&[1], Domain::BOOL), json!(true));
        assert_eq!(render_bytes(&9u32.to_le_bytes(), Domain(300)), json!("#9"));
        assert_eq!(render_bytes(&[], Domain::TEXT), JsonValue::Null);
        assert_eq!(render_bytes(&[1, 2, 3], Domain::INT32), json!([1, 2, 3]));
    }

    #[test]
    fn test_parse_element() {
        let store = SegmentStore::in_memory("cli").unwrap();

        let element = parse_element(&store, "ruby:100", Domain::SHORT_TEXT, true).unwrap();
        assert_eq!(element, ElementSpec::new("ruby", 100));

        let element = parse_element(&store, ":5", Domain::SHORT_TEXT, true).unwrap();
        assert_eq!(element.value, None);
        assert_eq!(element.weight, Some(5));

        let element = parse_element(&store, "a:b", Domain::SHORT_TEXT, false).unwrap();
        assert_eq!(element.value, Some(Value::from("a:b")));
        assert_eq!(element.weight, None);

        assert!(parse_element(&store, "ruby:heavy", Domain::SHORT_TEXT, true).is_err());
    }

    #[test]
    fn test_parse_references() {
        let store = SegmentStore::in_memory("cli").unwrap();
        let table = store
            .create_table(TableOptions::builder().name("Tags").build())
            .unwrap();
        let id = store.add_record("Tags", Some(Value::from("ruby"))).unwrap();

        let by_key = parse_value(&store, "ruby", table.id).unwrap();
        assert_eq!(by_key, Value::Reference { table: table.id, id });
        let by_id = parse_value(&store, &format!("#{}", id.0), table.id).unwrap();
        assert_eq!(by_id, by_key);
        assert!(parse_value(&store, "python", table.id).is_err());

        assert_eq!(
            parse_record(&store, table.id, "#1").unwrap(),
            RecordRef::Id(RecordId(1))
        );
    }
}
