//! Tolerant decoding of vendor rows and change-feed envelopes.
//!
//! Rows come from a loosely-typed table: coordinates are sometimes strings
//! (occasionally with a decimal comma), prices may be numbers or strings,
//! and `bottleTypes` is either a brand → type → flag map or a brand → list
//! of offered types. A field that cannot be read is dropped and logged; the
//! row is kept. Only a row without an id is skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use gazloc_core::{ChangeEvent, VendorId, VendorRecord, VendorSet};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ParseError;

/// One line of the change feed.
#[derive(Debug, Deserialize)]
pub struct ChangeEnvelope {
    #[serde(rename = "eventType", alias = "event_type", alias = "type")]
    pub event_type: String,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

/// Decodes one vendor row.
///
/// # Errors
///
/// Returns [`ParseError::NotAnObject`] or [`ParseError::MissingId`]. Every
/// other defect drops the offending field only.
pub fn parse_vendor_row(row: &Value) -> Result<VendorRecord, ParseError> {
    let obj = row.as_object().ok_or(ParseError::NotAnObject)?;
    let id = obj
        .get("id")
        .and_then(parse_id)
        .ok_or(ParseError::MissingId)?;

    let name = obj
        .get("name")
        .and_then(text)
        .unwrap_or_default();
    let mut record = VendorRecord::new(id, name);

    record.location_label = field(obj, &["lieu", "location_label", "location"]).and_then(text);
    record.latitude = coordinate(&record.id, "latitude", field(obj, &["latitude", "lat"]), 90.0);
    record.longitude = coordinate(
        &record.id,
        "longitude",
        field(obj, &["longitude", "lng", "lon"]),
        180.0,
    );
    record.brands = field(obj, &["brands"]).map(brands).unwrap_or_default();
    record.bottle_types = field(obj, &["bottleTypes", "bottle_types"])
        .map(|v| bottle_types(&record.id, v))
        .unwrap_or_default();
    record.prices = field(obj, &["prices"])
        .map(|v| prices(&record.id, v))
        .unwrap_or_default();
    record.image_urls = field(obj, &["imageurls", "image_urls", "imageUrls"])
        .map(string_list)
        .unwrap_or_default();
    record.tel = field(obj, &["tel", "phone"]).and_then(text);
    record.email = field(obj, &["email"]).and_then(text);

    Ok(record)
}

/// Decodes a full listing. Returns the set plus the number of skipped rows.
/// Duplicate ids keep the last row seen at the first row's position.
#[must_use]
pub fn parse_vendor_rows(rows: &[Value]) -> (VendorSet, usize) {
    let mut set = VendorSet::new();
    let mut skipped = 0usize;
    for (index, row) in rows.iter().enumerate() {
        match parse_vendor_row(row) {
            Ok(record) => {
                set.upsert(record);
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(index, error = %e, "skipping vendor row");
            }
        }
    }
    (set, skipped)
}

/// Turns an envelope into a [`ChangeEvent`]. Unknown event kinds and
/// envelopes without a usable row yield `None`.
#[must_use]
pub fn envelope_to_event(envelope: &ChangeEnvelope) -> Option<ChangeEvent> {
    let kind = envelope.event_type.trim().to_ascii_uppercase();
    let row_event = |wrap: fn(VendorRecord) -> ChangeEvent| {
        let row = envelope.new.as_ref()?;
        match parse_vendor_row(row) {
            Ok(record) => Some(wrap(record)),
            Err(e) => {
                tracing::warn!(event = %kind, error = %e, "skipping change event");
                None
            }
        }
    };

    match kind.as_str() {
        "INSERT" => row_event(ChangeEvent::Inserted),
        "UPDATE" => row_event(ChangeEvent::Updated),
        "DELETE" => {
            let id = [&envelope.old, &envelope.new]
                .into_iter()
                .flatten()
                .find_map(|row| row.get("id").and_then(parse_id));
            if id.is_none() {
                tracing::warn!("skipping delete event without an id");
            }
            id.map(ChangeEvent::Deleted)
        }
        other => {
            tracing::debug!(event = other, "ignoring unknown change event kind");
            None
        }
    }
}

/// Decodes one line of the feed body.
///
/// Blank lines and `:` heartbeat comments yield `Ok(None)`; an SSE `data:`
/// prefix is stripped.
///
/// # Errors
///
/// Returns [`ParseError::InvalidEnvelope`] when the line is not a JSON
/// envelope. The caller logs and continues with the next line.
pub fn parse_feed_line(line: &str) -> Result<Option<ChangeEvent>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return Ok(None);
    }
    if trimmed.starts_with("event:") || trimmed.starts_with("id:") || trimmed.starts_with("retry:")
    {
        return Ok(None);
    }
    let payload = trimmed
        .strip_prefix("data:")
        .map_or(trimmed, str::trim_start);

    let envelope: ChangeEnvelope = serde_json::from_str(payload)
        .map_err(|e| ParseError::InvalidEnvelope(e.to_string()))?;
    Ok(envelope_to_event(&envelope))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name).filter(|v| !v.is_null()))
}

fn parse_id(value: &Value) -> Option<VendorId> {
    match value {
        Value::Number(n) => n.as_i64().map(VendorId::Int).or_else(|| {
            let f = n.as_f64()?;
            #[allow(clippy::cast_possible_truncation)]
            let whole = f as i64;
            #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
            let integral = f.is_finite() && whole as f64 == f;
            integral.then_some(VendorId::Int(whole))
        }),
        Value::String(s) if !s.trim().is_empty() => VendorId::from_str(s).ok(),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

fn coordinate(id: &VendorId, name: &'static str, value: Option<&Value>, limit: f64) -> Option<f64> {
    let value = value?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v.abs() <= limit => Some(v),
        _ => {
            tracing::debug!(vendor = %id, field = name, raw = %value, "dropping unreadable coordinate");
            None
        }
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

fn brands(value: &Value) -> BTreeSet<String> {
    string_list(value).into_iter().collect()
}

fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn bottle_types(id: &VendorId, value: &Value) -> BTreeMap<String, BTreeMap<String, bool>> {
    let Some(by_brand) = value.as_object() else {
        tracing::debug!(vendor = %id, field = "bottleTypes", "dropping non-object bottle types");
        return BTreeMap::new();
    };

    let mut out = BTreeMap::new();
    for (brand, types) in by_brand {
        let flags: BTreeMap<String, bool> = match types {
            Value::Object(map) => map
                .iter()
                .filter_map(|(kind, v)| flag(v).map(|f| (kind.clone(), f)))
                .collect(),
            Value::Array(_) | Value::String(_) => string_list(types)
                .into_iter()
                .map(|kind| (kind, true))
                .collect(),
            _ => {
                tracing::debug!(vendor = %id, brand = %brand, "dropping unreadable bottle types");
                continue;
            }
        };
        out.insert(brand.clone(), flags);
    }
    out
}

fn price(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().replace(',', "."),
        _ => return None,
    };
    let parsed = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()?;
    (!parsed.is_sign_negative()).then_some(parsed)
}

fn prices(id: &VendorId, value: &Value) -> BTreeMap<String, BTreeMap<String, Decimal>> {
    let Some(by_brand) = value.as_object() else {
        tracing::debug!(vendor = %id, field = "prices", "dropping non-object prices");
        return BTreeMap::new();
    };

    let mut out = BTreeMap::new();
    for (brand, types) in by_brand {
        let Some(types) = types.as_object() else {
            continue;
        };
        let mut table = BTreeMap::new();
        for (kind, raw) in types {
            match price(raw) {
                Some(p) => {
                    table.insert(kind.clone(), p);
                }
                None => {
                    tracing::debug!(vendor = %id, brand = %brand, bottle_type = %kind, raw = %raw, "dropping unreadable price");
                }
            }
        }
        if !table.is_empty() {
            out.insert(brand.clone(), table);
        }
    }
    out
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;
