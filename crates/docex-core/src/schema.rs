//! Lenient normalization of model output into [`ValidatedFields`].
//!
//! Models return "almost right" JSON: alternate key spellings, numbers as
//! strings, dates in whatever format the document used. Everything here is
//! coerced rather than rejected. Only shapes that cannot be repaired produce a
//! [`ValidationError`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;
use tracing::{debug, trace};

use crate::error::ValidationError;
use crate::models::document::{DocumentType, LineItem, ValidatedFields};

/// Canonical fields that accept alternate spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Type,
    Vendor,
    Amount,
    Date,
    DateRaw,
    RawText,
    Items,
    ItemDescription,
    ItemQuantity,
    ItemUnitPrice,
    ItemTotal,
}

/// Alias priority per field. The first alias holding a non-null value wins.
pub const ALIASES: &[(Field, &[&str])] = &[
    (Field::Type, &["type"]),
    (Field::Vendor, &["vendor", "store_name", "merchant", "business_name"]),
    (Field::Amount, &["amount", "total", "total_amount"]),
    (Field::Date, &["date"]),
    (Field::DateRaw, &["date_raw"]),
    (Field::RawText, &["raw_text"]),
    (Field::Items, &["items", "line_items"]),
    (Field::ItemDescription, &["description", "name", "item"]),
    (Field::ItemQuantity, &["quantity", "qty"]),
    (Field::ItemUnitPrice, &["unit_price"]),
    (Field::ItemTotal, &["total", "price", "amount"]),
];

lazy_static! {
    static ref SHORT_US_DATE: Regex = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").unwrap();
    static ref GROUPED_THOUSANDS: Regex = Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap();
}

/// Formats tried, in order, before the `M/D/YY` fallback.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Normalize a raw model payload.
///
/// Applying this to the serialized output of a previous call yields the same
/// fields again.
pub fn validate(raw: &Value) -> Result<ValidatedFields, ValidationError> {
    let object = raw
        .as_object()
        .ok_or_else(|| ValidationError::NotAnObject(json_kind(raw)))?;

    let doc_type = match lookup(object, Field::Type) {
        None => DocumentType::Other,
        Some(Value::String(label)) => DocumentType::from_label(label),
        Some(other) => {
            return Err(ValidationError::FieldType {
                field: "type".to_string(),
                found: json_kind(other),
            });
        }
    };

    let (date, date_raw) = match lookup(object, Field::Date) {
        Some(value) => {
            let text = scalar_text(value);
            match text.as_deref().map(normalize_date) {
                Some(DateOutcome::Parsed(date)) => (Some(date), None),
                Some(DateOutcome::Fallback(date)) => (Some(date), text),
                Some(DateOutcome::Failed) | None => (None, text),
            }
        }
        None => (None, None),
    };
    let date_raw = date_raw.or_else(|| lookup(object, Field::DateRaw).and_then(scalar_text));

    let items = match lookup(object, Field::Items) {
        None => None,
        Some(Value::Array(entries)) => Some(
            entries
                .iter()
                .enumerate()
                .map(|(index, entry)| line_item(index, entry))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Some(other) => {
            return Err(ValidationError::FieldType {
                field: "items".to_string(),
                found: json_kind(other),
            });
        }
    };

    let fields = ValidatedFields {
        doc_type,
        vendor: lookup(object, Field::Vendor).and_then(scalar_text),
        amount: lookup(object, Field::Amount).and_then(coerce_decimal),
        date,
        date_raw,
        items,
        raw_text: lookup(object, Field::RawText).and_then(scalar_text),
    };

    debug!(
        "Validated payload: type={}, vendor={:?}, amount={:?}",
        fields.doc_type, fields.vendor, fields.amount
    );
    Ok(fields)
}

fn line_item(index: usize, entry: &Value) -> Result<LineItem, ValidationError> {
    let object = entry
        .as_object()
        .ok_or(ValidationError::LineItem { index })?;

    Ok(LineItem {
        description: lookup(object, Field::ItemDescription)
            .and_then(scalar_text)
            .unwrap_or_else(|| LineItem::UNKNOWN_DESCRIPTION.to_string()),
        quantity: lookup(object, Field::ItemQuantity).and_then(coerce_decimal),
        unit_price: lookup(object, Field::ItemUnitPrice).and_then(coerce_decimal),
        total: lookup(object, Field::ItemTotal).and_then(coerce_decimal),
    })
}

/// Whether any alias of `field` holds a non-null value.
pub fn has_field(object: &Map<String, Value>, field: Field) -> bool {
    lookup(object, field).is_some()
}

/// First non-null value among the field's aliases.
fn lookup<'a>(object: &'a Map<String, Value>, field: Field) -> Option<&'a Value> {
    let aliases = ALIASES
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or_default();

    aliases.iter().find_map(|alias| {
        let wanted = normalize_key(alias);
        object
            .iter()
            .find(|(key, value)| !value.is_null() && normalize_key(key) == wanted)
            .map(|(_, value)| value)
    })
}

/// Lowercase and drop `_`, `-` and spaces, so `unitPrice`, `unit_price` and
/// `Unit Price` compare equal.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Non-empty trimmed text for strings and numbers.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Coerce a JSON number or numeric-looking string into a decimal.
///
/// Currency symbols and spaces are ignored. Commas are accepted only as
/// thousands separators (`1,234.50`); `12,50` or `1.234,56` become `None`.
pub fn coerce_decimal(value: &Value) -> Option<Decimal> {
    let text: String = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | ' '))
            .collect(),
        _ => return None,
    };

    if text.is_empty() {
        return None;
    }

    let text = if text.contains(',') {
        if !GROUPED_THOUSANDS.is_match(&text) {
            trace!("Dropping ambiguous comma number {:?}", text);
            return None;
        }
        text.replace(',', "")
    } else {
        text
    };

    let parsed = Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text));
    if parsed.is_err() {
        trace!("Dropping non-numeric value {:?}", text);
    }
    parsed.ok()
}

/// Result of date normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOutcome {
    /// A generic format matched.
    Parsed(NaiveDate),
    /// Only the `M/D/YY(YY)` pattern matched; the source string should be kept.
    Fallback(NaiveDate),
    Failed,
}

/// Parse a model-provided date string.
pub fn normalize_date(input: &str) -> DateOutcome {
    let input = input.trim();

    if let Some(date) = parse_generic(input) {
        return DateOutcome::Parsed(date);
    }

    if let Some(caps) = SHORT_US_DATE.captures(input) {
        let month: u32 = caps[1].parse().unwrap_or(0);
        let day: u32 = caps[2].parse().unwrap_or(0);
        let year: i32 = match caps[3].len() {
            2 => 2000 + caps[3].parse::<i32>().unwrap_or(0),
            _ => caps[3].parse().unwrap_or(0),
        };
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return DateOutcome::Fallback(date);
        }
    }

    DateOutcome::Failed
}

fn parse_generic(input: &str) -> Option<NaiveDate> {
    // chrono accepts short years for %Y, which would read "3/5/24" as year 3.
    let four_digit_year = input
        .as_bytes()
        .get(..4)
        .is_some_and(|prefix| prefix.iter().all(u8::is_ascii_digit));

    if let Some(date) = DATE_FORMATS
        .iter()
        .filter(|format| four_digit_year || !format.starts_with("%Y"))
        .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
    {
        return Some(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt.date_naive());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|dt| dt.date())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
