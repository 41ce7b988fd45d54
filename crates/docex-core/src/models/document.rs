//! Canonical extracted document model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Classification of a financial document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Receipt,
    BankStatement,
    /// Anything unrecognized, including a missing classification.
    #[default]
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 4] = [
        DocumentType::Invoice,
        DocumentType::Receipt,
        DocumentType::BankStatement,
        DocumentType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Receipt => "receipt",
            DocumentType::BankStatement => "bank_statement",
            DocumentType::Other => "other",
        }
    }

    /// Lenient parse: case-insensitive, `-` and spaces read as `_`.
    /// Unknown labels become [`DocumentType::Other`].
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        match normalized.as_str() {
            "invoice" => DocumentType::Invoice,
            "receipt" => DocumentType::Receipt,
            "bank_statement" => DocumentType::BankStatement,
            _ => DocumentType::Other,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Product/service description.
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,

    /// Line total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,
}

impl LineItem {
    pub const UNKNOWN_DESCRIPTION: &'static str = "Unknown item";
}

/// Fields produced by normalizing model output, before identity is stamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedFields {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Signed total; negative for refunds and credits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,

    /// Source date string, kept when normalization was ambiguous or failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_raw: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LineItem>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// The finished record of one extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    /// Fresh per extraction, never reused for the same file.
    pub id: Uuid,

    /// Basename of the source path.
    pub filename: String,

    /// Completion timestamp.
    pub extracted_at: DateTime<Utc>,

    #[serde(flatten)]
    pub fields: ValidatedFields,
}

impl ExtractedDocument {
    /// Stamp a new identity and completion time onto validated fields.
    pub fn new(filename: impl Into<String>, fields: ValidatedFields) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            extracted_at: Utc::now(),
            fields,
        }
    }

    pub fn doc_type(&self) -> DocumentType {
        self.fields.doc_type
    }

    /// Short human-readable summary.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.fields.doc_type.to_string()];
        if let Some(vendor) = &self.fields.vendor {
            parts.push(vendor.clone());
        }
        if let Some(amount) = self.fields.amount {
            parts.push(amount.to_string());
        }
        if let Some(date) = self.fields.date {
            parts.push(date.to_string());
        } else if let Some(raw) = &self.fields.date_raw {
            parts.push(format!("date? {}", raw));
        }
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    #[test]
    fn test_type_labels() {
        assert_eq!(DocumentType::from_label("Receipt"), DocumentType::Receipt);
        assert_eq!(
            DocumentType::from_label(" bank statement "),
            DocumentType::BankStatement
        );
        assert_eq!(
            DocumentType::from_label("bank-statement"),
            DocumentType::BankStatement
        );
        assert_eq!(DocumentType::from_label("memo"), DocumentType::Other);
        assert_eq!(DocumentType::from_label(""), DocumentType::Other);
    }

    #[test]
    fn test_serialized_shape() {
        let fields = ValidatedFields {
            doc_type: DocumentType::BankStatement,
            vendor: Some("First Bank".to_string()),
            amount: Some(Decimal::from_str("-12.50").unwrap()),
            date_raw: None,
            ..Default::default()
        };
        let doc = ExtractedDocument::new("statement.pdf", fields);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["type"], "bank_statement");
        assert_eq!(json["filename"], "statement.pdf");
        assert_eq!(json["amount"], "-12.50");
        assert!(json.get("extractedAt").is_some());
        assert!(json.get("dateRaw").is_none());
        assert!(json.get("items").is_none());
    }

    #[test]
    fn test_ids_are_fresh() {
        let a = ExtractedDocument::new("a.pdf", ValidatedFields::default());
        let b = ExtractedDocument::new("a.pdf", ValidatedFields::default());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_document_roundtrips_through_serde() {
        let doc = ExtractedDocument::new(
            "r.png",
            ValidatedFields {
                doc_type: DocumentType::Receipt,
                items: Some(vec![LineItem {
                    description: "Coffee".to_string(),
                    quantity: Some(Decimal::ONE),
                    unit_price: None,
                    total: Some(Decimal::from_str("3.20").unwrap()),
                }]),
                ..Default::default()
            },
        );
        let json = serde_json::to_string(&doc).unwrap();
        let back: ExtractedDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
