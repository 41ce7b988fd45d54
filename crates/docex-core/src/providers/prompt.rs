//! Prompt text sent to the models.

/// JSON-only instruction for the cloud model, which reads the document itself.
pub const CLOUD_INSTRUCTION: &str = "\
Extract the following fields from this financial document and respond with \
JSON only, no prose and no markdown:
{
  \"type\": \"invoice\" | \"receipt\" | \"bank_statement\" | \"other\",
  \"vendor\": string | null,
  \"amount\": number | null,
  \"date\": \"YYYY-MM-DD\" | null,
  \"items\": [{\"description\": string, \"quantity\": number | null, \"unit_price\": number | null, \"total\": number | null}] | null
}
Use a negative amount for refunds, credits and negative balances.";

/// System prompt for the local model: schema plus per-type extraction rules.
pub const SYSTEM_PROMPT: &str = "\
You extract structured data from financial documents. Reply with a single JSON \
object and nothing else.

Schema:
{
  \"type\": one of \"invoice\", \"receipt\", \"bank_statement\", \"other\",
  \"vendor\": the business that issued the document, or null,
  \"amount\": the document total as a number, or null,
  \"date\": the document date as YYYY-MM-DD, or null,
  \"items\": array of {\"description\": string, \"quantity\": number, \"unit_price\": number, \"total\": number}, or null
}

Rules by document type:
- receipt: amount is subtotal plus tax. Ignore payment lines such as \"Cash\", \
\"Credit\", \"Debit\", \"Change\" and \"Tendered\"; they are not the total.
- invoice: prefer \"Amount Due\" or \"Total Due\" over subtotals and previous balances.
- bank_statement: amount is the ending balance. Keep its sign; overdrawn balances are negative.
- other: fill what is present and use null for the rest.

Numbers must be plain JSON numbers without currency symbols or thousands separators.";

/// User prompt for the local model.
///
/// Includes the OCR text when there is any; otherwise asks the model to read
/// the attached image directly.
pub fn user_prompt(ocr_text: &str) -> String {
    let ocr_text = ocr_text.trim();
    if ocr_text.is_empty() {
        "No OCR text is available. Extract the data from the attached image directly.".to_string()
    } else {
        format!(
            "Text recognized from the document by OCR (page markers like \
             \"--- Page 1 ---\" separate pages):\n\n{}\n\n\
             Use the OCR text and the attached image of the first page to \
             extract the data.",
            ocr_text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_includes_ocr_text() {
        let prompt = user_prompt("--- Page 1 ---\nACME\nTOTAL 22.40");
        assert!(prompt.contains("TOTAL 22.40"));
        assert!(!prompt.contains("No OCR text"));
    }

    #[test]
    fn test_user_prompt_without_ocr_reads_image() {
        assert!(user_prompt("  \n ").contains("from the attached image directly"));
    }

    #[test]
    fn test_system_prompt_carries_type_rules() {
        for needle in ["Amount Due", "\"Cash\"", "ending balance", "bank_statement"] {
            assert!(SYSTEM_PROMPT.contains(needle), "missing {}", needle);
        }
    }
}
