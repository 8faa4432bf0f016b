//! Instruction text and response schema sent with every extraction request.
//!
//! Both live here so a prompt tweak never touches the retry or transport
//! code, and so tests can inspect them without a live model.
//!
//! Callers can replace the instruction via
//! [`crate::config::ExtractionConfig::instruction`]; the schema is fixed
//! because it mirrors [`crate::record::BillExtraction`].

use serde_json::{json, Value};

/// Default instruction sent alongside the bill image.
pub const EXTRACTION_INSTRUCTION: &str = r#"You are an automated document processing agent specialized in data extraction.
Analyze the provided image of a service bill. Extract the key metadata into the requested JSON structure.

1. Identify provider, customer, document, financial and billing period / usage fields.
2. Normalize dates to YYYY-MM-DD.
3. Normalize amounts to plain numbers (remove currency symbols and thousands separators).
4. If a field is missing, return null."#;

/// Extra rules for providers without native structured output.
///
/// The placeholder `{schema}` is replaced with the pretty-printed schema.
const JSON_ONLY_SUFFIX: &str = r#"

5. OUTPUT FORMAT
   - Reply with a single JSON object matching this schema exactly:
{schema}
   - Include every key; use null for unknown values
   - Do NOT wrap the JSON in ``` fences
   - Do NOT add commentary or explanations"#;

/// Build the system prompt for a chat provider that cannot enforce a schema.
pub fn json_mode_instruction(instruction: &str) -> String {
    let schema = serde_json::to_string_pretty(&response_schema()).unwrap_or_default();
    format!("{instruction}{}", JSON_ONLY_SUFFIX.replace("{schema}", &schema))
}

fn nullable_string(description: &str) -> Value {
    json!({ "type": "STRING", "nullable": true, "description": description })
}

fn nullable_number(description: &str) -> Value {
    json!({ "type": "NUMBER", "nullable": true, "description": description })
}

fn section(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "OBJECT", "properties": properties, "required": required })
}

/// Response schema for [`crate::record::BillExtraction`].
///
/// Written in the OpenAPI subset Gemini's `responseSchema` accepts
/// (upper-case type names, `nullable`). Leaves are listed in `required` so the
/// model emits explicit nulls instead of dropping keys.
pub fn response_schema() -> Value {
    let provider = section(
        json!({
            "name": nullable_string("Name of the service provider"),
            "contact_info": nullable_string("Phone number or email if prominent"),
        }),
        &["name", "contact_info"],
    );
    let document = section(
        json!({
            "type": nullable_string("Type of document, e.g., Electronic Bill, Invoice"),
            "number": nullable_string("Invoice or Document ID number"),
            "issue_date": nullable_string("Date of issue in YYYY-MM-DD format"),
        }),
        &["type", "number", "issue_date"],
    );
    let customer = section(
        json!({
            "name": nullable_string("Name of the customer"),
            "client_id": nullable_string("Account or Customer Number"),
            "tax_id": nullable_string("RUT/SSN/Tax ID if available"),
            "address": nullable_string("Billing address"),
        }),
        &["name", "client_id", "tax_id", "address"],
    );
    let financials = section(
        json!({
            "total_amount": nullable_number("Total amount to pay as a number"),
            "currency": nullable_string("ISO currency code (e.g., CLP, USD)"),
            "due_date": nullable_string("Payment due date in YYYY-MM-DD format"),
            "status": nullable_string("Payment status inferred from context (Pending, Paid, Overdue)"),
        }),
        &["total_amount", "currency", "due_date", "status"],
    );
    let period = section(
        json!({
            "billing_period_start": nullable_string("Start date of billing period YYYY-MM-DD"),
            "billing_period_end": nullable_string("End date of billing period YYYY-MM-DD"),
            "cutoff_date": nullable_string("Date when service might be cut YYYY-MM-DD"),
            "tariff_type": nullable_string("Rate category or tariff type"),
        }),
        &["billing_period_start", "billing_period_end", "cutoff_date", "tariff_type"],
    );

    section(
        json!({
            "provider": provider,
            "document": document,
            "customer": customer,
            "financials": financials,
            "period_and_usage": period,
        }),
        &["provider", "document", "customer", "financials", "period_and_usage"],
    )
}
