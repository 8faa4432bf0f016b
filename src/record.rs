//! The extraction record: everything we pull off a utility bill.
//!
//! Every leaf is an `Option` and always serialises, so a missing value shows
//! up as an explicit `null` rather than a missing key. Deserialisation
//! accepts a missing leaf key as `null` (models occasionally drop them) but
//! a missing section or a wrongly typed value is a schema violation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Top-level record returned by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillExtraction {
    pub provider: Provider,
    pub document: DocumentInfo,
    pub customer: Customer,
    pub financials: Financials,
    pub period_and_usage: PeriodAndUsage,
}

/// Issuer of the bill.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    #[serde(default)]
    pub name: Option<String>,
    /// Phone number or email if prominent.
    #[serde(default)]
    pub contact_info: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// e.g. "Electronic Bill", "Invoice".
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub issue_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub name: Option<String>,
    /// Account or customer number.
    #[serde(default)]
    pub client_id: Option<String>,
    /// RUT / SSN / VAT number.
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    #[serde(default)]
    pub total_amount: Option<f64>,
    /// ISO 4217 code.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    /// Open set; Pending, Paid and Overdue are the common ones.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodAndUsage {
    #[serde(default)]
    pub billing_period_start: Option<String>,
    #[serde(default)]
    pub billing_period_end: Option<String>,
    /// Date after which service may be cut.
    #[serde(default)]
    pub cutoff_date: Option<String>,
    #[serde(default)]
    pub tariff_type: Option<String>,
}

/// A present value that does not follow the normalisation rules.
///
/// Warnings never modify the record; they exist so callers can flag
/// suspicious extractions for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldWarning {
    /// Dotted path, e.g. `financials.due_date`.
    pub field: String,
    pub value: String,
    pub reason: String,
}

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").unwrap());

static ISO_CURRENCY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{3}$").unwrap());

impl BillExtraction {
    /// A record with every field `null`.
    pub fn empty() -> Self {
        Self {
            provider: Provider::default(),
            document: DocumentInfo::default(),
            customer: Customer::default(),
            financials: Financials::default(),
            period_and_usage: PeriodAndUsage::default(),
        }
    }

    /// Convert into the plain key-value document handed downstream.
    pub fn to_value(&self) -> serde_json::Value {
        // Leaves are strings or f64 (non-finite maps to null), so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Number of leaf fields holding a value.
    pub fn populated_fields(&self) -> usize {
        let strings = [
            &self.provider.name,
            &self.provider.contact_info,
            &self.document.doc_type,
            &self.document.number,
            &self.document.issue_date,
            &self.customer.name,
            &self.customer.client_id,
            &self.customer.tax_id,
            &self.customer.address,
            &self.financials.currency,
            &self.financials.due_date,
            &self.financials.status,
            &self.period_and_usage.billing_period_start,
            &self.period_and_usage.billing_period_end,
            &self.period_and_usage.cutoff_date,
            &self.period_and_usage.tariff_type,
        ];
        strings.iter().filter(|v| v.is_some()).count()
            + usize::from(self.financials.total_amount.is_some())
    }

    /// Check present values against the date, currency and amount rules.
    pub fn validate(&self) -> Vec<FieldWarning> {
        let mut warnings = Vec::new();

        let dates = [
            ("document.issue_date", &self.document.issue_date),
            ("financials.due_date", &self.financials.due_date),
            (
                "period_and_usage.billing_period_start",
                &self.period_and_usage.billing_period_start,
            ),
            (
                "period_and_usage.billing_period_end",
                &self.period_and_usage.billing_period_end,
            ),
            ("period_and_usage.cutoff_date", &self.period_and_usage.cutoff_date),
        ];
        for (field, value) in dates {
            if let Some(v) = value {
                if !ISO_DATE.is_match(v) {
                    warnings.push(FieldWarning {
                        field: field.to_string(),
                        value: v.clone(),
                        reason: "date is not YYYY-MM-DD".to_string(),
                    });
                }
            }
        }

        if let Some(ref c) = self.financials.currency {
            if !ISO_CURRENCY.is_match(c) {
                warnings.push(FieldWarning {
                    field: "financials.currency".to_string(),
                    value: c.clone(),
                    reason: "currency is not a 3-letter ISO code".to_string(),
                });
            }
        }

        if let Some(amount) = self.financials.total_amount {
            if !amount.is_finite() || amount < 0.0 {
                warnings.push(FieldWarning {
                    field: "financials.total_amount".to_string(),
                    value: amount.to_string(),
                    reason: "amount must be a finite, non-negative number".to_string(),
                });
            }
        }

        if let (Some(start), Some(end)) = (
            &self.period_and_usage.billing_period_start,
            &self.period_and_usage.billing_period_end,
        ) {
            // ISO dates order lexicographically.
            if ISO_DATE.is_match(start) && ISO_DATE.is_match(end) && start > end {
                warnings.push(FieldWarning {
                    field: "period_and_usage.billing_period_end".to_string(),
                    value: end.clone(),
                    reason: format!("billing period ends before it starts ({start})"),
                });
            }
        }

        warnings
    }
}

impl Default for BillExtraction {
    fn default() -> Self {
        Self::empty()
    }
}
