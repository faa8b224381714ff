use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::InvoiceStatus;

/// A single line item on an invoice, as it appears in the canonical payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct InvoiceLine {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub line_number: i32,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

/// An invoice moving through the anchoring pipeline.
///
/// `cid`, `cid_hash`, `immutable_hash`, `batch_id`, and `merkle_proof` are
/// populated as the invoice advances; all are `None` for a freshly uploaded
/// invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub form_number: String,
    pub serial: String,
    pub tenant_org_id: String,
    pub issued_by_user_id: String,
    pub seller_name: String,
    pub seller_tax_id: String,
    pub seller_address: String,
    pub customer_name: String,
    pub customer_tax_id: String,
    pub customer_address: String,
    pub status: InvoiceStatus,
    pub issued_date: DateTime<Utc>,
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub note: Option<String>,
    pub batch_id: Option<Uuid>,
    pub immutable_hash: Option<String>,
    pub cid: Option<String>,
    pub cid_hash: Option<String>,
    pub merkle_proof: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// `immutableHash` plus `cid`, the two facts a caller needs to verify an
    /// invoice without touching the chain client.
    pub fn verification_anchor(&self) -> Option<(&str, &str)> {
        Some((self.immutable_hash.as_deref()?, self.cid.as_deref()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: InvoiceStatus) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            invoice_number: "INV-0001".into(),
            form_number: "01GTKT0/001".into(),
            serial: "AA/24E".into(),
            tenant_org_id: "org-1".into(),
            issued_by_user_id: "user-1".into(),
            seller_name: "Acme Seller Co".into(),
            seller_tax_id: "0101234567".into(),
            seller_address: "1 Market St".into(),
            customer_name: "Bob Customer".into(),
            customer_tax_id: "0109876543".into(),
            customer_address: "2 Elm St".into(),
            status,
            issued_date: now,
            sub_total: Decimal::new(10000, 2),
            tax_amount: Decimal::new(800, 2),
            discount_amount: Decimal::ZERO,
            total_amount: Decimal::new(10800, 2),
            currency: "USD".into(),
            note: None,
            batch_id: None,
            immutable_hash: None,
            cid: None,
            cid_hash: None,
            merkle_proof: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn verification_anchor_requires_both_hash_and_cid() {
        let mut invoice = sample(InvoiceStatus::Uploaded);
        assert!(invoice.verification_anchor().is_none());
        invoice.immutable_hash = Some("deadbeef".into());
        assert!(invoice.verification_anchor().is_none());
        invoice.cid = Some("bafy...".into());
        assert!(invoice.verification_anchor().is_some());
    }
}
