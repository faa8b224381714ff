//! Canonical byte representation of an invoice, and the two SHA-256 hashes
//! derived from it (`immutableHash`, `cidHash`). No I/O, no async — this
//! crate is pure so it can be unit tested in isolation and so the kernel can
//! call it inline inside a claimed transaction without an await point.

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use invoice_anchor_types::{Invoice, InvoiceLine};

const MONEY_SCALE: u32 = 2;
const QUANTITY_SCALE: u32 = 4;
const RATE_SCALE: u32 = 2;
const CANONICAL_VERSION: &str = "1.0";

/// Canonical bytes plus the content hash derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalInvoice {
    pub bytes: Vec<u8>,
    pub immutable_hash: String,
}

impl CanonicalInvoice {
    pub fn as_str(&self) -> &str {
        // canonicalize() only ever emits valid UTF-8 JSON.
        std::str::from_utf8(&self.bytes).expect("canonical bytes are always valid UTF-8")
    }
}

/// Builds the canonical JSON for `invoice` and its `lines`, and hashes it.
///
/// `lines` need not be pre-sorted; they are sorted by `line_number` here so
/// callers (and the database rows they came from) don't have to guarantee
/// ordering themselves.
pub fn canonicalize(invoice: &Invoice, lines: &[InvoiceLine]) -> CanonicalInvoice {
    let mut sorted_lines: Vec<&InvoiceLine> = lines.iter().collect();
    sorted_lines.sort_by_key(|line| line.line_number);

    let mut root = Map::new();
    root.insert("identity".into(), identity_section(invoice));
    root.insert("sellerInfo".into(), seller_section(invoice));
    root.insert("customerInfo".into(), customer_section(invoice));
    root.insert("invoiceDetails".into(), details_section(invoice));
    root.insert(
        "lines".into(),
        Value::Array(sorted_lines.iter().map(|l| line_section(l)).collect()),
    );
    root.insert("metadata".into(), metadata_section(invoice));

    let mut bytes = Vec::new();
    serde_json::to_writer(&mut bytes, &Value::Object(root))
        .expect("canonical value tree always serializes");

    let immutable_hash = hex::encode(Sha256::digest(&bytes));

    CanonicalInvoice {
        bytes,
        immutable_hash,
    }
}

/// `cidHash = SHA-256(cid)`, lowercase hex, no prefix. Computed after the
/// IPFS pin returns, separately from `canonicalize`, since the CID doesn't
/// exist yet at canonicalization time.
pub fn hash_cid(cid: &str) -> String {
    hex::encode(Sha256::digest(cid.as_bytes()))
}

fn identity_section(invoice: &Invoice) -> Value {
    let mut m = Map::new();
    m.insert("id".into(), Value::String(invoice.id.to_string()));
    m.insert(
        "invoiceNumber".into(),
        Value::String(invoice.invoice_number.clone()),
    );
    m.insert(
        "formNumber".into(),
        Value::String(invoice.form_number.clone()),
    );
    m.insert("serial".into(), Value::String(invoice.serial.clone()));
    m.insert(
        "tenantOrgId".into(),
        Value::String(invoice.tenant_org_id.clone()),
    );
    m.insert(
        "issuedByUserId".into(),
        Value::String(invoice.issued_by_user_id.clone()),
    );
    Value::Object(m)
}

fn seller_section(invoice: &Invoice) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), Value::String(invoice.seller_name.clone()));
    m.insert(
        "taxId".into(),
        Value::String(invoice.seller_tax_id.clone()),
    );
    m.insert(
        "address".into(),
        Value::String(invoice.seller_address.clone()),
    );
    Value::Object(m)
}

fn customer_section(invoice: &Invoice) -> Value {
    let mut m = Map::new();
    m.insert("name".into(), Value::String(invoice.customer_name.clone()));
    m.insert(
        "taxId".into(),
        Value::String(invoice.customer_tax_id.clone()),
    );
    m.insert(
        "address".into(),
        Value::String(invoice.customer_address.clone()),
    );
    Value::Object(m)
}

fn details_section(invoice: &Invoice) -> Value {
    let mut m = Map::new();
    m.insert(
        "issuedDate".into(),
        Value::String(format_timestamp(invoice.issued_date)),
    );
    m.insert("currency".into(), Value::String(invoice.currency.clone()));
    m.insert(
        "subTotal".into(),
        Value::String(render_decimal(invoice.sub_total, MONEY_SCALE)),
    );
    m.insert(
        "taxAmount".into(),
        Value::String(render_decimal(invoice.tax_amount, MONEY_SCALE)),
    );
    m.insert(
        "discountAmount".into(),
        Value::String(render_decimal(invoice.discount_amount, MONEY_SCALE)),
    );
    m.insert(
        "totalAmount".into(),
        Value::String(render_decimal(invoice.total_amount, MONEY_SCALE)),
    );
    m.insert(
        "note".into(),
        match &invoice.note {
            Some(note) => Value::String(note.clone()),
            None => Value::Null,
        },
    );
    Value::Object(m)
}

fn line_section(line: &InvoiceLine) -> Value {
    let mut m = Map::new();
    m.insert("lineNumber".into(), Value::from(line.line_number));
    m.insert(
        "description".into(),
        Value::String(line.description.clone()),
    );
    m.insert("unit".into(), Value::String(line.unit.clone()));
    m.insert(
        "quantity".into(),
        Value::String(render_decimal(line.quantity, QUANTITY_SCALE)),
    );
    m.insert(
        "unitPrice".into(),
        Value::String(render_decimal(line.unit_price, MONEY_SCALE)),
    );
    m.insert(
        "discount".into(),
        Value::String(render_decimal(line.discount, MONEY_SCALE)),
    );
    m.insert(
        "taxRate".into(),
        Value::String(render_decimal(line.tax_rate, RATE_SCALE)),
    );
    m.insert(
        "taxAmount".into(),
        Value::String(render_decimal(line.tax_amount, MONEY_SCALE)),
    );
    m.insert(
        "lineTotal".into(),
        Value::String(render_decimal(line.line_total, MONEY_SCALE)),
    );
    Value::Object(m)
}

fn metadata_section(invoice: &Invoice) -> Value {
    let mut m = Map::new();
    m.insert(
        "createdAt".into(),
        Value::String(format_timestamp(invoice.created_at)),
    );
    m.insert("version".into(), Value::String(CANONICAL_VERSION.into()));
    Value::Object(m)
}

fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

fn render_decimal(value: Decimal, scale: u32) -> String {
    value.round_dp(scale).to_string()
}
