//! Domain types shared by every crate in the anchoring pipeline: statuses,
//! invoices, lines, and batches. No business logic lives here — just the
//! shapes everyone else agrees on.

mod batch;
mod invoice;
mod status;

pub use batch::InvoiceBatch;
pub use invoice::{Invoice, InvoiceLine};
pub use status::{BatchStatus, InvalidStatusCode, InvoiceStatus};
