//! Payment ledger and payment-method catalog.

mod commands;
mod service;

pub use commands::{RecordPayment, UpdatePayment};
pub use service::{PaymentService, PaymentStatus};
