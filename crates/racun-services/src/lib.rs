//! External capabilities of the receipt pipeline: QR payload decoding and
//! the SUF fiscal service client. Both are trait boundaries so the
//! orchestrator can be tested without vision code or network access.

pub mod qr;
pub mod suf;

pub use qr::{QrDecoder, RqrrQrDecoder};
pub use suf::{FiscalGateway, SufClient};
