pub mod image;
pub mod receipt;

pub use image::StoredImage;
pub use receipt::{LineItem, NewReceipt, Receipt, SellerInfo, VerificationUrl, DEFAULT_CATEGORY};
