pub mod image;
pub mod receipt;
