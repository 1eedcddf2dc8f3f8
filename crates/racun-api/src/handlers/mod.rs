pub mod analytics;
pub mod health;
pub mod images;
pub mod pipeline;
pub mod receipts;
