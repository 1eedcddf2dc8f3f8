use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Category assigned to a receipt when the user has not picked one yet.
pub const DEFAULT_CATEGORY: &str = "Other";

/// A validated government verification URL extracted from a receipt QR code.
///
/// Construction is the only place host validation happens; once a value of
/// this type exists, the URL is known to point at the configured fiscal
/// service host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationUrl(Url);

impl VerificationUrl {
    /// Parse and validate a decoded QR payload against the expected host.
    pub fn parse(raw: &str, expected_host: &str) -> Result<Self, AppError> {
        let url = Url::parse(raw)
            .map_err(|_| AppError::InvalidVerificationUrl(format!("not a URL: {raw}")))?;
        match url.host_str() {
            Some(host) if host == expected_host => Ok(Self(url)),
            Some(host) => Err(AppError::InvalidVerificationUrl(format!(
                "host '{host}' is not '{expected_host}'"
            ))),
            None => Err(AppError::InvalidVerificationUrl(format!(
                "URL has no host: {raw}"
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for VerificationUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Seller block parsed from the fixed-order metadata section of the
/// verification page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SellerInfo {
    /// Tax registration number
    pub number: String,
    pub company: String,
    pub store: String,
    pub address: String,
    pub district: String,
    pub cashier: String,
    /// Fiscal device (ESIR) identifier
    pub esir: String,
}

impl SellerInfo {
    /// Number of positional lines the seller block must carry.
    pub const FIELD_COUNT: usize = 7;

    /// Map the trimmed metadata lines onto the seller fields, in order.
    ///
    /// The upstream page gives no field labels, only line position. A block
    /// shorter than [`Self::FIELD_COUNT`] lines means the page layout changed
    /// and the mapping would be garbage, so it is a hard parse failure.
    pub fn from_meta_lines(lines: &[String]) -> Result<Self, AppError> {
        if lines.len() < Self::FIELD_COUNT {
            return Err(AppError::MissingField("meta"));
        }
        Ok(Self {
            number: lines[0].clone(),
            company: lines[1].clone(),
            store: lines[2].clone(),
            address: lines[3].clone(),
            district: lines[4].clone(),
            cashier: lines[5].clone(),
            esir: lines[6].clone(),
        })
    }
}

/// One purchased product/service entry, as returned by the specifications
/// endpoint. Field names follow the upstream JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub gtin: String,
    pub name: String,
    pub quantity: f64,
    pub total: f64,
    pub unit_price: f64,
    pub label: String,
    pub label_rate: f64,
    pub tax_base_amount: f64,
    pub vat_amount: f64,
}

/// The deduplicated, per-user record of one physical fiscal receipt.
///
/// Uniqueness on `(qr_url, user_name)`, `(image_name, user_name)` and
/// `(image_name, user_name, qr_url)` is enforced by the storage layer; only
/// `category` is mutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Receipt {
    pub id: Uuid,
    /// Content hash of the image that produced this record
    pub image_name: String,
    pub user_name: String,
    pub qr_url: String,
    /// Receipt timestamp parsed from the verification page
    pub dt: DateTime<Utc>,
    pub seller: SellerInfo,
    pub items: Vec<LineItem>,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Input shape for a receipt upsert; the store assigns `id`/`created_at`.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub image_name: String,
    pub user_name: String,
    pub qr_url: String,
    pub dt: DateTime<Utc>,
    pub seller: SellerInfo,
    pub items: Vec<LineItem>,
    pub category: String,
}

impl NewReceipt {
    /// Re-key an existing record under another user, keeping the resolved
    /// content. This is the cross-user clone used when somebody else already
    /// paid the network/parse cost for the same physical receipt.
    pub fn clone_for_user(source: &Receipt, user_name: &str, image_name: &str) -> Self {
        Self {
            image_name: image_name.to_string(),
            user_name: user_name.to_string(),
            qr_url: source.qr_url.clone(),
            dt: source.dt,
            seller: source.seller.clone(),
            items: source.items.clone(),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "suf.purs.gov.rs";

    #[test]
    fn verification_url_accepts_expected_host() {
        let url = VerificationUrl::parse("https://suf.purs.gov.rs/v/?vl=Azla", HOST).unwrap();
        assert_eq!(url.as_str(), "https://suf.purs.gov.rs/v/?vl=Azla");
    }

    #[test]
    fn verification_url_rejects_foreign_host() {
        let err = VerificationUrl::parse("https://not-suf.example/x", HOST).unwrap_err();
        assert!(matches!(err, AppError::InvalidVerificationUrl(_)));
    }

    #[test]
    fn verification_url_rejects_garbage() {
        let err = VerificationUrl::parse("not a url at all", HOST).unwrap_err();
        assert!(matches!(err, AppError::InvalidVerificationUrl(_)));
    }

    #[test]
    fn seller_info_maps_lines_positionally() {
        let lines: Vec<String> = [
            "123456789",
            "Company d.o.o.",
            "Store 42",
            "Main street 1",
            "Beograd",
            "Cashier 3",
            "ESIR-1/2.0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let seller = SellerInfo::from_meta_lines(&lines).unwrap();
        assert_eq!(seller.number, "123456789");
        assert_eq!(seller.company, "Company d.o.o.");
        assert_eq!(seller.esir, "ESIR-1/2.0");
    }

    #[test]
    fn seller_info_fails_on_short_block() {
        let lines: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let err = SellerInfo::from_meta_lines(&lines).unwrap_err();
        assert!(matches!(err, AppError::MissingField("meta")));
    }
}
