//! SUF fiscal service client.
//!
//! Two sequential calls per full resolution: `GET` the verification page the
//! QR code points at, then `POST` the extracted `{invoiceNumber, token}` pair
//! to the specifications endpoint for the structured line items.

use std::time::Duration;

use async_trait::async_trait;
use racun_core::models::{LineItem, VerificationUrl};
use racun_core::{AppError, FetchCallSite};
use serde::Deserialize;

#[async_trait]
pub trait FiscalGateway: Send + Sync {
    /// `GET` the verification page; returns the raw text body.
    async fn fetch_verification_page(&self, url: &VerificationUrl) -> Result<String, AppError>;

    /// `POST` the extracted identifiers; returns the ordered line items.
    ///
    /// The upstream reports `success=false` for receipts without items; that
    /// is an empty list, not an error.
    async fn fetch_specifications(
        &self,
        invoice_number: &str,
        token: &str,
    ) -> Result<Vec<LineItem>, AppError>;
}

/// Wire shape of the specifications endpoint response.
#[derive(Debug, Deserialize)]
struct SpecificationsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    items: Vec<LineItem>,
}

fn parse_specifications(body: &str) -> Result<Vec<LineItem>, AppError> {
    let response: SpecificationsResponse = serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, "specifications response did not match expected shape");
        AppError::ExternalFetch {
            status: None,
            call_site: FetchCallSite::Specifications,
        }
    })?;

    if response.success {
        Ok(response.items)
    } else {
        Ok(Vec::new())
    }
}

pub struct SufClient {
    http: reqwest::Client,
    specifications_url: String,
}

impl SufClient {
    pub fn new(timeout: Duration, specifications_url: String) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            specifications_url,
        })
    }

    fn fetch_error(err: reqwest::Error, call_site: FetchCallSite) -> AppError {
        // Timeouts and transport failures carry no upstream status.
        AppError::ExternalFetch {
            status: err.status().map(|s| s.as_u16()),
            call_site,
        }
    }
}

#[async_trait]
impl FiscalGateway for SufClient {
    #[tracing::instrument(skip(self), fields(url = %url))]
    async fn fetch_verification_page(&self, url: &VerificationUrl) -> Result<String, AppError> {
        let response = self
            .http
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| Self::fetch_error(e, FetchCallSite::VerificationPage))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalFetch {
                status: Some(status.as_u16()),
                call_site: FetchCallSite::VerificationPage,
            });
        }

        response
            .text()
            .await
            .map_err(|e| Self::fetch_error(e, FetchCallSite::VerificationPage))
    }

    #[tracing::instrument(skip(self, token))]
    async fn fetch_specifications(
        &self,
        invoice_number: &str,
        token: &str,
    ) -> Result<Vec<LineItem>, AppError> {
        let response = self
            .http
            .post(&self.specifications_url)
            .form(&[("invoiceNumber", invoice_number), ("token", token)])
            .send()
            .await
            .map_err(|e| Self::fetch_error(e, FetchCallSite::Specifications))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ExternalFetch {
                status: Some(status.as_u16()),
                call_site: FetchCallSite::Specifications,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| Self::fetch_error(e, FetchCallSite::Specifications))?;

        parse_specifications(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_specifications() {
        let body = r#"{
            "success": true,
            "items": [
                {
                    "gtin": "8600000000001",
                    "name": "Mleko 2.8%",
                    "quantity": 2.0,
                    "total": 259.98,
                    "unitPrice": 129.99,
                    "label": "Ђ",
                    "labelRate": 20.0,
                    "taxBaseAmount": 216.65,
                    "vatAmount": 43.33
                }
            ]
        }"#;

        let items = parse_specifications(body).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Mleko 2.8%");
        assert_eq!(items[0].unit_price, 129.99);
        assert_eq!(items[0].vat_amount, 43.33);
    }

    #[test]
    fn unsuccessful_response_yields_empty_items() {
        // The upstream is ambiguous about "no items yet" vs "error";
        // a zero-item receipt is storable either way.
        let body = r#"{"success": false, "items": []}"#;
        let items = parse_specifications(body).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn unsuccessful_response_drops_any_items() {
        let body = r#"{"success": false, "items": [{
            "gtin": "1", "name": "x", "quantity": 1.0, "total": 1.0,
            "unitPrice": 1.0, "label": "A", "labelRate": 0.0,
            "taxBaseAmount": 1.0, "vatAmount": 0.0
        }]}"#;
        let items = parse_specifications(body).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn malformed_body_is_an_external_fetch_error() {
        let err = parse_specifications("<html>maintenance</html>").unwrap_err();
        assert!(matches!(
            err,
            AppError::ExternalFetch {
                call_site: FetchCallSite::Specifications,
                ..
            }
        ));
    }
}
