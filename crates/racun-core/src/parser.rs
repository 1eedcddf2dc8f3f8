//! Fiscal content parser.
//!
//! The verification page behind the QR code is an undocumented HTML dump.
//! Four independent extraction rules pull out the invoice number, the access
//! token, the receipt timestamp and the seller metadata block; each rule
//! reports its own field name on failure so "token missing" is
//! distinguishable from "timestamp missing" in diagnostics.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::AppError;
use crate::models::SellerInfo;

static INVOICE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"viewModel\.InvoiceNumber\('([^']+)'\)").unwrap());

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"viewModel\.Token\('([^']+)'\)").unwrap());

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span id="sdcDateTimeLabel">\s*([\d\.]+ \d{2}:\d{2}:\d{2})\s*</span>"#).unwrap()
});

// The seller block sits between two fixed journal markers; lines inside it
// carry no labels, only position.
static META_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)============ ФИСКАЛНИ РАЧУН ============\r\n(.*?)\r\n-------------ПРОМЕТ ПРОДАЈА-------------",
    )
    .unwrap()
});

/// Page format of the receipt timestamp, e.g. `14.02.2025. 18:35:02`.
const DATETIME_FORMAT: &str = "%d.%m.%Y. %H:%M:%S";

/// Structured fields extracted from one verification page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerification {
    pub invoice_number: String,
    pub token: String,
    pub dt: DateTime<Utc>,
    pub seller: SellerInfo,
}

fn extract(re: &Regex, content: &str, field: &'static str) -> Result<String, AppError> {
    re.captures(content)
        .map(|c| c[1].to_string())
        .ok_or(AppError::MissingField(field))
}

/// Parse one verification page into its structured fields.
///
/// Fails with `MissingField(...)` naming the first rule that did not match;
/// a matched-but-unparseable timestamp also fails the whole parse rather
/// than defaulting.
pub fn parse_verification_page(content: &str) -> Result<ParsedVerification, AppError> {
    let invoice_number = extract(&INVOICE_NUMBER_RE, content, "invoice_id")?;
    let token = extract(&TOKEN_RE, content, "token")?;

    let raw_dt = extract(&DATETIME_RE, content, "timestamp")?;
    let dt = NaiveDateTime::parse_from_str(&raw_dt, DATETIME_FORMAT)
        .map_err(|_| AppError::MissingField("timestamp"))?
        .and_utc();

    let meta_block = extract(&META_BLOCK_RE, content, "meta")?;
    let meta_lines: Vec<String> = meta_block
        .split("\r\n")
        .map(|line| line.trim().to_string())
        .collect();
    let seller = SellerInfo::from_meta_lines(&meta_lines)?;

    Ok(ParsedVerification {
        invoice_number,
        token,
        dt,
        seller,
    })
}
