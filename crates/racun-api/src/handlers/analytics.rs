use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::HttpAppError;
use crate::state::AppState;
use racun_core::models::Receipt;

fn default_user() -> String {
    "unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default = "default_user")]
    pub user_name: String,
    pub from_dt: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NameTotal {
    pub name: String,
    pub total: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalyticsResponse {
    pub total: f64,
    pub companies: Vec<NameTotal>,
    pub items: Vec<NameTotal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ByCategoriesResponse {
    pub total: f64,
    pub categories: Vec<CategoryTotal>,
}

fn summarize(receipts: &[Receipt]) -> AnalyticsResponse {
    let mut total_by_company: HashMap<String, f64> = HashMap::new();
    let mut total_by_item: HashMap<String, f64> = HashMap::new();
    let mut grand_total = 0.0;

    for receipt in receipts {
        let mut receipt_total = 0.0;
        for item in &receipt.items {
            receipt_total += item.total;
            *total_by_item.entry(item.name.clone()).or_default() += item.total;
        }
        grand_total += receipt_total;
        *total_by_company
            .entry(receipt.seller.company.clone())
            .or_default() += receipt_total;
    }

    AnalyticsResponse {
        total: grand_total,
        companies: total_by_company
            .into_iter()
            .map(|(name, total)| NameTotal { name, total })
            .collect(),
        items: total_by_item
            .into_iter()
            .map(|(name, total)| NameTotal { name, total })
            .collect(),
    }
}

fn summarize_by_categories(receipts: &[Receipt]) -> ByCategoriesResponse {
    let mut total_by_category: HashMap<String, f64> = HashMap::new();
    let mut grand_total = 0.0;

    for receipt in receipts {
        let receipt_total: f64 = receipt.items.iter().map(|i| i.total).sum();
        *total_by_category
            .entry(receipt.category.clone())
            .or_default() += receipt_total;
        grand_total += receipt_total;
    }

    let mut categories: Vec<CategoryTotal> = total_by_category
        .into_iter()
        .map(|(category, total)| CategoryTotal { category, total })
        .collect();
    categories.sort_by(|a, b| b.total.total_cmp(&a.total));

    ByCategoriesResponse {
        total: grand_total,
        categories,
    }
}

/// Spending totals by company and by item for a user's receipts.
#[utoipa::path(
    get,
    path = "/api/v0/analytics",
    tag = "analytics",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')"),
        ("from_dt" = Option<String>, Query, description = "Only receipts at or after this RFC 3339 timestamp")
    ),
    responses(
        (status = 200, description = "Aggregated totals", body = AnalyticsResponse)
    )
)]
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsResponse>, HttpAppError> {
    let receipts = state
        .receipts
        .list(&query.user_name, query.from_dt, false)
        .await?;
    Ok(Json(summarize(&receipts)))
}

/// Spending totals per category, largest first.
#[utoipa::path(
    get,
    path = "/api/v0/analytics/by-categories",
    tag = "analytics",
    params(
        ("user_name" = Option<String>, Query, description = "Owning user (defaults to 'unknown')"),
        ("from_dt" = Option<String>, Query, description = "Only receipts at or after this RFC 3339 timestamp")
    ),
    responses(
        (status = 200, description = "Totals per category", body = ByCategoriesResponse)
    )
)]
pub async fn get_analytics_by_categories(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<ByCategoriesResponse>, HttpAppError> {
    let receipts = state
        .receipts
        .list(&query.user_name, query.from_dt, false)
        .await?;
    Ok(Json(summarize_by_categories(&receipts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use racun_core::models::{LineItem, SellerInfo};
    use uuid::Uuid;

    fn item(name: &str, total: f64) -> LineItem {
        LineItem {
            gtin: "1".into(),
            name: name.into(),
            quantity: 1.0,
            total,
            unit_price: total,
            label: "Ђ".into(),
            label_rate: 20.0,
            tax_base_amount: total / 1.2,
            vat_amount: total - total / 1.2,
        }
    }

    fn receipt(company: &str, category: &str, items: Vec<LineItem>) -> Receipt {
        Receipt {
            id: Uuid::new_v4(),
            image_name: "img".into(),
            user_name: "ana".into(),
            qr_url: "https://suf.purs.gov.rs/v/?vl=x".into(),
            dt: Utc::now(),
            seller: SellerInfo {
                number: "1".into(),
                company: company.into(),
                store: "s".into(),
                address: "a".into(),
                district: "d".into(),
                cashier: "c".into(),
                esir: "e".into(),
            },
            items,
            category: category.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn totals_roll_up_by_company_and_item() {
        let receipts = vec![
            receipt("Maxi", "Food", vec![item("Mleko", 100.0), item("Hleb", 50.0)]),
            receipt("Maxi", "Food", vec![item("Mleko", 100.0)]),
            receipt("Apoteka", "Health", vec![item("Lek", 300.0)]),
        ];

        let summary = summarize(&receipts);
        assert_eq!(summary.total, 550.0);

        let maxi = summary.companies.iter().find(|c| c.name == "Maxi").unwrap();
        assert_eq!(maxi.total, 250.0);
        let mleko = summary.items.iter().find(|i| i.name == "Mleko").unwrap();
        assert_eq!(mleko.total, 200.0);
    }

    #[test]
    fn categories_sorted_descending_by_total() {
        let receipts = vec![
            receipt("Maxi", "Food", vec![item("Hleb", 50.0)]),
            receipt("Apoteka", "Health", vec![item("Lek", 300.0)]),
        ];

        let summary = summarize_by_categories(&receipts);
        assert_eq!(summary.total, 350.0);
        assert_eq!(summary.categories[0].category, "Health");
        assert_eq!(summary.categories[1].category, "Food");
    }

    #[test]
    fn empty_receipts_yield_zero_totals() {
        let summary = summarize(&[]);
        assert_eq!(summary.total, 0.0);
        assert!(summary.companies.is_empty());
        assert!(summary.items.is_empty());
    }
}
