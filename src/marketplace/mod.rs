use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::marketplace_items;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = marketplace_items)]
pub struct MarketplaceItem {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub category: String,
    pub product_type: String,
    pub price: BigDecimal,
    pub currency: String,
    pub payment_type: String,
    pub featured: bool,
    pub image_url: Option<String>,
    pub demo_url: Option<String>,
    pub download_url: Option<String>,
    pub technologies: serde_json::Value,
    pub features: serde_json::Value,
    pub included_items: serde_json::Value,
    pub version: String,
    pub status: String,
    pub licenses: i32,
    pub download_limit: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub product_type: Option<String>,
    pub payment_type: Option<String>,
    pub featured: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub product_type: String,
    pub price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub payment_type: Option<String>,
    pub featured: Option<bool>,
    pub image_url: Option<String>,
    pub demo_url: Option<String>,
    pub download_url: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub features: Option<Vec<String>>,
    pub included_items: Option<Vec<String>>,
    pub version: Option<String>,
    pub status: Option<String>,
    pub licenses: Option<i32>,
    pub download_limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub product_type: Option<String>,
    pub price: Option<BigDecimal>,
    pub currency: Option<String>,
    pub payment_type: Option<String>,
    pub featured: Option<bool>,
    pub image_url: Option<String>,
    pub demo_url: Option<String>,
    pub download_url: Option<String>,
    pub technologies: Option<Vec<String>>,
    pub features: Option<Vec<String>>,
    pub included_items: Option<Vec<String>>,
    pub version: Option<String>,
    pub status: Option<String>,
    pub licenses: Option<i32>,
    pub download_limit: Option<i32>,
}

/// "all" is the storefront's no-filter sentinel.
fn filter_value(value: Option<String>) -> Option<String> {
    value.filter(|v| v != "all" && !v.is_empty())
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<MarketplaceItem>> {
    let mut conn = state.conn.get()?;

    let mut q = marketplace_items::table.into_boxed();

    if let Some(category) = filter_value(query.category) {
        q = q.filter(marketplace_items::category.eq(category));
    }
    if let Some(product_type) = filter_value(query.product_type) {
        q = q.filter(marketplace_items::product_type.eq(product_type));
    }
    if let Some(payment_type) = filter_value(query.payment_type) {
        q = q.filter(marketplace_items::payment_type.eq(payment_type));
    }
    if query.featured.unwrap_or(false) {
        q = q.filter(marketplace_items::featured.eq(true));
    }
    if let Some(search) = query.search {
        let pattern = format!("%{search}%");
        q = q.filter(
            marketplace_items::name
                .ilike(pattern.clone())
                .or(marketplace_items::description.ilike(pattern)),
        );
    }

    let items: Vec<MarketplaceItem> = q
        .order(marketplace_items::created_at.desc())
        .load(&mut conn)?;
    Ok(ApiOk(items))
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateItemRequest>,
) -> ApiResult<MarketplaceItem> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("item name must not be empty".into()));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let item = MarketplaceItem {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        category: req.category,
        product_type: req.product_type,
        price: req.price.unwrap_or_else(|| BigDecimal::from(0)),
        currency: req.currency.unwrap_or_else(|| "EUR".to_string()),
        payment_type: req.payment_type.unwrap_or_else(|| "one_time".to_string()),
        featured: req.featured.unwrap_or(false),
        image_url: req.image_url,
        demo_url: req.demo_url,
        download_url: req.download_url,
        technologies: serde_json::json!(req.technologies.unwrap_or_default()),
        features: serde_json::json!(req.features.unwrap_or_default()),
        included_items: serde_json::json!(req.included_items.unwrap_or_default()),
        version: req.version.unwrap_or_else(|| "1.0.0".to_string()),
        status: req.status.unwrap_or_else(|| "active".to_string()),
        licenses: req.licenses.unwrap_or(1),
        download_limit: req.download_limit.unwrap_or(0),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(marketplace_items::table)
        .values(&item)
        .execute(&mut conn)?;
    Ok(ApiOk(item))
}

pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<MarketplaceItem> {
    let mut conn = state.conn.get()?;
    let item: MarketplaceItem = marketplace_items::table
        .filter(marketplace_items::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("marketplace item"))?;
    Ok(ApiOk(item))
}

pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<MarketplaceItem> {
    let mut conn = state.conn.get()?;

    let mut item: MarketplaceItem = marketplace_items::table
        .filter(marketplace_items::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("marketplace item"))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("item name must not be empty".into()));
        }
        item.name = name;
    }
    if let Some(description) = req.description {
        item.description = description;
    }
    if let Some(category) = req.category {
        item.category = category;
    }
    if let Some(product_type) = req.product_type {
        item.product_type = product_type;
    }
    if let Some(price) = req.price {
        item.price = price;
    }
    if let Some(currency) = req.currency {
        item.currency = currency;
    }
    if let Some(payment_type) = req.payment_type {
        item.payment_type = payment_type;
    }
    if let Some(featured) = req.featured {
        item.featured = featured;
    }
    if let Some(image_url) = req.image_url {
        item.image_url = Some(image_url);
    }
    if let Some(demo_url) = req.demo_url {
        item.demo_url = Some(demo_url);
    }
    if let Some(download_url) = req.download_url {
        item.download_url = Some(download_url);
    }
    if let Some(technologies) = req.technologies {
        item.technologies = serde_json::json!(technologies);
    }
    if let Some(features) = req.features {
        item.features = serde_json::json!(features);
    }
    if let Some(included_items) = req.included_items {
        item.included_items = serde_json::json!(included_items);
    }
    if let Some(version) = req.version {
        item.version = version;
    }
    if let Some(status) = req.status {
        item.status = status;
    }
    if let Some(licenses) = req.licenses {
        item.licenses = licenses;
    }
    if let Some(download_limit) = req.download_limit {
        item.download_limit = download_limit;
    }
    item.updated_at = Utc::now();

    diesel::update(marketplace_items::table.filter(marketplace_items::id.eq(id)))
        .set(&item)
        .execute(&mut conn)?;
    Ok(ApiOk(item))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    let mut conn = state.conn.get()?;
    let deleted =
        diesel::delete(marketplace_items::table.filter(marketplace_items::id.eq(id)))
            .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("marketplace item"));
    }
    Ok(ApiOk(serde_json::json!({ "deleted": id })))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/marketplace", get(list_items).post(create_item))
        .route(
            "/api/marketplace/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_sentinel_disables_filter() {
        assert_eq!(filter_value(Some("all".to_string())), None);
        assert_eq!(filter_value(Some(String::new())), None);
        assert_eq!(
            filter_value(Some("templates".to_string())),
            Some("templates".to_string())
        );
        assert_eq!(filter_value(None), None);
    }
}
