//! Support-package catalog and the per-user subscription lifecycle, including
//! the B2B cancellation notice period. Entitlement constants that the old
//! storefront parsed out of display strings ("48 hours") are typed columns
//! here; the notice period comes from [`CommerceConfig`].

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Months, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CommerceConfig;
use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::{package_subscriptions, support_packages};
use crate::shared::state::AppState;
use crate::tickets::entitlement::TicketQuota;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = support_packages)]
pub struct SupportPackage {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub currency: String,
    pub billing_cycle: String,
    pub tier: String,
    pub monthly_tickets: Option<i32>,
    pub response_hours: i32,
    pub support_channels: serde_json::Value,
    pub priority_support: bool,
    pub dedicated_manager: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = package_subscriptions)]
pub struct PackageSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub package_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub cancel_requested_at: Option<DateTime<Utc>>,
    pub cancel_effective_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageTier {
    Free,
    Standard,
    Professional,
    Corporate,
}

impl PackageTier {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "free" => Ok(Self::Free),
            "standard" => Ok(Self::Standard),
            "professional" => Ok(Self::Professional),
            "corporate" => Ok(Self::Corporate),
            other => Err(ApiError::Validation(format!("unknown tier: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Professional => "professional",
            Self::Corporate => "corporate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    CancelPending,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CancelPending => "cancel_pending",
            Self::Canceled => "canceled",
        }
    }
}

/// The entitlement bundle a package grants, in the shape the dashboard
/// renders (quota sentinel, typed SLA hours plus a display label).
#[derive(Debug, Clone, Serialize)]
pub struct FeatureSet {
    pub monthly_tickets: TicketQuota,
    pub response_hours: i32,
    pub response_time_label: String,
    pub support_channels: Vec<String>,
    pub priority_support: bool,
    pub dedicated_manager: bool,
}

impl FeatureSet {
    /// Baseline entitlements for users without an active subscription.
    pub fn free_tier(commerce: &CommerceConfig) -> Self {
        Self {
            monthly_tickets: TicketQuota::Limited(commerce.free_monthly_tickets),
            response_hours: commerce.free_response_hours,
            response_time_label: format!("{} hours", commerce.free_response_hours),
            support_channels: vec!["Ticket".to_string()],
            priority_support: false,
            dedicated_manager: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PackageView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub currency: String,
    pub billing_cycle: String,
    pub tier: String,
    pub features: FeatureSet,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupportPackage {
    pub fn features(&self) -> FeatureSet {
        let channels: Vec<String> =
            serde_json::from_value(self.support_channels.clone()).unwrap_or_default();
        FeatureSet {
            monthly_tickets: TicketQuota::from_column(self.monthly_tickets),
            response_hours: self.response_hours,
            response_time_label: format!("{} hours", self.response_hours),
            support_channels: channels,
            priority_support: self.priority_support,
            dedicated_manager: self.dedicated_manager,
        }
    }

    pub fn into_view(self) -> PackageView {
        let features = self.features();
        PackageView {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            currency: self.currency,
            billing_cycle: self.billing_cycle,
            tier: self.tier,
            features,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Date a cancellation requested at `requested_at` takes effect under a
/// notice period of `notice_months` calendar months. End-of-month dates
/// clamp (Nov 30 + 3 months = Feb 28/29).
pub fn cancellation_effective_date(
    requested_at: DateTime<Utc>,
    notice_months: u32,
) -> Option<DateTime<Utc>> {
    requested_at.checked_add_months(Months::new(notice_months))
}

#[derive(Debug, Deserialize)]
pub struct ListPackagesQuery {
    pub status: Option<String>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub name: String,
    pub description: Option<String>,
    pub price: BigDecimal,
    pub currency: Option<String>,
    pub billing_cycle: Option<String>,
    pub tier: String,
    pub monthly_tickets: TicketQuota,
    pub response_hours: i32,
    pub support_channels: Option<Vec<String>>,
    pub priority_support: Option<bool>,
    pub dedicated_manager: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePackageRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<BigDecimal>,
    pub tier: Option<String>,
    pub monthly_tickets: Option<TicketQuota>,
    pub response_hours: Option<i32>,
    pub support_channels: Option<Vec<String>>,
    pub priority_support: Option<bool>,
    pub dedicated_manager: Option<bool>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub user_id: Uuid,
    pub package_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ActivePackageView {
    pub subscription: PackageSubscription,
    pub package: PackageView,
}

#[derive(Debug, Serialize)]
pub struct CancellationNotice {
    pub subscription_id: Uuid,
    pub status: String,
    pub notice_months: u32,
    pub requested_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
}

pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPackagesQuery>,
) -> ApiResult<Vec<PackageView>> {
    let mut conn = state.conn.get()?;

    let mut q = support_packages::table.into_boxed();
    if query.active_only.unwrap_or(false) {
        q = q.filter(support_packages::status.eq("active"));
    } else if let Some(status) = query.status {
        q = q.filter(support_packages::status.eq(status));
    }

    let packages: Vec<SupportPackage> = q
        .order(support_packages::created_at.desc())
        .load(&mut conn)?;

    Ok(ApiOk(
        packages.into_iter().map(SupportPackage::into_view).collect(),
    ))
}

pub async fn create_package(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePackageRequest>,
) -> ApiResult<PackageView> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("package name must not be empty".into()));
    }
    let tier = PackageTier::parse(&req.tier)?;
    if req.response_hours <= 0 {
        return Err(ApiError::Validation(
            "response_hours must be positive".into(),
        ));
    }

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let package = SupportPackage {
        id: Uuid::new_v4(),
        name: req.name,
        description: req.description,
        price: req.price,
        currency: req.currency.unwrap_or_else(|| "EUR".to_string()),
        billing_cycle: req.billing_cycle.unwrap_or_else(|| "month".to_string()),
        tier: tier.as_str().to_string(),
        monthly_tickets: req.monthly_tickets.to_column(),
        response_hours: req.response_hours,
        support_channels: serde_json::json!(req
            .support_channels
            .unwrap_or_else(|| vec!["Ticket".to_string()])),
        priority_support: req.priority_support.unwrap_or(false),
        dedicated_manager: req.dedicated_manager.unwrap_or(false),
        status: "active".to_string(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(support_packages::table)
        .values(&package)
        .execute(&mut conn)?;

    Ok(ApiOk(package.into_view()))
}

pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<PackageView> {
    let mut conn = state.conn.get()?;
    let package: SupportPackage = support_packages::table
        .filter(support_packages::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("package"))?;
    Ok(ApiOk(package.into_view()))
}

pub async fn update_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePackageRequest>,
) -> ApiResult<PackageView> {
    let mut conn = state.conn.get()?;

    let mut package: SupportPackage = support_packages::table
        .filter(support_packages::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("package"))?;

    if let Some(name) = req.name {
        if name.trim().is_empty() {
            return Err(ApiError::Validation("package name must not be empty".into()));
        }
        package.name = name;
    }
    if let Some(description) = req.description {
        package.description = Some(description);
    }
    if let Some(price) = req.price {
        package.price = price;
    }
    if let Some(tier) = req.tier {
        package.tier = PackageTier::parse(&tier)?.as_str().to_string();
    }
    if let Some(quota) = req.monthly_tickets {
        package.monthly_tickets = quota.to_column();
    }
    if let Some(hours) = req.response_hours {
        if hours <= 0 {
            return Err(ApiError::Validation(
                "response_hours must be positive".into(),
            ));
        }
        package.response_hours = hours;
    }
    if let Some(channels) = req.support_channels {
        package.support_channels = serde_json::json!(channels);
    }
    if let Some(v) = req.priority_support {
        package.priority_support = v;
    }
    if let Some(v) = req.dedicated_manager {
        package.dedicated_manager = v;
    }
    if let Some(status) = req.status {
        if status != "active" && status != "inactive" {
            return Err(ApiError::Validation(format!(
                "unknown package status: {status}"
            )));
        }
        package.status = status;
    }
    package.updated_at = Utc::now();

    diesel::update(support_packages::table.filter(support_packages::id.eq(id)))
        .set(&package)
        .execute(&mut conn)?;

    Ok(ApiOk(package.into_view()))
}

pub async fn delete_package(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    let mut conn = state.conn.get()?;
    let deleted =
        diesel::delete(support_packages::table.filter(support_packages::id.eq(id)))
            .execute(&mut conn)?;
    if deleted == 0 {
        return Err(ApiError::NotFound("package"));
    }
    Ok(ApiOk(serde_json::json!({ "deleted": id })))
}

/// The user's live subscription, settling any cancel-pending subscription
/// whose notice period has elapsed.
fn find_live_subscription(
    conn: &mut PgConnection,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<PackageSubscription>, ApiError> {
    let subs: Vec<PackageSubscription> = package_subscriptions::table
        .filter(package_subscriptions::user_id.eq(user_id))
        .filter(package_subscriptions::status.eq_any(vec!["active", "cancel_pending"]))
        .order(package_subscriptions::started_at.desc())
        .load(conn)?;

    for sub in subs {
        if sub.status == SubscriptionStatus::CancelPending.as_str() {
            if let Some(effective) = sub.cancel_effective_at {
                if effective <= now {
                    diesel::update(
                        package_subscriptions::table
                            .filter(package_subscriptions::id.eq(sub.id)),
                    )
                    .set((
                        package_subscriptions::status
                            .eq(SubscriptionStatus::Canceled.as_str()),
                        package_subscriptions::updated_at.eq(now),
                    ))
                    .execute(conn)?;
                    continue;
                }
            }
        }
        return Ok(Some(sub));
    }
    Ok(None)
}

/// Entitlements for the user's active package, falling back to the free
/// tier. Used by the tickets module to gate creation and drive the
/// dashboard countdown.
pub fn active_features(
    conn: &mut PgConnection,
    user_id: Uuid,
    commerce: &CommerceConfig,
) -> Result<(String, String, FeatureSet), ApiError> {
    let now = Utc::now();
    if let Some(sub) = find_live_subscription(conn, user_id, now)? {
        let package: Option<SupportPackage> = support_packages::table
            .filter(support_packages::id.eq(sub.package_id))
            .first(conn)
            .optional()?;
        if let Some(package) = package {
            let features = package.features();
            return Ok((package.name, package.tier, features));
        }
    }
    Ok((
        "Free Support".to_string(),
        PackageTier::Free.as_str().to_string(),
        FeatureSet::free_tier(commerce),
    ))
}

pub async fn active_package(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Option<ActivePackageView>> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let Some(sub) = find_live_subscription(&mut conn, query.user_id, now)? else {
        return Ok(ApiOk(None));
    };

    let package: SupportPackage = support_packages::table
        .filter(support_packages::id.eq(sub.package_id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("package"))?;

    Ok(ApiOk(Some(ActivePackageView {
        subscription: sub,
        package: package.into_view(),
    })))
}

pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubscribeRequest>,
) -> ApiResult<ActivePackageView> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let package: SupportPackage = support_packages::table
        .filter(support_packages::id.eq(req.package_id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("package"))?;
    if package.status != "active" {
        return Err(ApiError::InvalidOperation(
            "package is not available for subscription".into(),
        ));
    }

    if let Some(existing) = find_live_subscription(&mut conn, req.user_id, now)? {
        if existing.package_id == req.package_id {
            return Err(ApiError::InvalidOperation(
                "already subscribed to this package".into(),
            ));
        }
        // upgrade replaces the old subscription immediately
        diesel::update(
            package_subscriptions::table.filter(package_subscriptions::id.eq(existing.id)),
        )
        .set((
            package_subscriptions::status.eq(SubscriptionStatus::Canceled.as_str()),
            package_subscriptions::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    let sub = PackageSubscription {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        package_id: req.package_id,
        status: SubscriptionStatus::Active.as_str().to_string(),
        started_at: now,
        cancel_requested_at: None,
        cancel_effective_at: None,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(package_subscriptions::table)
        .values(&sub)
        .execute(&mut conn)?;

    Ok(ApiOk(ActivePackageView {
        subscription: sub,
        package: package.into_view(),
    }))
}

pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserQuery>,
) -> ApiResult<CancellationNotice> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let notice_months = state.config.commerce.cancellation_notice_months;

    let sub = find_live_subscription(&mut conn, req.user_id, now)?
        .ok_or(ApiError::NotFound("active subscription"))?;

    if sub.status == SubscriptionStatus::CancelPending.as_str() {
        return Err(ApiError::InvalidOperation(
            "cancellation already scheduled".into(),
        ));
    }

    let effective_at = cancellation_effective_date(now, notice_months)
        .ok_or_else(|| ApiError::Validation("invalid notice period".into()))?;

    diesel::update(package_subscriptions::table.filter(package_subscriptions::id.eq(sub.id)))
        .set((
            package_subscriptions::status.eq(SubscriptionStatus::CancelPending.as_str()),
            package_subscriptions::cancel_requested_at.eq(Some(now)),
            package_subscriptions::cancel_effective_at.eq(Some(effective_at)),
            package_subscriptions::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    Ok(ApiOk(CancellationNotice {
        subscription_id: sub.id,
        status: SubscriptionStatus::CancelPending.as_str().to_string(),
        notice_months,
        requested_at: now,
        effective_at,
    }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/packages", get(list_packages).post(create_package))
        .route("/api/packages/active", get(active_package))
        .route("/api/packages/subscribe", post(subscribe))
        .route("/api/packages/cancel", post(cancel_subscription))
        .route(
            "/api/packages/:id",
            get(get_package).put(update_package).delete(delete_package),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 10, 30, 0).unwrap()
    }

    #[test]
    fn notice_period_adds_calendar_months() {
        let effective = cancellation_effective_date(at(2026, 8, 30), 3).unwrap();
        assert_eq!(effective, at(2026, 11, 30));
    }

    #[test]
    fn notice_period_clamps_to_month_end() {
        // Nov 30 + 3 months lands in February, which is shorter
        let effective = cancellation_effective_date(at(2026, 11, 30), 3).unwrap();
        assert_eq!(effective, at(2027, 2, 28));
    }

    #[test]
    fn tier_parsing_rejects_unknown_values() {
        assert_eq!(PackageTier::parse("corporate").unwrap(), PackageTier::Corporate);
        assert!(PackageTier::parse("platinum").is_err());
    }

    #[test]
    fn free_tier_matches_commerce_config() {
        let features = FeatureSet::free_tier(&CommerceConfig::default());
        assert_eq!(features.monthly_tickets, TicketQuota::Limited(4));
        assert_eq!(features.response_hours, 48);
        assert_eq!(features.response_time_label, "48 hours");
        assert_eq!(features.support_channels, vec!["Ticket".to_string()]);
        assert!(!features.priority_support);
        assert!(!features.dedicated_manager);
    }

    #[test]
    fn quota_column_mapping_round_trips() {
        assert_eq!(TicketQuota::from_column(None), TicketQuota::Unlimited);
        assert_eq!(TicketQuota::from_column(Some(8)), TicketQuota::Limited(8));
        assert_eq!(TicketQuota::Limited(8).to_column(), Some(8));
        assert_eq!(TicketQuota::Unlimited.to_column(), None);
    }
}
