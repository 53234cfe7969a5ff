//! Site settings, stored one row per section with a typed payload. Updates
//! are validated against the section's struct before anything is persisted,
//! so a malformed payload can never corrupt a section.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::settings_sections;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = settings_sections)]
pub struct SettingsRow {
    pub section: String,
    pub data: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    General,
    Payment,
    Invoice,
    Legal,
}

impl Section {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "general" => Ok(Self::General),
            "payment" => Ok(Self::Payment),
            "invoice" => Ok(Self::Invoice),
            "legal" => Ok(Self::Legal),
            other => Err(ApiError::Validation(format!(
                "unknown settings section: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Payment => "payment",
            Self::Invoice => "invoice",
            Self::Legal => "legal",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub site_name: String,
    pub site_url: String,
    pub description: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub company_name: String,
    pub tax_id: String,
    pub commercial_register: String,
    pub managing_director: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaypalConfig {
    pub enabled: bool,
    pub client_id: String,
    pub test_mode: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MollieConfig {
    pub enabled: bool,
    pub api_key: String,
    pub test_mode: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BankTransferConfig {
    pub enabled: bool,
    pub bank_name: String,
    pub account_holder: String,
    pub iban: String,
    pub bic: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub paypal: PaypalConfig,
    pub mollie: MollieConfig,
    pub bank_transfer: BankTransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceSettings {
    pub template: String,
    pub primary_color: String,
    pub tax_rate: f64,
    pub currency: String,
    pub invoice_prefix: String,
    pub invoice_number_start: i32,
}

impl Default for InvoiceSettings {
    fn default() -> Self {
        Self {
            template: "default".to_string(),
            primary_color: "#1a1a2e".to_string(),
            tax_rate: 19.0,
            currency: "EUR".to_string(),
            invoice_prefix: "INV-".to_string(),
            invoice_number_start: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Impressum {
    pub company_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub managing_director: String,
    pub commercial_register: String,
    pub register_court: String,
    pub tax_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConsentSettings {
    pub enabled: bool,
    pub position: String,
    pub theme: String,
}

impl Default for CookieConsentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            position: "bottom".to_string(),
            theme: "light".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LegalSettings {
    pub impressum: Impressum,
    pub cookie_consent: CookieConsentSettings,
}

#[derive(Debug, Serialize)]
pub struct AllSettings {
    pub general: GeneralSettings,
    pub payment: PaymentSettings,
    pub invoice: InvoiceSettings,
    pub legal: LegalSettings,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub section: String,
    pub data: serde_json::Value,
}

/// Parse `data` against the section's struct and re-serialize it, so the
/// stored payload is always complete and normalized.
fn validate_payload(
    section: Section,
    data: serde_json::Value,
) -> Result<serde_json::Value, ApiError> {
    let normalized = match section {
        Section::General => serde_json::from_value::<GeneralSettings>(data)
            .map(|s| serde_json::to_value(s)),
        Section::Payment => serde_json::from_value::<PaymentSettings>(data)
            .map(|s| serde_json::to_value(s)),
        Section::Invoice => serde_json::from_value::<InvoiceSettings>(data)
            .map(|s| serde_json::to_value(s)),
        Section::Legal => serde_json::from_value::<LegalSettings>(data)
            .map(|s| serde_json::to_value(s)),
    }
    .map_err(|e| ApiError::Validation(format!("invalid {} settings: {e}", section.as_str())))?;

    normalized.map_err(|e| ApiError::Database(e.to_string()))
}

fn section_or_default<T: Default + for<'de> Deserialize<'de>>(
    rows: &HashMap<String, serde_json::Value>,
    section: Section,
) -> T {
    match rows.get(section.as_str()) {
        Some(value) => serde_json::from_value(value.clone()).unwrap_or_else(|e| {
            log::warn!(
                "stored {} settings are unreadable, serving defaults: {e}",
                section.as_str()
            );
            T::default()
        }),
        None => T::default(),
    }
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<AllSettings> {
    let mut conn = state.conn.get()?;
    let rows: Vec<SettingsRow> = settings_sections::table.load(&mut conn)?;
    let by_section: HashMap<String, serde_json::Value> =
        rows.into_iter().map(|r| (r.section, r.data)).collect();

    Ok(ApiOk(AllSettings {
        general: section_or_default(&by_section, Section::General),
        payment: section_or_default(&by_section, Section::Payment),
        invoice: section_or_default(&by_section, Section::Invoice),
        legal: section_or_default(&by_section, Section::Legal),
    }))
}

pub async fn get_section(
    State(state): State<Arc<AppState>>,
    Path(section): Path<String>,
) -> ApiResult<serde_json::Value> {
    let section = Section::parse(&section)?;
    let mut conn = state.conn.get()?;

    let stored: Option<SettingsRow> = settings_sections::table
        .filter(settings_sections::section.eq(section.as_str()))
        .first(&mut conn)
        .optional()?;

    let data = match stored {
        // normalize on the way out; old rows may predate a field
        Some(row) => validate_payload(section, row.data)?,
        None => validate_payload(section, serde_json::json!({}))?,
    };
    Ok(ApiOk(data))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSettingsRequest>,
) -> ApiResult<serde_json::Value> {
    let section = Section::parse(&req.section)?;
    let data = validate_payload(section, req.data)?;

    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let row = SettingsRow {
        section: section.as_str().to_string(),
        data: data.clone(),
        updated_at: now,
    };

    diesel::insert_into(settings_sections::table)
        .values(&row)
        .on_conflict(settings_sections::section)
        .do_update()
        .set((
            settings_sections::data.eq(&row.data),
            settings_sections::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    Ok(ApiOk(data))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/settings/:section", get(get_section))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_names_round_trip() {
        for s in ["general", "payment", "invoice", "legal"] {
            assert_eq!(Section::parse(s).unwrap().as_str(), s);
        }
        assert!(Section::parse("seo").is_err());
    }

    #[test]
    fn partial_payload_is_filled_with_defaults() {
        let data = serde_json::json!({ "site_name": "Acme Digital" });
        let normalized = validate_payload(Section::General, data).unwrap();
        assert_eq!(normalized["site_name"], "Acme Digital");
        assert_eq!(normalized["email"], "");
        assert_eq!(normalized["company_name"], "");
    }

    #[test]
    fn malformed_payload_is_rejected() {
        // enabled must be a bool, not a string
        let data = serde_json::json!({ "cookie_consent": { "enabled": "yes" } });
        let err = validate_payload(Section::Legal, data).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn invoice_defaults_are_sane() {
        let normalized = validate_payload(Section::Invoice, serde_json::json!({})).unwrap();
        assert_eq!(normalized["tax_rate"], 19.0);
        assert_eq!(normalized["currency"], "EUR");
        assert_eq!(normalized["invoice_prefix"], "INV-");
        assert_eq!(normalized["invoice_number_start"], 1000);
    }

    #[test]
    fn cookie_consent_defaults_on() {
        let normalized = validate_payload(Section::Legal, serde_json::json!({})).unwrap();
        assert_eq!(normalized["cookie_consent"]["enabled"], true);
        assert_eq!(normalized["cookie_consent"]["position"], "bottom");
    }
}
