use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::{customers, payments};
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub description: String,
    pub invoice_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(ApiError::Validation(format!(
                "unknown payment status: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    #[serde(flatten)]
    pub payment: Payment,
    pub customer: CustomerSummary,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

/// Look the customer up by email, creating the record on first contact.
fn find_or_create_customer(
    conn: &mut PgConnection,
    name: &str,
    email: &str,
) -> Result<Customer, ApiError> {
    if email.trim().is_empty() {
        return Err(ApiError::Validation("customer email must not be empty".into()));
    }

    let existing: Option<Customer> = customers::table
        .filter(customers::email.eq(email))
        .first(conn)
        .optional()?;
    if let Some(customer) = existing {
        return Ok(customer);
    }

    let customer = Customer {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: email.to_string(),
        status: "active".to_string(),
        created_at: Utc::now(),
    };
    diesel::insert_into(customers::table)
        .values(&customer)
        .execute(conn)?;
    Ok(customer)
}

fn load_payment_view(conn: &mut PgConnection, id: Uuid) -> Result<PaymentView, ApiError> {
    let (payment, customer): (Payment, Customer) = payments::table
        .inner_join(customers::table)
        .filter(payments::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("payment"))?;
    Ok(PaymentView {
        payment,
        customer: CustomerSummary {
            id: customer.id,
            name: customer.name,
            email: customer.email,
        },
    })
}

pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<PaymentView>> {
    let mut conn = state.conn.get()?;

    let mut q = payments::table.inner_join(customers::table).into_boxed();
    if let Some(status) = query.status.filter(|s| s != "all") {
        PaymentStatus::parse(&status)?;
        q = q.filter(payments::status.eq(status));
    }

    let rows: Vec<(Payment, Customer)> = q.order(payments::created_at.desc()).load(&mut conn)?;
    Ok(ApiOk(
        rows.into_iter()
            .map(|(payment, customer)| PaymentView {
                payment,
                customer: CustomerSummary {
                    id: customer.id,
                    name: customer.name,
                    email: customer.email,
                },
            })
            .collect(),
    ))
}

pub async fn create_payment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<PaymentView> {
    let status = req.status.unwrap_or_else(|| "pending".to_string());
    PaymentStatus::parse(&status)?;

    let mut conn = state.conn.get()?;
    let customer = find_or_create_customer(&mut conn, &req.customer_name, &req.customer_email)?;
    let now = Utc::now();

    let payment = Payment {
        id: Uuid::new_v4(),
        customer_id: customer.id,
        amount: req.amount,
        currency: req.currency.unwrap_or_else(|| "EUR".to_string()),
        status,
        payment_method: req.payment_method.unwrap_or_else(|| "manual".to_string()),
        description: req.description.unwrap_or_default(),
        invoice_url: req.invoice_url,
        created_at: now,
        updated_at: now,
    };
    diesel::insert_into(payments::table)
        .values(&payment)
        .execute(&mut conn)?;

    Ok(ApiOk(PaymentView {
        payment,
        customer: CustomerSummary {
            id: customer.id,
            name: customer.name,
            email: customer.email,
        },
    }))
}

pub async fn get_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<PaymentView> {
    let mut conn = state.conn.get()?;
    Ok(ApiOk(load_payment_view(&mut conn, id)?))
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangeStatusRequest>,
) -> ApiResult<PaymentView> {
    let status = PaymentStatus::parse(&req.status)?;
    let mut conn = state.conn.get()?;

    let updated = diesel::update(payments::table.filter(payments::id.eq(id)))
        .set((
            payments::status.eq(status.as_str()),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("payment"));
    }
    Ok(ApiOk(load_payment_view(&mut conn, id)?))
}

pub async fn refund_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<PaymentView> {
    let mut conn = state.conn.get()?;

    let payment: Payment = payments::table
        .filter(payments::id.eq(id))
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("payment"))?;

    if PaymentStatus::parse(&payment.status)? != PaymentStatus::Paid {
        return Err(ApiError::InvalidOperation(format!(
            "only paid payments can be refunded, this one is {}",
            payment.status
        )));
    }

    diesel::update(payments::table.filter(payments::id.eq(id)))
        .set((
            payments::status.eq(PaymentStatus::Refunded.as_str()),
            payments::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)?;
    Ok(ApiOk(load_payment_view(&mut conn, id)?))
}

pub async fn list_customers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Customer>> {
    let mut conn = state.conn.get()?;
    let list: Vec<Customer> = customers::table
        .order(customers::created_at.desc())
        .load(&mut conn)?;
    Ok(ApiOk(list))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/payments", get(list_payments).post(create_payment))
        .route("/api/admin/payments/:id", get(get_payment))
        .route("/api/admin/payments/:id/status", put(change_status))
        .route("/api/admin/payments/:id/refund", post(refund_payment))
        .route("/api/admin/customers", get(list_customers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for s in ["pending", "paid", "failed", "refunded"] {
            assert_eq!(PaymentStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(PaymentStatus::parse("chargeback").is_err());
    }
}
