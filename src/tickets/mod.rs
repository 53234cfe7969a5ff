pub mod entitlement;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::packages;
use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::{support_tickets, ticket_responses};
use crate::shared::state::AppState;
use entitlement::{next_response_due, remaining_tickets, ResponseCountdown, TicketQuota};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = support_tickets)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub category: String,
    pub priority: String,
    pub message: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = ticket_responses)]
pub struct TicketResponse {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "open" => Ok(Self::Open),
            "in_progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            other => Err(ApiError::Validation(format!(
                "unknown ticket status: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Closed is terminal except for an explicit reopen back to open.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        match self {
            Self::Closed => next == Self::Open,
            _ => true,
        }
    }
}

fn validate_category(s: &str) -> Result<(), ApiError> {
    match s {
        "support" | "billing" | "technical" | "feature" => Ok(()),
        other => Err(ApiError::Validation(format!(
            "unknown ticket category: {other}"
        ))),
    }
}

fn validate_priority(s: &str) -> Result<(), ApiError> {
    match s {
        "low" | "medium" | "high" => Ok(()),
        other => Err(ApiError::Validation(format!(
            "unknown ticket priority: {other}"
        ))),
    }
}

fn validate_author(s: &str) -> Result<(), ApiError> {
    match s {
        "user" | "support" => Ok(()),
        other => Err(ApiError::Validation(format!(
            "unknown response author: {other}"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub user_id: Uuid,
    pub subject: String,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ResponseBody {
    pub message: String,
    pub author: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub status: Option<String>,
    /// Appending a response instead of editing fields, matching the
    /// storefront's single update endpoint.
    pub response: Option<ResponseBody>,
}

#[derive(Debug, Serialize)]
pub struct TicketWithResponses {
    #[serde(flatten)]
    pub ticket: SupportTicket,
    pub responses: Vec<TicketResponse>,
}

#[derive(Debug, Serialize)]
pub struct EntitlementSummary {
    pub package_name: String,
    pub tier: String,
    pub remaining_tickets: TicketQuota,
    pub response_hours: i32,
    pub next_response: Option<ResponseCountdown>,
}

fn load_ticket(conn: &mut PgConnection, id: Uuid) -> Result<SupportTicket, ApiError> {
    support_tickets::table
        .filter(support_tickets::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("ticket"))
}

fn attach_responses(
    conn: &mut PgConnection,
    tickets: Vec<SupportTicket>,
) -> Result<Vec<TicketWithResponses>, ApiError> {
    let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();
    let responses: Vec<TicketResponse> = ticket_responses::table
        .filter(ticket_responses::ticket_id.eq_any(&ids))
        .order(ticket_responses::created_at.asc())
        .load(conn)?;

    let mut by_ticket: HashMap<Uuid, Vec<TicketResponse>> = HashMap::new();
    for response in responses {
        by_ticket.entry(response.ticket_id).or_default().push(response);
    }

    Ok(tickets
        .into_iter()
        .map(|ticket| {
            let responses = by_ticket.remove(&ticket.id).unwrap_or_default();
            TicketWithResponses { ticket, responses }
        })
        .collect())
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Vec<TicketWithResponses>> {
    let mut conn = state.conn.get()?;
    let tickets: Vec<SupportTicket> = support_tickets::table
        .filter(support_tickets::user_id.eq(query.user_id))
        .order(support_tickets::created_at.desc())
        .load(&mut conn)?;
    Ok(ApiOk(attach_responses(&mut conn, tickets)?))
}

pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTicketRequest>,
) -> ApiResult<TicketWithResponses> {
    if req.subject.trim().is_empty() {
        return Err(ApiError::Validation("subject must not be empty".into()));
    }
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message must not be empty".into()));
    }
    let category = req.category.unwrap_or_else(|| "support".to_string());
    validate_category(&category)?;
    let priority = req.priority.unwrap_or_else(|| "low".to_string());
    validate_priority(&priority)?;

    let mut conn = state.conn.get()?;
    let now = Utc::now();

    // quota gate: tickets created this calendar month vs. the package allowance
    let (_, _, features) = packages::active_features(&mut conn, req.user_id, &state.config.commerce)?;
    if let TicketQuota::Limited(limit) = features.monthly_tickets {
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ApiError::Database("invalid month start".into()))?;
        let used: i64 = support_tickets::table
            .filter(support_tickets::user_id.eq(req.user_id))
            .filter(support_tickets::created_at.ge(month_start))
            .count()
            .get_result(&mut conn)?;
        if used as u32 >= limit {
            return Err(ApiError::QuotaExceeded {
                used: used as u32,
                limit,
            });
        }
    }

    let ticket = SupportTicket {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        subject: req.subject,
        category,
        priority,
        message: req.message,
        status: TicketStatus::Open.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(support_tickets::table)
        .values(&ticket)
        .execute(&mut conn)?;

    Ok(ApiOk(TicketWithResponses {
        ticket,
        responses: Vec::new(),
    }))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<TicketWithResponses> {
    let mut conn = state.conn.get()?;
    let ticket = load_ticket(&mut conn, id)?;
    let mut with_responses = attach_responses(&mut conn, vec![ticket])?;
    Ok(ApiOk(with_responses.remove(0)))
}

fn append_response(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    body: ResponseBody,
    now: DateTime<Utc>,
) -> Result<TicketResponse, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::Validation(
            "response message must not be empty".into(),
        ));
    }
    let author = body.author.unwrap_or_else(|| "user".to_string());
    validate_author(&author)?;

    let response = TicketResponse {
        id: Uuid::new_v4(),
        ticket_id,
        author,
        message: body.message,
        created_at: now,
    };
    diesel::insert_into(ticket_responses::table)
        .values(&response)
        .execute(conn)?;
    diesel::update(support_tickets::table.filter(support_tickets::id.eq(ticket_id)))
        .set(support_tickets::updated_at.eq(now))
        .execute(conn)?;
    Ok(response)
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTicketRequest>,
) -> ApiResult<TicketWithResponses> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    let mut ticket = load_ticket(&mut conn, id)?;

    if let Some(body) = req.response {
        append_response(&mut conn, id, body, now)?;
    } else {
        if let Some(subject) = req.subject {
            if subject.trim().is_empty() {
                return Err(ApiError::Validation("subject must not be empty".into()));
            }
            ticket.subject = subject;
        }
        if let Some(category) = req.category {
            validate_category(&category)?;
            ticket.category = category;
        }
        if let Some(priority) = req.priority {
            validate_priority(&priority)?;
            ticket.priority = priority;
        }
        if let Some(status) = req.status {
            let next = TicketStatus::parse(&status)?;
            let current = TicketStatus::parse(&ticket.status)?;
            if !current.can_transition_to(next) {
                return Err(ApiError::InvalidOperation(format!(
                    "cannot move a {} ticket to {}",
                    current.as_str(),
                    next.as_str()
                )));
            }
            ticket.status = next.as_str().to_string();
        }
        ticket.updated_at = now;
        diesel::update(support_tickets::table.filter(support_tickets::id.eq(id)))
            .set(&ticket)
            .execute(&mut conn)?;
    }

    let ticket = load_ticket(&mut conn, id)?;
    let mut with_responses = attach_responses(&mut conn, vec![ticket])?;
    Ok(ApiOk(with_responses.remove(0)))
}

pub async fn add_response(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResponseBody>,
) -> ApiResult<TicketResponse> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();
    load_ticket(&mut conn, id)?;
    let response = append_response(&mut conn, id, body, now)?;
    Ok(ApiOk(response))
}

pub async fn get_entitlement(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<EntitlementSummary> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let (package_name, tier, features) =
        packages::active_features(&mut conn, query.user_id, &state.config.commerce)?;

    let tickets: Vec<SupportTicket> = support_tickets::table
        .filter(support_tickets::user_id.eq(query.user_id))
        .load(&mut conn)?;

    Ok(ApiOk(EntitlementSummary {
        package_name,
        tier,
        remaining_tickets: remaining_tickets(features.monthly_tickets, &tickets, now),
        response_hours: features.response_hours,
        next_response: next_response_due(features.response_hours, &tickets, now),
    }))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/user/tickets", get(list_tickets).post(create_ticket))
        .route("/api/user/tickets/entitlement", get(get_entitlement))
        .route("/api/user/tickets/:id", get(get_ticket).put(update_ticket))
        .route("/api/user/tickets/:id/responses", post(add_response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_only_reopens() {
        let closed = TicketStatus::Closed;
        assert!(closed.can_transition_to(TicketStatus::Open));
        assert!(!closed.can_transition_to(TicketStatus::InProgress));
        assert!(!closed.can_transition_to(TicketStatus::Resolved));
        assert!(!closed.can_transition_to(TicketStatus::Closed));
    }

    #[test]
    fn open_tickets_move_freely() {
        for next in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            assert!(TicketStatus::Open.can_transition_to(next));
            assert!(TicketStatus::Resolved.can_transition_to(next));
        }
    }

    #[test]
    fn enum_strings_round_trip() {
        for s in ["open", "in_progress", "resolved", "closed"] {
            assert_eq!(TicketStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(TicketStatus::parse("reopened").is_err());
        assert!(validate_category("billing").is_ok());
        assert!(validate_category("sales").is_err());
        assert!(validate_priority("medium").is_ok());
        assert!(validate_priority("urgent").is_err());
        assert!(validate_author("support").is_ok());
        assert!(validate_author("bot").is_err());
    }
}
