//! Contact-form messages with a soft-delete/restore lifecycle. Soft-deleted
//! messages are purged once they outlive the configured retention window;
//! bulk actions report per-id outcomes instead of failing the whole batch.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::shared::envelope::{ApiError, ApiOk, ApiResult};
use crate::shared::schema::messages;
use crate::shared::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = messages)]
pub struct Message {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
    pub is_read: bool,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub is_read: Option<bool>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub permanent: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkFailure {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

/// Drop soft-deleted messages older than the retention window.
fn purge_expired(conn: &mut PgConnection, retention_days: i64) -> Result<usize, ApiError> {
    let cutoff = Utc::now() - Duration::days(retention_days);
    let purged = diesel::delete(
        messages::table
            .filter(messages::deleted.eq(true))
            .filter(messages::deleted_at.lt(cutoff)),
    )
    .execute(conn)?;
    if purged > 0 {
        log::info!("purged {purged} messages past the {retention_days}-day retention window");
    }
    Ok(purged)
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<Message>> {
    let mut conn = state.conn.get()?;
    purge_expired(&mut conn, state.config.commerce.message_retention_days)?;

    let mut q = messages::table.into_boxed();
    if !query.include_deleted.unwrap_or(false) {
        q = q.filter(messages::deleted.eq(false));
    }
    let list: Vec<Message> = q.order(messages::created_at.desc()).load(&mut conn)?;
    Ok(ApiOk(list))
}

pub async fn create_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMessageRequest>,
) -> ApiResult<Message> {
    if req.email.trim().is_empty() {
        return Err(ApiError::Validation("email must not be empty".into()));
    }
    if req.body.trim().is_empty() {
        return Err(ApiError::Validation("body must not be empty".into()));
    }

    let mut conn = state.conn.get()?;
    let message = Message {
        id: Uuid::new_v4(),
        name: req.name,
        email: req.email,
        subject: req.subject,
        body: req.body,
        is_read: false,
        deleted: false,
        deleted_at: None,
        created_at: Utc::now(),
    };
    diesel::insert_into(messages::table)
        .values(&message)
        .execute(&mut conn)?;
    Ok(ApiOk(message))
}

fn load_message(conn: &mut PgConnection, id: Uuid) -> Result<Message, ApiError> {
    messages::table
        .filter(messages::id.eq(id))
        .first(conn)
        .optional()?
        .ok_or(ApiError::NotFound("message"))
}

pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Message> {
    let mut conn = state.conn.get()?;
    Ok(ApiOk(load_message(&mut conn, id)?))
}

pub async fn update_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMessageRequest>,
) -> ApiResult<Message> {
    let mut conn = state.conn.get()?;
    let mut message = load_message(&mut conn, id)?;

    if let Some(is_read) = req.is_read {
        message.is_read = is_read;
    }
    if let Some(subject) = req.subject {
        message.subject = subject;
    }
    if let Some(body) = req.body {
        message.body = body;
    }

    diesel::update(messages::table.filter(messages::id.eq(id)))
        .set(&message)
        .execute(&mut conn)?;
    Ok(ApiOk(message))
}

fn soft_delete(conn: &mut PgConnection, id: Uuid, now: DateTime<Utc>) -> Result<(), ApiError> {
    let updated = diesel::update(messages::table.filter(messages::id.eq(id)))
        .set((
            messages::deleted.eq(true),
            messages::deleted_at.eq(Some(now)),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("message"));
    }
    Ok(())
}

fn undelete(conn: &mut PgConnection, id: Uuid) -> Result<Message, ApiError> {
    let updated = diesel::update(messages::table.filter(messages::id.eq(id)))
        .set((
            messages::deleted.eq(false),
            messages::deleted_at.eq(None::<DateTime<Utc>>),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(ApiError::NotFound("message"));
    }
    load_message(conn, id)
}

pub async fn delete_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<serde_json::Value> {
    let mut conn = state.conn.get()?;

    if query.permanent.unwrap_or(false) {
        let deleted =
            diesel::delete(messages::table.filter(messages::id.eq(id))).execute(&mut conn)?;
        if deleted == 0 {
            return Err(ApiError::NotFound("message"));
        }
    } else {
        soft_delete(&mut conn, id, Utc::now())?;
    }
    Ok(ApiOk(serde_json::json!({ "deleted": id })))
}

pub async fn restore_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Message> {
    let mut conn = state.conn.get()?;
    Ok(ApiOk(undelete(&mut conn, id)?))
}

pub async fn bulk_delete(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<BulkOutcome> {
    let mut conn = state.conn.get()?;
    let now = Utc::now();

    let mut outcome = BulkOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for id in req.ids {
        match soft_delete(&mut conn, id, now) {
            Ok(()) => outcome.succeeded.push(id),
            Err(e) => outcome.failed.push(BulkFailure {
                id,
                error: e.to_string(),
            }),
        }
    }
    Ok(ApiOk(outcome))
}

pub async fn bulk_restore(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<BulkOutcome> {
    let mut conn = state.conn.get()?;

    let mut outcome = BulkOutcome {
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for id in req.ids {
        match undelete(&mut conn, id) {
            Ok(_) => outcome.succeeded.push(id),
            Err(e) => outcome.failed.push(BulkFailure {
                id,
                error: e.to_string(),
            }),
        }
    }
    Ok(ApiOk(outcome))
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/messages", get(list_messages).post(create_message))
        .route("/api/messages/bulk/delete", post(bulk_delete))
        .route("/api/messages/bulk/restore", post(bulk_restore))
        .route(
            "/api/messages/:id",
            get(get_message).put(update_message).delete(delete_message),
        )
        .route("/api/messages/:id/restore", post(restore_message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_outcome_reports_partial_failure() {
        let good = Uuid::new_v4();
        let bad = Uuid::new_v4();
        let mut outcome = BulkOutcome {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        outcome.succeeded.push(good);
        outcome.failed.push(BulkFailure {
            id: bad,
            error: ApiError::NotFound("message").to_string(),
        });

        let body = serde_json::to_value(&outcome).unwrap();
        assert_eq!(body["succeeded"][0], serde_json::json!(good));
        assert_eq!(body["failed"][0]["id"], serde_json::json!(bad));
        assert_eq!(body["failed"][0]["error"], "message not found");
    }

    #[test]
    fn bulk_request_accepts_id_list() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        let req: BulkRequest = serde_json::from_value(serde_json::json!({ "ids": ids })).unwrap();
        assert_eq!(req.ids, ids);
    }
}
