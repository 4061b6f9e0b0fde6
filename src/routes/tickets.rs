use std::collections::{HashMap, HashSet};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::users::resolve_user_by_name;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{NewTicket, Ticket, User};
use crate::schema::{tickets, users};
use crate::state::AppState;
use crate::utils::json::nullable;
use crate::utils::text::{contains_ci, normalize_term};
use crate::utils::time::{to_iso, today};
use crate::validation::{parse_priority, RequiredFields};

const DEFAULT_DUE_IN_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Review,
    Completed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Review => "review",
            TicketStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "pending" => Some(TicketStatus::Pending),
            "in_progress" => Some(TicketStatus::InProgress),
            "review" => Some(TicketStatus::Review),
            "completed" => Some(TicketStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketBucket {
    #[default]
    All,
    Active,
    Completed,
    Overdue,
}

impl TicketBucket {
    /// Whether a ticket with this status and due date falls into the bucket.
    /// Unknown status strings count as active.
    pub fn matches(&self, status: &str, due_date: Option<NaiveDate>, today: NaiveDate) -> bool {
        let completed = TicketStatus::parse(status) == Some(TicketStatus::Completed);
        match self {
            TicketBucket::All => true,
            TicketBucket::Active => !completed,
            TicketBucket::Completed => completed,
            TicketBucket::Overdue => !completed && due_date.is_some_and(|due| due < today),
        }
    }
}

#[derive(Deserialize)]
pub struct TicketListQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub bucket: TicketBucket,
}

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct UpdateTicketRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub assignee: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
}

#[derive(Serialize, Clone)]
pub struct TicketUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&User> for TicketUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Serialize, Clone)]
pub struct TicketResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub assignee_id: Option<Uuid>,
    pub reporter_id: Option<Uuid>,
    pub assignee: Option<TicketUser>,
    pub reporter: Option<TicketUser>,
    pub due_date: Option<NaiveDate>,
    pub is_overdue: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize, Default, Debug, PartialEq, Eq)]
pub struct TicketSummary {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub overdue: usize,
}

impl TicketSummary {
    pub fn tally<'a>(
        tickets: impl IntoIterator<Item = (&'a str, Option<NaiveDate>)>,
        today: NaiveDate,
    ) -> Self {
        let mut summary = TicketSummary::default();
        for (status, due_date) in tickets {
            summary.total += 1;
            if TicketBucket::Active.matches(status, due_date, today) {
                summary.active += 1;
            }
            if TicketBucket::Completed.matches(status, due_date, today) {
                summary.completed += 1;
            }
            if TicketBucket::Overdue.matches(status, due_date, today) {
                summary.overdue += 1;
            }
        }
        summary
    }
}

pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<TicketListQuery>,
) -> AppResult<Json<Vec<TicketResponse>>> {
    let mut conn = state.db()?;
    let rows: Vec<Ticket> = tickets::table
        .order(tickets::created_at.desc())
        .load(&mut conn)?;
    let users_map = load_users_for_tickets(&mut conn, &rows)?;
    drop(conn);

    let today = today();
    let term = normalize_term(params.q.as_deref());

    let response = rows
        .into_iter()
        .filter(|ticket| params.bucket.matches(&ticket.status, ticket.due_date, today))
        .map(|ticket| to_ticket_response(ticket, &users_map, today))
        .filter(|ticket| term.as_deref().map_or(true, |term| ticket_matches(ticket, term)))
        .collect();

    Ok(Json(response))
}

pub async fn ticket_summary(State(state): State<AppState>) -> AppResult<Json<TicketSummary>> {
    let mut conn = state.db()?;
    let rows: Vec<(String, Option<NaiveDate>)> = tickets::table
        .select((tickets::status, tickets::due_date))
        .load(&mut conn)?;

    Ok(Json(load_summary(&rows)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<Json<TicketResponse>> {
    let mut conn = state.db()?;
    let ticket: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;
    Ok(Json(load_ticket_response(&mut conn, ticket)?))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTicketRequest>,
) -> AppResult<(StatusCode, Json<TicketResponse>)> {
    RequiredFields::new()
        .check("title", payload.title.as_deref())
        .check("description", payload.description.as_deref())
        .check("priority", payload.priority.as_deref())
        .check("category", payload.category.as_deref())
        .check("assignee", payload.assignee.as_deref())
        .finish()?;

    let priority = parse_priority(payload.priority.as_deref().unwrap_or_default())?;
    let assignee_name = payload.assignee.unwrap_or_default();
    let reporter_name = payload
        .reporter
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| user.display_name.clone());
    let due_date = payload
        .due_date
        .unwrap_or_else(|| today() + ChronoDuration::days(DEFAULT_DUE_IN_DAYS));

    let domain = state.config.placeholder_email_domain.clone();
    let mut conn = state.db()?;

    let assignee = resolve_user_by_name(&mut conn, &assignee_name, &domain).map_err(|err| {
        error!(error = %err, assignee = %assignee_name, "failed to resolve ticket assignee");
        err
    })?;
    let reporter = resolve_user_by_name(&mut conn, &reporter_name, &domain).map_err(|err| {
        error!(error = %err, reporter = %reporter_name, "failed to resolve ticket reporter");
        err
    })?;

    let new_ticket = NewTicket {
        id: Uuid::new_v4(),
        title: payload.title.unwrap_or_default().trim().to_string(),
        description: payload.description.unwrap_or_default().trim().to_string(),
        status: TicketStatus::Pending.as_str().to_string(),
        priority: priority.as_str().to_string(),
        category: payload.category.unwrap_or_default().trim().to_string(),
        assignee_id: Some(assignee.id),
        reporter_id: Some(reporter.id),
        due_date: Some(due_date),
    };

    diesel::insert_into(tickets::table)
        .values(&new_ticket)
        .execute(&mut conn)
        .map_err(|err| {
            error!(error = %err, "failed to insert ticket");
            AppError::from(err)
        })?;

    let ticket: Ticket = tickets::table.find(new_ticket.id).first(&mut conn)?;
    info!(
        ticket_id = %ticket.id,
        assignee_id = %assignee.id,
        reporter_id = %reporter.id,
        "ticket created"
    );

    let response = load_ticket_response(&mut conn, ticket)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn update_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(payload): Json<UpdateTicketRequest>,
) -> AppResult<Json<TicketResponse>> {
    let mut conn = state.db()?;
    let mut ticket: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;

    if let Some(title) = payload.title.as_deref() {
        ticket.title = require_field("title", title)?;
    }
    if let Some(description) = payload.description.as_deref() {
        ticket.description = require_field("description", description)?;
    }
    if let Some(category) = payload.category.as_deref() {
        ticket.category = require_field("category", category)?;
    }
    if let Some(status) = payload.status.as_deref() {
        let status = TicketStatus::parse(status).ok_or_else(|| {
            AppError::bad_request(format!(
                "invalid status '{}'. Allowed values: pending, in_progress, review, completed",
                status.trim()
            ))
        })?;
        ticket.status = status.as_str().to_string();
    }
    if let Some(priority) = payload.priority.as_deref() {
        ticket.priority = parse_priority(priority)?.as_str().to_string();
    }
    if let Some(due_date) = payload.due_date {
        ticket.due_date = due_date;
    }
    if let Some(assignee) = payload.assignee.as_deref() {
        let resolved =
            resolve_user_by_name(&mut conn, assignee, &state.config.placeholder_email_domain)?;
        ticket.assignee_id = Some(resolved.id);
    }

    diesel::update(tickets::table.find(ticket_id))
        .set((
            tickets::title.eq(&ticket.title),
            tickets::description.eq(&ticket.description),
            tickets::status.eq(&ticket.status),
            tickets::priority.eq(&ticket.priority),
            tickets::category.eq(&ticket.category),
            tickets::assignee_id.eq(ticket.assignee_id),
            tickets::due_date.eq(ticket.due_date),
            tickets::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let ticket: Ticket = tickets::table.find(ticket_id).first(&mut conn)?;
    info!(ticket_id = %ticket.id, status = %ticket.status, "ticket updated");
    Ok(Json(load_ticket_response(&mut conn, ticket)?))
}

pub async fn delete_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(tickets::table.find(ticket_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(ticket_id = %ticket_id, "ticket deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) fn load_summary(rows: &[(String, Option<NaiveDate>)]) -> TicketSummary {
    TicketSummary::tally(
        rows.iter().map(|(status, due)| (status.as_str(), *due)),
        today(),
    )
}

fn require_field(field: &str, value: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn load_ticket_response(conn: &mut PgConnection, ticket: Ticket) -> AppResult<TicketResponse> {
    let users_map = load_users_for_tickets(conn, std::slice::from_ref(&ticket))?;
    Ok(to_ticket_response(ticket, &users_map, today()))
}

/// Fetches every user referenced by the tickets in one query, keyed by id.
fn load_users_for_tickets(
    conn: &mut PgConnection,
    rows: &[Ticket],
) -> AppResult<HashMap<Uuid, User>> {
    let user_ids: HashSet<Uuid> = rows
        .iter()
        .flat_map(|ticket| [ticket.assignee_id, ticket.reporter_id])
        .flatten()
        .collect();

    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let ids: Vec<Uuid> = user_ids.into_iter().collect();
    let found: Vec<User> = users::table
        .filter(users::id.eq_any(ids))
        .load(conn)?;

    Ok(found.into_iter().map(|user| (user.id, user)).collect())
}

fn to_ticket_response(
    ticket: Ticket,
    users_map: &HashMap<Uuid, User>,
    today: NaiveDate,
) -> TicketResponse {
    let lookup = |id: Option<Uuid>| id.and_then(|id| users_map.get(&id)).map(TicketUser::from);
    let is_overdue = TicketBucket::Overdue.matches(&ticket.status, ticket.due_date, today);

    TicketResponse {
        id: ticket.id,
        assignee: lookup(ticket.assignee_id),
        reporter: lookup(ticket.reporter_id),
        title: ticket.title,
        description: ticket.description,
        status: ticket.status,
        priority: ticket.priority,
        category: ticket.category,
        assignee_id: ticket.assignee_id,
        reporter_id: ticket.reporter_id,
        due_date: ticket.due_date,
        is_overdue,
        created_at: to_iso(ticket.created_at),
        updated_at: to_iso(ticket.updated_at),
    }
}

fn ticket_matches(ticket: &TicketResponse, term: &str) -> bool {
    contains_ci(&ticket.title, term)
        || ticket
            .assignee
            .as_ref()
            .is_some_and(|assignee| contains_ci(&assignee.name, term))
        || contains_ci(&ticket.id.to_string(), term)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn buckets_classify_by_status_and_due_date() {
        let today = date(2024, 7, 22);
        let past = Some(date(2024, 7, 20));
        let future = Some(date(2024, 7, 29));

        assert!(TicketBucket::Active.matches("review", future, today));
        assert!(!TicketBucket::Active.matches("completed", future, today));
        assert!(TicketBucket::Completed.matches("completed", past, today));
        assert!(TicketBucket::Overdue.matches("in_progress", past, today));
        assert!(!TicketBucket::Overdue.matches("completed", past, today));
        assert!(!TicketBucket::Overdue.matches("pending", future, today));
        assert!(!TicketBucket::Overdue.matches("pending", None, today));
        assert!(!TicketBucket::Overdue.matches("pending", Some(today), today));
    }

    #[test]
    fn summary_counts_overlapping_buckets() {
        let today = date(2024, 7, 22);
        let rows = [
            ("pending", Some(date(2024, 7, 1))),
            ("in_progress", None),
            ("completed", Some(date(2024, 7, 1))),
        ];
        let summary = TicketSummary::tally(rows, today);
        assert_eq!(
            summary,
            TicketSummary {
                total: 3,
                active: 2,
                completed: 1,
                overdue: 1,
            }
        );
    }

    #[test]
    fn status_parsing_accepts_only_known_values() {
        assert_eq!(TicketStatus::parse("review"), Some(TicketStatus::Review));
        assert_eq!(TicketStatus::parse("done"), None);
        assert_eq!(TicketStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn search_matches_title_assignee_or_id() {
        let users_map = HashMap::from([(
            Uuid::nil(),
            User {
                id: Uuid::nil(),
                name: "김개발".to_string(),
                email: "dev@corp.kr".to_string(),
                auth_id: None,
                created_at: Utc::now().naive_utc(),
                updated_at: Utc::now().naive_utc(),
            },
        )]);
        let ticket = Ticket {
            id: Uuid::new_v4(),
            title: "Printer jam".to_string(),
            description: "3rd floor".to_string(),
            status: "pending".to_string(),
            priority: "low".to_string(),
            category: "hardware".to_string(),
            assignee_id: Some(Uuid::nil()),
            reporter_id: None,
            due_date: None,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        };
        let id_prefix = ticket.id.to_string()[..8].to_string();
        let response = to_ticket_response(ticket, &users_map, date(2024, 7, 22));

        assert!(ticket_matches(&response, "PRINTER"));
        assert!(ticket_matches(&response, "개발"));
        assert!(ticket_matches(&response, &id_prefix));
        assert!(!ticket_matches(&response, "network"));
        assert_eq!(response.assignee.map(|user| user.name).as_deref(), Some("김개발"));
        assert!(response.reporter.is_none());
    }
}
