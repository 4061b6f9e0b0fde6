use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Announcement, NewAnnouncement};
use crate::schema::announcements;
use crate::state::AppState;
use crate::utils::text::{contains_ci, normalize_term};
use crate::utils::time::to_iso;
use crate::validation::{parse_priority, require_non_empty, Priority, RequiredFields};

#[derive(Deserialize)]
pub struct AnnouncementListQuery {
    pub q: Option<String>,
    pub pinned: Option<bool>,
}

#[derive(Deserialize)]
pub struct CreateAnnouncementRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
}

#[derive(Deserialize)]
pub struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub priority: Option<String>,
    pub is_pinned: Option<bool>,
}

#[derive(Serialize, Clone)]
pub struct AnnouncementResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author: String,
    pub priority: String,
    pub is_pinned: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Announcement> for AnnouncementResponse {
    fn from(row: Announcement) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            author: row.author,
            priority: row.priority,
            is_pinned: row.is_pinned,
            created_at: to_iso(row.created_at),
            updated_at: to_iso(row.updated_at),
        }
    }
}

pub async fn list_announcements(
    State(state): State<AppState>,
    Query(params): Query<AnnouncementListQuery>,
) -> AppResult<Json<Vec<AnnouncementResponse>>> {
    let mut conn = state.db()?;

    let mut query = announcements::table.into_boxed();
    if let Some(pinned) = params.pinned {
        query = query.filter(announcements::is_pinned.eq(pinned));
    }

    let rows: Vec<Announcement> = query
        .order((
            announcements::is_pinned.desc(),
            announcements::created_at.desc(),
        ))
        .load(&mut conn)?;

    let term = normalize_term(params.q.as_deref());
    let response = rows
        .into_iter()
        .filter(|row| {
            term.as_deref().map_or(true, |term| {
                contains_ci(&row.title, term) || contains_ci(&row.content, term)
            })
        })
        .map(AnnouncementResponse::from)
        .collect();

    Ok(Json(response))
}

pub async fn get_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
) -> AppResult<Json<AnnouncementResponse>> {
    let mut conn = state.db()?;
    let row: Announcement = announcements::table
        .find(announcement_id)
        .first(&mut conn)?;
    Ok(Json(row.into()))
}

pub async fn create_announcement(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateAnnouncementRequest>,
) -> AppResult<(StatusCode, Json<AnnouncementResponse>)> {
    RequiredFields::new()
        .check("title", payload.title.as_deref())
        .check("content", payload.content.as_deref())
        .finish()?;

    let priority = match payload.priority.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => parse_priority(value)?,
        _ => Priority::Medium,
    };
    let author = payload
        .author
        .as_deref()
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .map(str::to_string)
        .unwrap_or(user.display_name);

    let new_row = NewAnnouncement {
        id: Uuid::new_v4(),
        title: payload.title.unwrap_or_default().trim().to_string(),
        content: payload.content.unwrap_or_default().trim().to_string(),
        author,
        priority: priority.as_str().to_string(),
        is_pinned: payload.is_pinned,
    };

    let mut conn = state.db()?;
    diesel::insert_into(announcements::table)
        .values(&new_row)
        .execute(&mut conn)?;

    let row: Announcement = announcements::table.find(new_row.id).first(&mut conn)?;
    info!(announcement_id = %row.id, pinned = row.is_pinned, "announcement created");
    Ok((StatusCode::CREATED, Json(row.into())))
}

pub async fn update_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
    Json(payload): Json<UpdateAnnouncementRequest>,
) -> AppResult<Json<AnnouncementResponse>> {
    let mut conn = state.db()?;
    let mut row: Announcement = announcements::table
        .find(announcement_id)
        .first(&mut conn)?;

    if let Some(title) = payload.title.as_deref() {
        row.title = require_non_empty("title", title)?.to_string();
    }
    if let Some(content) = payload.content.as_deref() {
        row.content = require_non_empty("content", content)?.to_string();
    }
    if let Some(author) = payload.author.as_deref() {
        row.author = require_non_empty("author", author)?.to_string();
    }
    if let Some(priority) = payload.priority.as_deref() {
        row.priority = parse_priority(priority)?.as_str().to_string();
    }
    if let Some(is_pinned) = payload.is_pinned {
        row.is_pinned = is_pinned;
    }

    diesel::update(announcements::table.find(announcement_id))
        .set((
            announcements::title.eq(&row.title),
            announcements::content.eq(&row.content),
            announcements::author.eq(&row.author),
            announcements::priority.eq(&row.priority),
            announcements::is_pinned.eq(row.is_pinned),
            announcements::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let row: Announcement = announcements::table
        .find(announcement_id)
        .first(&mut conn)?;
    Ok(Json(row.into()))
}

pub async fn delete_announcement(
    State(state): State<AppState>,
    Path(announcement_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted =
        diesel::delete(announcements::table.find(announcement_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(announcement_id = %announcement_id, "announcement deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Pinned announcements first, then newest first.
pub(crate) fn load_recent(
    conn: &mut PgConnection,
    limit: i64,
) -> AppResult<Vec<AnnouncementResponse>> {
    let rows: Vec<Announcement> = announcements::table
        .order((
            announcements::is_pinned.desc(),
            announcements::created_at.desc(),
        ))
        .limit(limit)
        .load(conn)?;
    Ok(rows.into_iter().map(AnnouncementResponse::from).collect())
}
