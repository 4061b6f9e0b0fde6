use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CalendarEvent, NewCalendarEvent};
use crate::schema::calendar_events;
use crate::state::AppState;
use crate::utils::json::nullable;
use crate::utils::time::{to_iso, today};
use crate::validation::RequiredFields;

pub const GRID_DAYS: usize = 42;
const DEFAULT_UPCOMING_LIMIT: i64 = 3;
const TIME_FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];

#[derive(Deserialize)]
pub struct EventRangeQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct MonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Deserialize)]
pub struct AgendaQuery {
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub location: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub event_type: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,
    pub event_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_time: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub end_time: Option<Option<String>>,
    pub participants: Option<Vec<String>>,
}

#[derive(Serialize, Clone)]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_type: Option<String>,
    pub location: Option<String>,
    pub event_date: NaiveDate,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub participants: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<CalendarEvent> for EventResponse {
    fn from(event: CalendarEvent) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            event_type: event.event_type,
            location: event.location,
            event_date: event.event_date,
            start_time: event.start_time.map(format_time),
            end_time: event.end_time.map(format_time),
            participants: event.participants,
            created_at: to_iso(event.created_at),
            updated_at: to_iso(event.updated_at),
        }
    }
}

#[derive(Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_current_month: bool,
    pub is_today: bool,
    pub events: Vec<EventResponse>,
}

#[derive(Serialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub days: Vec<CalendarDay>,
}

#[derive(Serialize)]
pub struct AgendaResponse {
    pub date: NaiveDate,
    pub events: Vec<EventResponse>,
    pub upcoming: Vec<EventResponse>,
}

/// The 42 consecutive dates shown for a month: six weeks starting on the
/// Sunday on or before the first day of the month.
pub fn month_grid_dates(year: i32, month: u32) -> Option<Vec<NaiveDate>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = i64::from(first.weekday().num_days_from_sunday());
    let start = first.checked_sub_signed(ChronoDuration::days(offset))?;
    (0..GRID_DAYS as i64)
        .map(|day| start.checked_add_signed(ChronoDuration::days(day)))
        .collect()
}

pub fn build_month_view(
    year: i32,
    month: u32,
    today: NaiveDate,
    events: Vec<CalendarEvent>,
) -> Option<MonthView> {
    let dates = month_grid_dates(year, month)?;

    let mut by_date: HashMap<NaiveDate, Vec<EventResponse>> = HashMap::new();
    for event in events {
        by_date
            .entry(event.event_date)
            .or_default()
            .push(EventResponse::from(event));
    }

    let days = dates
        .into_iter()
        .map(|date| CalendarDay {
            date,
            is_current_month: date.year() == year && date.month() == month,
            is_today: date == today,
            events: by_date.remove(&date).unwrap_or_default(),
        })
        .collect();

    Some(MonthView { year, month, days })
}

pub fn parse_time(field: &str, value: &str) -> AppResult<NaiveTime> {
    let trimmed = value.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| AppError::bad_request(format!("{field} must be formatted as HH:MM")))
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn parse_optional_time(field: &str, value: Option<&str>) -> AppResult<Option<NaiveTime>> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_time(field, value).map(Some),
        None => Ok(None),
    }
}

fn validate_time_range(start: Option<NaiveTime>, end: Option<NaiveTime>) -> AppResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end <= start {
            return Err(AppError::bad_request("end_time must be after start_time"));
        }
    }
    Ok(())
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn clean_participants(participants: Vec<String>) -> Vec<String> {
    participants
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<EventRangeQuery>,
) -> AppResult<Json<Vec<EventResponse>>> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if to < from {
            return Err(AppError::bad_request("to must not be before from"));
        }
    }

    let mut conn = state.db()?;
    let rows = load_events_between(&mut conn, params.from, params.to)?;
    Ok(Json(rows.into_iter().map(EventResponse::from).collect()))
}

pub async fn month_view(
    State(state): State<AppState>,
    Query(params): Query<MonthQuery>,
) -> AppResult<Json<MonthView>> {
    let today = today();
    let year = params.year.unwrap_or(today.year());
    let month = params.month.unwrap_or(today.month());

    let dates = month_grid_dates(year, month)
        .ok_or_else(|| AppError::bad_request("year and month must form a valid date"))?;
    let (first, last) = match (dates.first(), dates.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(AppError::internal("empty month grid")),
    };

    let mut conn = state.db()?;
    let events = load_events_between(&mut conn, Some(first), Some(last))?;
    drop(conn);

    build_month_view(year, month, today, events)
        .map(Json)
        .ok_or_else(|| AppError::bad_request("year and month must form a valid date"))
}

pub async fn agenda(
    State(state): State<AppState>,
    Query(params): Query<AgendaQuery>,
) -> AppResult<Json<AgendaResponse>> {
    let date = params.date.unwrap_or_else(today);
    let limit = params.limit.unwrap_or(DEFAULT_UPCOMING_LIMIT).max(0);

    let mut conn = state.db()?;
    let events = load_events_between(&mut conn, Some(date), Some(date))?;
    let upcoming: Vec<CalendarEvent> = calendar_events::table
        .filter(calendar_events::event_date.gt(date))
        .order((
            calendar_events::event_date.asc(),
            calendar_events::start_time.asc(),
        ))
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(AgendaResponse {
        date,
        events: events.into_iter().map(EventResponse::from).collect(),
        upcoming: upcoming.into_iter().map(EventResponse::from).collect(),
    }))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> AppResult<Json<EventResponse>> {
    let mut conn = state.db()?;
    let event: CalendarEvent = calendar_events::table.find(event_id).first(&mut conn)?;
    Ok(Json(event.into()))
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(payload): Json<CreateEventRequest>,
) -> AppResult<(StatusCode, Json<EventResponse>)> {
    let event_date_text = payload.event_date.map(|date| date.to_string());
    RequiredFields::new()
        .check("title", payload.title.as_deref())
        .check("event_date", event_date_text.as_deref())
        .finish()?;

    let event_date = payload
        .event_date
        .ok_or_else(|| AppError::bad_request("required fields missing: event_date"))?;
    let start_time = parse_optional_time("start_time", payload.start_time.as_deref())?;
    let end_time = parse_optional_time("end_time", payload.end_time.as_deref())?;
    validate_time_range(start_time, end_time)?;

    let new_event = NewCalendarEvent {
        id: Uuid::new_v4(),
        title: payload.title.unwrap_or_default().trim().to_string(),
        description: clean_optional(payload.description),
        event_type: clean_optional(payload.event_type),
        location: clean_optional(payload.location),
        event_date,
        start_time,
        end_time,
        participants: clean_participants(payload.participants),
    };

    let mut conn = state.db()?;
    diesel::insert_into(calendar_events::table)
        .values(&new_event)
        .execute(&mut conn)?;

    let event: CalendarEvent = calendar_events::table.find(new_event.id).first(&mut conn)?;
    info!(event_id = %event.id, date = %event.event_date, "calendar event created");
    Ok((StatusCode::CREATED, Json(event.into())))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
    Json(payload): Json<UpdateEventRequest>,
) -> AppResult<Json<EventResponse>> {
    let mut conn = state.db()?;
    let mut event: CalendarEvent = calendar_events::table.find(event_id).first(&mut conn)?;

    if let Some(title) = payload.title.as_deref() {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(AppError::bad_request("title must not be empty"));
        }
        event.title = trimmed.to_string();
    }
    if let Some(description) = payload.description {
        event.description = clean_optional(description);
    }
    if let Some(event_type) = payload.event_type {
        event.event_type = clean_optional(event_type);
    }
    if let Some(location) = payload.location {
        event.location = clean_optional(location);
    }
    if let Some(event_date) = payload.event_date {
        event.event_date = event_date;
    }
    if let Some(start_time) = payload.start_time {
        event.start_time = parse_optional_time("start_time", start_time.as_deref())?;
    }
    if let Some(end_time) = payload.end_time {
        event.end_time = parse_optional_time("end_time", end_time.as_deref())?;
    }
    if let Some(participants) = payload.participants {
        event.participants = clean_participants(participants);
    }
    validate_time_range(event.start_time, event.end_time)?;

    diesel::update(calendar_events::table.find(event_id))
        .set((
            calendar_events::title.eq(&event.title),
            calendar_events::description.eq(&event.description),
            calendar_events::event_type.eq(&event.event_type),
            calendar_events::location.eq(&event.location),
            calendar_events::event_date.eq(event.event_date),
            calendar_events::start_time.eq(event.start_time),
            calendar_events::end_time.eq(event.end_time),
            calendar_events::participants.eq(&event.participants),
            calendar_events::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(&mut conn)?;

    let event: CalendarEvent = calendar_events::table.find(event_id).first(&mut conn)?;
    Ok(Json(event.into()))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(calendar_events::table.find(event_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(event_id = %event_id, "calendar event deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Events within the inclusive date range, ordered by date then start time.
pub(crate) fn load_events_between(
    conn: &mut PgConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<Vec<CalendarEvent>> {
    let mut query = calendar_events::table.into_boxed();
    if let Some(from) = from {
        query = query.filter(calendar_events::event_date.ge(from));
    }
    if let Some(to) = to {
        query = query.filter(calendar_events::event_date.le(to));
    }

    Ok(query
        .order((
            calendar_events::event_date.asc(),
            calendar_events::start_time.asc(),
        ))
        .load(conn)?)
}
