use axum::{extract::State, Json};
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;

use super::announcements::{load_recent, AnnouncementResponse};
use super::calendar::{load_events_between, EventResponse};
use super::tasks::TaskCounts;
use super::tickets::{load_summary, TicketSummary};
use crate::error::AppResult;
use crate::schema::{documents, tickets};
use crate::state::AppState;
use crate::utils::time::today;

const RECENT_ANNOUNCEMENTS: i64 = 5;

#[derive(Serialize)]
pub struct DashboardResponse {
    pub date: NaiveDate,
    pub tickets: TicketSummary,
    pub tasks: TaskCounts,
    pub documents: i64,
    pub announcements: Vec<AnnouncementResponse>,
    pub today_events: Vec<EventResponse>,
}

pub async fn dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardResponse>> {
    let date = today();
    let tasks = state.tasks.list().await?;

    let mut conn = state.db()?;
    let ticket_rows: Vec<(String, Option<NaiveDate>)> = tickets::table
        .select((tickets::status, tickets::due_date))
        .load(&mut conn)?;
    let documents: i64 = documents::table.count().get_result(&mut conn)?;
    let announcements = load_recent(&mut conn, RECENT_ANNOUNCEMENTS)?;
    let today_events = load_events_between(&mut conn, Some(date), Some(date))?;

    Ok(Json(DashboardResponse {
        date,
        tickets: load_summary(&ticket_rows),
        tasks: TaskCounts::tally(&tasks),
        documents,
        announcements,
        today_events: today_events.into_iter().map(EventResponse::from).collect(),
    }))
}
