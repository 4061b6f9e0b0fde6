use axum::{extract::State, http::StatusCode, Json};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::schema::{announcements, calendar_events, documents};
use crate::state::AppState;
use crate::utils::time::to_iso;
use crate::validation::{validate_date_range, RequiredFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    Weekly,
    Monthly,
    Quarterly,
    Project,
    Custom,
}

impl ReportType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "weekly" => Some(ReportType::Weekly),
            "monthly" => Some(ReportType::Monthly),
            "quarterly" => Some(ReportType::Quarterly),
            "project" => Some(ReportType::Project),
            "custom" => Some(ReportType::Custom),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Pdf,
    Excel,
    Word,
}

#[derive(Deserialize)]
pub struct GenerateReportRequest {
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub include_documents: bool,
    #[serde(default)]
    pub include_calendar: bool,
    #[serde(default)]
    pub include_announcements: bool,
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ReportIncludes {
    pub documents: bool,
    pub calendar: bool,
    pub announcements: bool,
}

#[derive(Serialize, Default, Debug, PartialEq, Eq)]
pub struct ReportCounts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_events: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcements: Option<i64>,
}

#[derive(Serialize)]
pub struct ReportResponse {
    pub title: String,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    pub period: String,
    pub includes: ReportIncludes,
    pub counts: ReportCounts,
    pub format: ReportFormat,
    pub generated_at: String,
}

pub fn format_period(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} ~ {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
}

/// Half-open timestamp window covering every instant of both end dates.
/// `None` when the day after `end` is outside the representable range.
fn period_bounds(start: NaiveDate, end: NaiveDate) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let after_end = end.checked_add_signed(ChronoDuration::days(1))?;
    Some((
        start.and_time(NaiveTime::MIN),
        after_end.and_time(NaiveTime::MIN),
    ))
}

pub async fn generate_report(
    State(state): State<AppState>,
    Json(payload): Json<GenerateReportRequest>,
) -> AppResult<(StatusCode, Json<ReportResponse>)> {
    let start_text = payload.start_date.map(|date| date.to_string());
    let end_text = payload.end_date.map(|date| date.to_string());
    RequiredFields::new()
        .check("title", payload.title.as_deref())
        .check("type", payload.report_type.as_deref())
        .check("start_date", start_text.as_deref())
        .check("end_date", end_text.as_deref())
        .finish()?;

    let (start, end) = match (payload.start_date, payload.end_date) {
        (Some(start), Some(end)) => (start, end),
        _ => return Err(AppError::bad_request("start_date and end_date are required")),
    };
    validate_date_range(start, end)?;

    let raw_type = payload.report_type.as_deref().unwrap_or_default();
    let report_type = ReportType::parse(raw_type).ok_or_else(|| {
        AppError::bad_request(format!(
            "invalid type '{}'. Allowed values: weekly, monthly, quarterly, project, custom",
            raw_type.trim()
        ))
    })?;

    let includes = ReportIncludes {
        documents: payload.include_documents,
        calendar: payload.include_calendar,
        announcements: payload.include_announcements,
    };

    let (from_ts, to_ts) = period_bounds(start, end)
        .ok_or_else(|| AppError::bad_request("end_date is out of range"))?;
    let mut counts = ReportCounts::default();
    let mut conn = state.db()?;

    if includes.documents {
        counts.documents = Some(
            documents::table
                .filter(documents::created_at.ge(from_ts))
                .filter(documents::created_at.lt(to_ts))
                .count()
                .get_result(&mut conn)?,
        );
    }
    if includes.calendar {
        counts.calendar_events = Some(
            calendar_events::table
                .filter(calendar_events::event_date.ge(start))
                .filter(calendar_events::event_date.le(end))
                .count()
                .get_result(&mut conn)?,
        );
    }
    if includes.announcements {
        counts.announcements = Some(
            announcements::table
                .filter(announcements::created_at.ge(from_ts))
                .filter(announcements::created_at.lt(to_ts))
                .count()
                .get_result(&mut conn)?,
        );
    }

    let report = ReportResponse {
        title: payload.title.unwrap_or_default().trim().to_string(),
        report_type,
        period: format_period(start, end),
        includes,
        counts,
        format: payload.format,
        generated_at: to_iso(Utc::now().naive_utc()),
    };

    info!(
        title = %report.title,
        period = %report.period,
        format = ?report.format,
        "report generated"
    );
    Ok((StatusCode::CREATED, Json(report)))
}
