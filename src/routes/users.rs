use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::{prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::state::AppState;
use crate::utils::text::escape_like;
use crate::utils::time::to_iso;
use crate::validation::{validate_email, RequiredFields};

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserSort {
    #[default]
    Name,
    CreatedAt,
}

#[derive(Deserialize)]
pub struct UserListQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub sort: UserSort,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub auth_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            auth_id: user.auth_id,
            created_at: to_iso(user.created_at),
            updated_at: to_iso(user.updated_at),
        }
    }
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserResponse>>> {
    let mut conn = state.db()?;

    let mut query = users::table.into_boxed();

    if let Some(term) = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
    {
        let pattern = format!("%{}%", escape_like(term));
        query = query.filter(users::name.ilike(pattern.clone()).or(users::email.ilike(pattern)));
    }

    query = match params.sort {
        UserSort::Name => query.order((users::name.asc(), users::created_at.asc())),
        UserSort::CreatedAt => query.order(users::created_at.desc()),
    };

    let rows: Vec<User> = query.load(&mut conn)?;
    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    RequiredFields::new()
        .check("name", Some(&payload.name))
        .check("email", Some(&payload.email))
        .finish()?;
    validate_email(&payload.email)?;

    let name = payload.name.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    let mut conn = state.db()?;

    let existing = users::table
        .filter(users::email.eq(&email))
        .first::<User>(&mut conn)
        .optional()?;
    if existing.is_some() {
        return Err(AppError::conflict("a user with this email already exists"));
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name,
        email,
        auth_id: None,
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;

    let user: User = users::table.find(new_user.id).first(&mut conn)?;
    info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let user: User = users::table.find(user_id).first(&mut conn)?;
    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let deleted = diesel::delete(users::table.find(user_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::not_found());
    }
    info!(user_id = %user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Finds the directory user with exactly this name, inserting a placeholder
/// user when none exists. The inserted row is read back before returning.
pub(crate) fn resolve_user_by_name(
    conn: &mut PgConnection,
    name: &str,
    placeholder_domain: &str,
) -> AppResult<User> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("user name must not be empty"));
    }

    if let Some(user) = users::table
        .filter(users::name.eq(name))
        .order(users::created_at.asc())
        .first::<User>(conn)
        .optional()?
    {
        return Ok(user);
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: placeholder_email(name, placeholder_domain),
        auth_id: None,
    };
    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(conn)?;

    let confirmed = users::table
        .find(new_user.id)
        .first::<User>(conn)
        .optional()?;

    match confirmed {
        Some(user) => {
            info!(user_id = %user.id, name = %user.name, "created placeholder user");
            Ok(user)
        }
        None => {
            error!(user_id = %new_user.id, "placeholder user missing after insert");
            Err(AppError::internal("failed to create user"))
        }
    }
}

/// Derives a unique address for a user created from a bare name. ASCII
/// letters and digits from the name are kept as a readable prefix.
pub(crate) fn placeholder_email(name: &str, domain: &str) -> String {
    let slug: String = name
        .split_whitespace()
        .map(|part| {
            part.chars()
                .filter(|ch| ch.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(".");

    let suffix = Uuid::new_v4().simple().to_string();
    let suffix = &suffix[..8];

    if slug.is_empty() {
        format!("user-{suffix}@{domain}")
    } else {
        format!("{slug}-{suffix}@{domain}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_email_keeps_ascii_slug() {
        let email = placeholder_email("Jane  Doe", "portal.local");
        assert!(email.starts_with("jane.doe-"));
        assert!(email.ends_with("@portal.local"));
    }

    #[test]
    fn placeholder_email_for_non_ascii_names() {
        let email = placeholder_email("김개발", "portal.local");
        assert!(email.starts_with("user-"));
        assert!(crate::validation::EMAIL_REGEX.is_match(&email));
    }

    #[test]
    fn placeholder_emails_do_not_collide() {
        assert_ne!(
            placeholder_email("정DBA", "portal.local"),
            placeholder_email("정DBA", "portal.local")
        );
    }
}
