use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::{prelude::*, PgConnection};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{display_name, password, AuthenticatedUser},
    error::{AppError, AppResult},
    mail::password_reset_mail,
    models::{Account, NewAccount, NewPasswordResetToken, NewRefreshToken, NewUser, User},
    schema::{accounts, password_reset_tokens, refresh_tokens, users},
    state::AppState,
    validation::{validate_email, validate_password, validate_signup},
};

use crate::schema::refresh_tokens::dsl as refresh_dsl;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct SignUpResponse {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> AppResult<(StatusCode, Json<SignUpResponse>)> {
    validate_signup(
        &payload.full_name,
        &payload.email,
        &payload.password,
        &payload.confirm_password,
    )?;

    let email = payload.email.trim().to_lowercase();
    let full_name = payload.full_name.trim().to_string();
    let password_hash = password::hash_password(&payload.password)?;

    let mut conn = state.db()?;
    let (account, user) = conn.transaction::<_, AppError, _>(|conn| {
        let existing = accounts::table
            .filter(accounts::email.eq(&email))
            .first::<Account>(conn)
            .optional()?;
        if existing.is_some() {
            return Err(AppError::conflict("an account with this email already exists"));
        }

        let new_account = NewAccount {
            id: Uuid::new_v4(),
            email: email.clone(),
            password_hash,
            full_name: Some(full_name.clone()),
        };
        diesel::insert_into(accounts::table)
            .values(&new_account)
            .execute(conn)?;

        let directory_entry = users::table
            .filter(users::email.eq(&email))
            .first::<User>(conn)
            .optional()?;

        let user_id = match directory_entry {
            Some(user) => {
                diesel::update(users::table.find(user.id))
                    .set((
                        users::auth_id.eq(Some(new_account.id)),
                        users::updated_at.eq(Utc::now().naive_utc()),
                    ))
                    .execute(conn)?;
                user.id
            }
            None => {
                let new_user = NewUser {
                    id: Uuid::new_v4(),
                    name: full_name.clone(),
                    email: email.clone(),
                    auth_id: Some(new_account.id),
                };
                diesel::insert_into(users::table)
                    .values(&new_user)
                    .execute(conn)?;
                new_user.id
            }
        };

        let account: Account = accounts::table.find(new_account.id).first(conn)?;
        let user: User = users::table.find(user_id).first(conn)?;
        Ok((account, user))
    })?;

    info!(account_id = %account.id, user_id = %user.id, "account signed up");

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            account_id: account.id,
            user_id: user.id,
            email: account.email,
            full_name,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.db()?;
    let email = payload.email.trim().to_lowercase();

    let account = accounts::table
        .filter(accounts::email.eq(&email))
        .first::<Account>(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &account.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        warn!(account_id = %account.id, "rejected login with invalid password");
        return Err(AppError::unauthorized());
    }

    issue_session(&state, &mut conn, &account)
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_token(refresh_value);
    let mut conn = state.db()?;
    let now_naive = Utc::now().naive_utc();

    let token = refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(&hashed))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now_naive))
        .select((refresh_dsl::id, refresh_dsl::account_id))
        .first::<(Uuid, Uuid)>(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    diesel::update(refresh_dsl::refresh_tokens.filter(refresh_dsl::id.eq(token.0)))
        .set((
            refresh_dsl::revoked_at.eq(now_naive),
            refresh_dsl::updated_at.eq(now_naive),
        ))
        .execute(&mut conn)?;

    let account: Account = accounts::table.find(token.1).first(&mut conn)?;
    issue_session(&state, &mut conn, &account)
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut rows_affected = 0;

    if let Some(cookies) = jar {
        if let Some(value) = cookies.get(REFRESH_COOKIE_NAME) {
            rows_affected = diesel::update(
                refresh_dsl::refresh_tokens
                    .filter(refresh_dsl::token_hash.eq(hash_token(value)))
                    .filter(refresh_dsl::account_id.eq(user.account_id))
                    .filter(refresh_dsl::revoked_at.is_null()),
            )
            .set((
                refresh_dsl::revoked_at.eq(now),
                refresh_dsl::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        }
    }

    if rows_affected == 0 {
        revoke_all_refresh_tokens(&mut conn, user.account_id)?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn session(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<StatusCode> {
    validate_email(&payload.email)?;
    let email = payload.email.trim().to_lowercase();

    let account = {
        let mut conn = state.db()?;
        let account = accounts::table
            .filter(accounts::email.eq(&email))
            .first::<Account>(&mut conn)
            .optional()?;

        match account {
            Some(account) => {
                let token = generate_token();
                let expires_at = Utc::now()
                    + ChronoDuration::minutes(state.config.password_reset_expiry_minutes);
                diesel::insert_into(password_reset_tokens::table)
                    .values(&NewPasswordResetToken {
                        id: Uuid::new_v4(),
                        account_id: account.id,
                        token_hash: hash_token(&token),
                        expires_at: expires_at.naive_utc(),
                    })
                    .execute(&mut conn)?;
                Some((account, token))
            }
            None => None,
        }
    };

    // Unknown addresses get the same response.
    if let Some((account, token)) = account {
        let mail = password_reset_mail(&account.email, &state.config.password_reset_url, &token);
        state.mailer.send(mail).await.map_err(|err| {
            tracing::error!(account_id = %account.id, error = %err, "failed to send password reset mail");
            AppError::internal("failed to send password reset mail")
        })?;
        info!(account_id = %account.id, "password reset mail dispatched");
    }

    Ok(StatusCode::ACCEPTED)
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> AppResult<StatusCode> {
    validate_password(&payload.password, Some(&payload.confirm_password))?;
    let new_hash = password::hash_password(&payload.password)?;
    let hashed = hash_token(payload.token.trim());

    let mut conn = state.db()?;
    let account_id = conn.transaction::<_, AppError, _>(|conn| {
        let now = Utc::now().naive_utc();
        let (token_id, account_id) = password_reset_tokens::table
            .filter(password_reset_tokens::token_hash.eq(&hashed))
            .filter(password_reset_tokens::used_at.is_null())
            .filter(password_reset_tokens::expires_at.gt(now))
            .select((password_reset_tokens::id, password_reset_tokens::account_id))
            .first::<(Uuid, Uuid)>(conn)
            .optional()?
            .ok_or_else(|| AppError::bad_request("reset token is invalid or expired"))?;

        diesel::update(password_reset_tokens::table.find(token_id))
            .set(password_reset_tokens::used_at.eq(Some(now)))
            .execute(conn)?;

        diesel::update(accounts::table.find(account_id))
            .set((
                accounts::password_hash.eq(&new_hash),
                accounts::updated_at.eq(now),
            ))
            .execute(conn)?;

        revoke_all_refresh_tokens(conn, account_id)?;
        Ok(account_id)
    })?;

    info!(account_id = %account_id, "password reset completed");
    Ok(StatusCode::NO_CONTENT)
}

fn issue_session(
    state: &AppState,
    conn: &mut PgConnection,
    account: &Account,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let name = display_name(account.full_name.as_deref(), &account.email);
    let access_token = state
        .jwt
        .generate_token(account.id, &account.email, &name)
        .map_err(AppError::from)?;

    let now = Utc::now();
    let refresh_value = generate_token();
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        account_id: account.id,
        token_hash: hash_token(&refresh_value),
        issued_at: now.naive_utc(),
        expires_at: refresh_expires_at.naive_utc(),
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(state, &refresh_value, refresh_expires_at)?,
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

fn revoke_all_refresh_tokens(conn: &mut PgConnection, account_id: Uuid) -> AppResult<usize> {
    let now = Utc::now().naive_utc();
    Ok(diesel::update(
        refresh_dsl::refresh_tokens
            .filter(refresh_dsl::account_id.eq(account_id))
            .filter(refresh_dsl::revoked_at.is_null()),
    )
    .set((
        refresh_dsl::revoked_at.eq(now),
        refresh_dsl::updated_at.eq(now),
    ))
    .execute(conn)?)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: chrono::DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();

    let mut parts = vec![format!("{}={}", REFRESH_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    append_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", REFRESH_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    append_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn append_cookie_scope(state: &AppState, parts: &mut Vec<String>) {
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_token, hash_token};

    #[test]
    fn token_hash_is_stable_hex() {
        let first = hash_token("abc");
        assert_eq!(first, hash_token("abc"));
        assert_eq!(first.len(), 64);
        assert_ne!(first, hash_token("abd"));
    }

    #[test]
    fn generated_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
    }
}
