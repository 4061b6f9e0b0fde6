pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

const FALLBACK_DISPLAY_NAME: &str = "current user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub account_id: uuid::Uuid,
    pub email: String,
    pub display_name: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            account_id: claims.sub,
            email: claims.email,
            display_name: claims.name,
        })
    }
}

/// Name shown for an identity: the full name when set, otherwise the local
/// part of the email address.
pub fn display_name(full_name: Option<&str>, email: &str) -> String {
    if let Some(name) = full_name.map(str::trim).filter(|name| !name.is_empty()) {
        return name.to_string();
    }

    email
        .split('@')
        .next()
        .map(str::trim)
        .filter(|local| !local.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::display_name;

    #[test]
    fn prefers_full_name() {
        assert_eq!(display_name(Some("김개발"), "dev@corp.kr"), "김개발");
    }

    #[test]
    fn falls_back_to_email_local_part() {
        assert_eq!(display_name(Some("  "), "dev@corp.kr"), "dev");
        assert_eq!(display_name(None, "ops@corp.kr"), "ops");
    }

    #[test]
    fn falls_back_to_generic_name() {
        assert_eq!(display_name(None, "@corp.kr"), "current user");
    }
}
