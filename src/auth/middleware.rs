use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use super::cache::TokenInfo;
use crate::error::Error;
use crate::server::AppState;
use crate::types::Permissions;

/// Extractor that requires any valid API token
pub struct RequireAuth(pub TokenInfo);

/// Extractor that requires a token carrying the admin permission
pub struct RequireAdmin(pub TokenInfo);

#[derive(Debug)]
pub enum AuthError {
    MissingAuth,
    InvalidScheme,
    InvalidToken,
    TokenExpired,
    NotAdmin,
    InsufficientScope,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::InvalidScheme => (StatusCode::UNAUTHORIZED, "Invalid authorization scheme"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
            AuthError::NotAdmin => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::InsufficientScope => (StatusCode::FORBIDDEN, "Insufficient token scope"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "error": message });

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                "WWW-Authenticate",
                "Bearer realm=\"stevedore\"".parse().unwrap(),
            );
        }

        response
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_and_validate_token(parts, state)?;
        Ok(RequireAuth(token))
    }
}

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_and_validate_token(parts, state)?;

        if !token.permissions.has(Permissions::ADMIN) {
            return Err(AuthError::NotAdmin);
        }

        Ok(RequireAdmin(token))
    }
}

fn extract_and_validate_token(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<TokenInfo, AuthError> {
    let auth_header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let raw_token = extract_token_from_header(auth_header)?.ok_or(AuthError::MissingAuth)?;

    state
        .authenticator
        .authenticate(&raw_token)
        .map_err(|e| match e {
            Error::TokenExpired => AuthError::TokenExpired,
            Error::Unauthorized | Error::InvalidTokenFormat => AuthError::InvalidToken,
            _ => AuthError::InternalError,
        })
}

/// Extracts the raw token from an Authorization header: `Bearer <token>`
/// or `Basic base64(x-token:<token>)` for plain HTTP tooling.
fn extract_token_from_header(auth_header: Option<&str>) -> Result<Option<String>, AuthError> {
    match auth_header {
        Some(header) if header.starts_with("Bearer ") => Ok(Some(
            header.strip_prefix("Bearer ").unwrap().trim().to_string(),
        )),
        Some(header) if header.starts_with("Basic ") => extract_basic_auth_token(header)
            .ok_or(AuthError::InvalidToken)
            .map(Some),
        Some(_) => Err(AuthError::InvalidScheme),
        None => Ok(None),
    }
}

fn extract_basic_auth_token(header: &str) -> Option<String> {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    let encoded = header.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let (username, password) = credentials.split_once(':')?;

    if username != "x-token" {
        return None;
    }

    Some(password.to_string())
}

/// Checks a token's scope and permission for an operation. Scope and
/// permission sets are only enforced when the server runs with
/// `strict_token_scope`; otherwise any valid token passes, matching the
/// permissive default.
pub fn authorize(
    state: &AppState,
    token: &TokenInfo,
    required: Permissions,
    project_id: Option<i64>,
    app_id: Option<i64>,
) -> Result<(), AuthError> {
    if !state.strict_token_scope {
        return Ok(());
    }

    if !token.permissions.has(required) {
        return Err(AuthError::InsufficientScope);
    }

    if let Some(scope_project) = token.project_id {
        match project_id {
            Some(id) if id == scope_project => {}
            _ => return Err(AuthError::InsufficientScope),
        }
    }
    if let Some(scope_app) = token.app_id {
        match app_id {
            Some(id) if id == scope_app => {}
            _ => return Err(AuthError::InsufficientScope),
        }
    }

    Ok(())
}
