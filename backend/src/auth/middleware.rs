use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::validate_jwt;
use crate::error::SpinError;

pub async fn require_auth(mut request: Request<Body>, next: Next) -> Result<Response, Response> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match auth_header {
        Some(token) => token.trim(),
        None => return Err(SpinError::NotAuthenticated.into_response()),
    };

    match validate_jwt(token) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => Err(e.into_response()),
    }
}
