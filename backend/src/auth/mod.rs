use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use uuid::Uuid;

use crate::error::SpinError;

pub mod middleware;

/// Claims minted by the external identity collaborator. This service only
/// validates them; it never issues tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    #[serde(default)]
    pub privileged: bool,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub display_name: String,
    pub is_privileged: bool,
}

pub fn validate_jwt(token: &str) -> Result<AuthUser, SpinError> {
    let secret = env::var("JWT_SECRET").map_err(|_| SpinError::Corrupt("JWT_SECRET is not set"))?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| SpinError::NotAuthenticated)?;

    let id = Uuid::parse_str(&data.claims.sub).map_err(|_| SpinError::NotAuthenticated)?;

    Ok(AuthUser {
        id,
        display_name: data.claims.name,
        is_privileged: data.claims.privileged,
    })
}
