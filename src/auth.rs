use bcrypt::{hash, verify, DEFAULT_COST};
use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey, Algorithm};
use crate::models::AuthPayload;
use std::time::{SystemTime, UNIX_EPOCH};

const DEV_SECRET: &str = "lms_dev_secret_key"; // Fallback for local runs; set LMS_JWT_SECRET in prod

fn secret() -> Vec<u8> {
    std::env::var("LMS_JWT_SECRET")
        .unwrap_or_else(|_| DEV_SECRET.to_string())
        .into_bytes()
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password, hash)
}

pub fn create_jwt(username: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0) as usize
        + 3600; // 1 hour

    let claims = AuthPayload {
        sub: username.to_owned(),
        exp: expiration,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(&secret()))
}

pub fn validate_jwt(token: &str) -> Result<AuthPayload, jsonwebtoken::errors::Error> {
    let token_data = decode::<AuthPayload>(
        token,
        &DecodingKey::from_secret(&secret()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(token_data.claims)
}
