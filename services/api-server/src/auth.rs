//! JWT issuing and verification.
//!
//! Tokens are HS256 with claims `{sub, roles, iat, exp}`. Only the configured
//! demo account can log in.

use bauxite_utils::{AuthConfig, BauxiteError, BauxiteResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expires_minutes: i64,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expires_minutes: config.jwt_expires_minutes,
        }
    }

    pub fn expires_in_seconds(&self) -> i64 {
        self.expires_minutes * 60
    }

    pub fn issue(&self, subject: &str) -> BauxiteResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            roles: vec![DEFAULT_ROLE.to_string()],
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.expires_minutes)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| BauxiteError::internal(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> BauxiteResult<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => BauxiteError::authentication("Token has expired"),
                _ => BauxiteError::authentication("Invalid token"),
            })
    }
}

/// Extracts the token from an `Authorization` value. The value must be
/// exactly two whitespace separated parts with a `bearer` scheme in any case.
pub fn bearer_token(header: &str) -> BauxiteResult<&str> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(BauxiteError::authentication(
            "Invalid authorization header format",
        )),
    }
}

pub fn credentials_match(config: &AuthConfig, username: &str, password: &str) -> bool {
    username == config.demo_username && password == config.demo_password
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_config(expires_minutes: i64) -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            jwt_expires_minutes: expires_minutes,
            demo_username: "admin".to_string(),
            demo_password: "admin".to_string(),
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let keys = JwtKeys::new(&auth_config(60));
        let token = keys.issue("admin").unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.roles, vec!["user".to_string()]);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_expired_token_rejected() {
        let keys = JwtKeys::new(&auth_config(-5));
        let token = keys.issue("admin").unwrap();
        assert_eq!(
            keys.verify(&token).unwrap_err(),
            BauxiteError::authentication("Token has expired")
        );
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let token = JwtKeys::new(&auth_config(60)).issue("admin").unwrap();
        let other = JwtKeys::new(&AuthConfig {
            jwt_secret: "another-secret".to_string(),
            ..auth_config(60)
        });
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer_token("Bearer abc").unwrap(), "abc");
        assert_eq!(bearer_token("bearer   abc").unwrap(), "abc");
        assert_eq!(bearer_token("BEARER abc").unwrap(), "abc");
        assert!(bearer_token("Bearer").is_err());
        assert!(bearer_token("Bearer abc def").is_err());
        assert!(bearer_token("Basic abc").is_err());
    }

    #[test]
    fn test_credentials() {
        let config = auth_config(60);
        assert!(credentials_match(&config, "admin", "admin"));
        assert!(!credentials_match(&config, "admin", "wrong"));
    }
}
