use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tokio::task;

use dropshare_protocol::{Role, RoleClaims};

use crate::error::ApiError;
use crate::metadata::is_valid_record_id;

/// Validity of a share credential.
pub const CREDENTIAL_TTL_SECS: i64 = 60 * 60;

/// Verifies bearer credentials and enforces the per-route role gate.
/// A credential is scoped to exactly one share and one role.
pub struct RoleAuthGate {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl RoleAuthGate {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, share_id: &str, role: Role) -> Result<String, ApiError> {
        let claims = RoleClaims {
            share_id: share_id.to_string(),
            role,
            exp: (Utc::now() + Duration::seconds(CREDENTIAL_TTL_SECS)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!("credential signing failed: {err}")))
    }

    /// Missing or malformed scheme is an authentication failure (401),
    /// distinct from the authorization failures raised by the gate.
    pub fn verify_bearer(&self, headers: &HeaderMap) -> Result<RoleClaims, ApiError> {
        let value = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
            })?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
        })?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<RoleClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
    }

    /// Per-route gate. The share-id shape check runs first, independent
    /// of authentication, so malformed ids short-circuit with a client
    /// error before any credential comparison.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        share_id: &str,
        required: Role,
    ) -> Result<RoleClaims, ApiError> {
        if !is_valid_record_id(share_id) {
            return Err(ApiError::Validation("Invalid share id".to_string()));
        }
        let claims = self.verify_bearer(headers)?;
        if !claims.authorizes(share_id, required) {
            return Err(ApiError::Forbidden("Forbidden".to_string()));
        }
        Ok(claims)
    }
}

pub async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_string();
    task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("password hashing worker failed: {err}")))?
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("password hashing failed: {err}")))
}

/// Timing-safe by construction of the underlying hash comparison.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let password = password.to_string();
    let hash = hash.to_string();
    task::spawn_blocking(move || match PasswordHash::new(&hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    })
    .await
    .map_err(|err| ApiError::Internal(anyhow::anyhow!("password verification worker failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> RoleAuthGate {
        RoleAuthGate::new("unit-test-secret")
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("correct horse battery").await.unwrap();
        assert!(verify_password("correct horse battery", &hash).await.unwrap());
        assert!(!verify_password("wrong password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string").await.unwrap());
    }

    #[test]
    fn uploader_credential_passes_both_gates() {
        let gate = gate();
        let share_id = "a".repeat(24);
        let token = gate.issue(&share_id, Role::Uploader).unwrap();
        let headers = bearer(&token);

        assert!(gate.authorize(&headers, &share_id, Role::Uploader).is_ok());
        assert!(gate.authorize(&headers, &share_id, Role::Viewer).is_ok());
    }

    #[test]
    fn viewer_credential_fails_the_uploader_gate() {
        let gate = gate();
        let share_id = "a".repeat(24);
        let token = gate.issue(&share_id, Role::Viewer).unwrap();
        let headers = bearer(&token);

        assert!(gate.authorize(&headers, &share_id, Role::Viewer).is_ok());
        let err = gate
            .authorize(&headers, &share_id, Role::Uploader)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn credential_is_scoped_to_its_share() {
        let gate = gate();
        let token = gate.issue(&"a".repeat(24), Role::Uploader).unwrap();
        let err = gate
            .authorize(&bearer(&token), &"b".repeat(24), Role::Viewer)
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn malformed_share_id_beats_credential_checks() {
        let gate = gate();
        let err = gate
            .authorize(&HeaderMap::new(), "not-a-share-id", Role::Viewer)
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn missing_and_malformed_bearers_are_unauthorized() {
        let gate = gate();
        let share_id = "a".repeat(24);

        let err = gate
            .authorize(&HeaderMap::new(), &share_id, Role::Viewer)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let err = gate.authorize(&headers, &share_id, Role::Viewer).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = gate
            .authorize(&bearer("garbage"), &share_id, Role::Viewer)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn credentials_from_another_secret_are_rejected() {
        let share_id = "a".repeat(24);
        let token = RoleAuthGate::new("other-secret")
            .issue(&share_id, Role::Uploader)
            .unwrap();
        let err = gate()
            .authorize(&bearer(&token), &share_id, Role::Uploader)
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
