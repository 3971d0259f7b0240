use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use dropshare_protocol::{Action, CapabilityClaims};

use crate::error::ApiError;

/// Advertised and embedded validity of a capability token.
pub const CAPABILITY_TTL_SECS: i64 = 900;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    pub url: String,
    pub method: &'static str,
    pub expires_in: i64,
}

/// Mints and verifies the signed, single-purpose tokens embedded in
/// pre-signed storage URLs. Tokens are stateless: verified by signature
/// and timestamp, never persisted. There is no single-use enforcement,
/// so replay before expiry succeeds.
pub struct CapabilityIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    base_url: String,
}

impl CapabilityIssuer {
    pub fn new(secret: &str, base_url: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn sign(&self, claims: &CapabilityClaims) -> Result<String, ApiError> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|err| ApiError::Internal(anyhow::anyhow!("capability signing failed: {err}")))
    }

    fn claims(action: Action, key: &str) -> CapabilityClaims {
        CapabilityClaims {
            action,
            key: key.to_string(),
            upload_id: None,
            part_number: None,
            exp: (Utc::now() + Duration::seconds(CAPABILITY_TTL_SECS)).timestamp(),
        }
    }

    pub fn upload_url(&self, key: &str) -> Result<PresignedUrl, ApiError> {
        let token = self.sign(&Self::claims(Action::Upload, key))?;
        Ok(PresignedUrl {
            url: format!(
                "{}/store/upload?key={}&token={}",
                self.base_url,
                urlencoding::encode(key),
                token
            ),
            method: "PUT",
            expires_in: CAPABILITY_TTL_SECS,
        })
    }

    pub fn part_url(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
    ) -> Result<PresignedUrl, ApiError> {
        let claims = CapabilityClaims {
            upload_id: Some(upload_id.to_string()),
            part_number: Some(part_number),
            ..Self::claims(Action::UploadPart, key)
        };
        let token = self.sign(&claims)?;
        Ok(PresignedUrl {
            url: format!(
                "{}/store/multipart/part?key={}&uploadId={}&partNumber={}&token={}",
                self.base_url,
                urlencoding::encode(key),
                urlencoding::encode(upload_id),
                part_number,
                token
            ),
            method: "PUT",
            expires_in: CAPABILITY_TTL_SECS,
        })
    }

    pub fn download_url(&self, key: &str) -> Result<PresignedUrl, ApiError> {
        let token = self.sign(&Self::claims(Action::Download, key))?;
        Ok(PresignedUrl {
            url: format!(
                "{}/store/download?key={}&token={}",
                self.base_url,
                urlencoding::encode(key),
                token
            ),
            method: "GET",
            expires_in: CAPABILITY_TTL_SECS,
        })
    }

    /// Proves authenticity, action and freshness only. Callers must still
    /// exact-match every claim coordinate against the request parameters
    /// via [`CapabilityClaims::binds`].
    pub fn verify(&self, token: &str, expected: Action) -> Result<CapabilityClaims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact: one second past `exp` must fail.
        validation.leeway = 0;
        let claims = decode::<CapabilityClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Forbidden("Invalid or expired token".to_string()))?;
        if claims.action != expected {
            return Err(ApiError::Forbidden("Invalid or expired token".to_string()));
        }
        Ok(claims)
    }
}
