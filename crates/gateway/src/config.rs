use std::path::PathBuf;

use anyhow::Context;

/// Environment-sourced service configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret for capability tokens and share credentials.
    pub signing_secret: String,
    /// Root directory for stored objects and multipart sessions.
    pub storage_root: PathBuf,
    /// Base URL embedded in pre-signed storage URLs.
    pub public_base_url: String,
    /// Origin(s) allowed by CORS and used to build share links.
    pub frontend_origin: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let signing_secret =
            std::env::var("SIGNING_SECRET").context("SIGNING_SECRET is required")?;

        let storage_root = std::env::var("STORAGE_ROOT")
            .unwrap_or_else(|_| "./uploads".to_string())
            .into();

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3001".to_string())
            .trim_end_matches('/')
            .to_string();

        let frontend_origin = std::env::var("FRONTEND_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let port = std::env::var("PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(3001);

        Ok(Self {
            signing_secret,
            storage_root,
            public_base_url,
            frontend_origin,
            port,
        })
    }

    /// CORS origins, comma-separated in the environment, trailing slashes
    /// stripped.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.frontend_origin
            .split(',')
            .map(|origin| origin.trim().trim_end_matches('/').to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }

    /// First configured origin, used when building share links.
    pub fn share_link_origin(&self) -> String {
        self.allowed_origins()
            .into_iter()
            .next()
            .unwrap_or_else(|| "http://localhost:3000".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_origins_splits_and_strips() {
        let config = Config {
            signing_secret: "s".into(),
            storage_root: "./uploads".into(),
            public_base_url: "http://localhost:3001".into(),
            frontend_origin: "https://a.example/, http://b.example".into(),
            port: 3001,
        };
        assert_eq!(
            config.allowed_origins(),
            vec!["https://a.example".to_string(), "http://b.example".to_string()]
        );
        assert_eq!(config.share_link_origin(), "https://a.example");
    }
}
