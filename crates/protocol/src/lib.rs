use serde::{Deserialize, Serialize};

/// The single operation a capability token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Upload,
    UploadPart,
    Download,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Upload => "upload",
            Action::UploadPart => "uploadPart",
            Action::Download => "download",
        }
    }
}

/// Role a share credential grants. Viewer is the floor: uploader
/// credentials satisfy viewer-gated routes, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Uploader,
    Viewer,
}

impl Role {
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::Viewer => true,
            Role::Uploader => self == Role::Uploader,
        }
    }
}

/// Claim set carried by a pre-signed storage URL. `upload_id` and
/// `part_number` are present only for `Action::UploadPart`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityClaims {
    pub action: Action,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<u32>,
    pub exp: i64,
}

impl CapabilityClaims {
    /// Exact-match binding of the claims against the request's actual
    /// parameters. Signature verification proves authenticity and action
    /// only; every coordinate must also match verbatim.
    pub fn binds(&self, key: &str, upload_id: Option<&str>, part_number: Option<u32>) -> bool {
        self.key == key
            && self.upload_id.as_deref() == upload_id
            && self.part_number == part_number
    }
}

/// Claim set of a share credential: one share, one role, hard expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleClaims {
    pub share_id: String,
    pub role: Role,
    pub exp: i64,
}

impl RoleClaims {
    pub fn authorizes(&self, share_id: &str, required: Role) -> bool {
        self.share_id == share_id && self.role.satisfies(required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_strings() {
        assert_eq!(serde_json::to_string(&Action::Upload).unwrap(), "\"upload\"");
        assert_eq!(serde_json::to_string(&Action::UploadPart).unwrap(), "\"uploadPart\"");
        assert_eq!(serde_json::to_string(&Action::Download).unwrap(), "\"download\"");
    }

    #[test]
    fn capability_claims_wire_format() {
        let claims = CapabilityClaims {
            action: Action::UploadPart,
            key: "shares/abc/def".into(),
            upload_id: Some("mp-1-x".into()),
            part_number: Some(3),
            exp: 1_700_000_000,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["action"], "uploadPart");
        assert_eq!(json["uploadId"], "mp-1-x");
        assert_eq!(json["partNumber"], 3);

        let back: CapabilityClaims = serde_json::from_value(json).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn plain_claims_omit_multipart_fields() {
        let claims = CapabilityClaims {
            action: Action::Download,
            key: "shares/abc/def".into(),
            upload_id: None,
            part_number: None,
            exp: 1_700_000_000,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("uploadId").is_none());
        assert!(json.get("partNumber").is_none());
    }

    #[test]
    fn binding_requires_every_field_to_match() {
        let claims = CapabilityClaims {
            action: Action::UploadPart,
            key: "shares/a/b".into(),
            upload_id: Some("mp-1-x".into()),
            part_number: Some(2),
            exp: 0,
        };
        assert!(claims.binds("shares/a/b", Some("mp-1-x"), Some(2)));
        assert!(!claims.binds("shares/a/c", Some("mp-1-x"), Some(2)));
        assert!(!claims.binds("shares/a/b", Some("mp-1-y"), Some(2)));
        assert!(!claims.binds("shares/a/b", Some("mp-1-x"), Some(3)));
        assert!(!claims.binds("shares/a/b", None, Some(2)));
        assert!(!claims.binds("shares/a/b", Some("mp-1-x"), None));
    }

    #[test]
    fn uploader_satisfies_viewer_but_not_vice_versa() {
        assert!(Role::Uploader.satisfies(Role::Viewer));
        assert!(Role::Uploader.satisfies(Role::Uploader));
        assert!(Role::Viewer.satisfies(Role::Viewer));
        assert!(!Role::Viewer.satisfies(Role::Uploader));
    }

    #[test]
    fn authorization_is_scoped_to_one_share() {
        let claims = RoleClaims {
            share_id: "a".repeat(24),
            role: Role::Uploader,
            exp: 0,
        };
        assert!(claims.authorizes(&"a".repeat(24), Role::Uploader));
        assert!(claims.authorizes(&"a".repeat(24), Role::Viewer));
        assert!(!claims.authorizes(&"b".repeat(24), Role::Viewer));
    }
}
