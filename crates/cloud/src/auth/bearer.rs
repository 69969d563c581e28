//! OAuth2 bearer-token authentication for the Earth Engine REST API.
//!
//! The token is an access token obtained out of band (e.g. from
//! `gcloud auth print-access-token` or a service account flow).
//! Credentials can be read from environment variables:
//! - `EARTHENGINE_TOKEN`
//! - `EARTHENGINE_QUOTA_PROJECT` (optional, billed project for the request)

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Environment variable holding the access token.
pub const TOKEN_ENV: &str = "EARTHENGINE_TOKEN";
/// Environment variable holding the optional quota project.
pub const QUOTA_PROJECT_ENV: &str = "EARTHENGINE_QUOTA_PROJECT";

/// Bearer-token authentication.
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
    quota_project: Option<String>,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("token", &"<redacted>")
            .field("quota_project", &self.quota_project)
            .finish()
    }
}

impl BearerAuth {
    /// Create from an explicit access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            quota_project: None,
        }
    }

    /// Load the token (and optional quota project) from the environment.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| CloudError::Auth(format!("{TOKEN_ENV} not set")))?;
        if token.trim().is_empty() {
            return Err(CloudError::Auth(format!("{TOKEN_ENV} is empty")));
        }

        Ok(Self {
            token: token.trim().to_string(),
            quota_project: std::env::var(QUOTA_PROJECT_ENV).ok(),
        })
    }

    /// Bill requests to the given project (`x-goog-user-project`).
    pub fn with_quota_project(mut self, project: impl Into<String>) -> Self {
        self.quota_project = Some(project.into());
        self
    }
}

impl CloudAuth for BearerAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        ));

        if let Some(ref project) = self.quota_project {
            headers.push(("x-goog-user-project".to_string(), project.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_authorization_header() {
        let auth = BearerAuth::new("ya29.token");
        let mut headers = Vec::new();
        auth.sign_request("https://x", "POST", &mut headers).unwrap();
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer ya29.token".to_string())]
        );
    }

    #[test]
    fn quota_project_header_is_optional() {
        let auth = BearerAuth::new("t").with_quota_project("my-project");
        let mut headers = Vec::new();
        auth.sign_request("https://x", "POST", &mut headers).unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1].0, "x-goog-user-project");
        assert_eq!(headers[1].1, "my-project");
    }

    #[test]
    fn debug_does_not_leak_token() {
        let auth = BearerAuth::new("secret-token");
        assert!(!format!("{auth:?}").contains("secret-token"));
    }
}
