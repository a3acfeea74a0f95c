use async_trait::async_trait;
use reconcile::{AccessToken, AuthError, AuthProvider, OrganizationRecord};
use tracing::debug;

/// Uses the access token stored on the GitLab group record, falling back to
/// a configured token when the record carries none.
#[derive(Debug, Clone)]
pub struct OrganizationTokenAuth {
    fallback: Option<AccessToken>,
}

impl OrganizationTokenAuth {
    pub fn new(fallback: Option<AccessToken>) -> Self {
        Self { fallback }
    }
}

#[async_trait]
impl AuthProvider for OrganizationTokenAuth {
    async fn refresh_organization_auth(&self, organization: &OrganizationRecord) -> Result<AccessToken, AuthError> {
        if let Some(stored) = organization
            .installation_or_auth_token
            .clone()
            .and_then(AccessToken::new)
        {
            debug!(organization = %organization.organization_name, "using stored group token");
            return Ok(stored);
        }
        self.fallback.clone().ok_or_else(|| AuthError::MissingCredentials {
            organization: organization.organization_name.clone(),
        })
    }
}
