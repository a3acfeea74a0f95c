use async_trait::async_trait;
use reconcile::{AccessToken, AuthError, AuthProvider, OrganizationRecord};
use tracing::debug;

/// Hands out one configured token for every organization.
///
/// Suited to a single GitHub App installation token or a personal access
/// token supplied through the environment.
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: Option<AccessToken>,
}

impl StaticTokenAuth {
    pub fn new(token: Option<AccessToken>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn refresh_organization_auth(&self, organization: &OrganizationRecord) -> Result<AccessToken, AuthError> {
        debug!(organization = %organization.organization_name, "using configured GitHub token");
        self.token.clone().ok_or_else(|| AuthError::MissingCredentials {
            organization: organization.organization_name.clone(),
        })
    }
}
