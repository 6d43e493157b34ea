//! Octocrab-backed forge gateway.
//!
//! A thin wrapper turning [`ForgeGateway`] calls into REST requests. Errors
//! are categorized in [`super::error`] so callers can tell transient
//! infrastructure failures from permanent ones.

use octocrab::Octocrab;

use crate::types::{BranchName, RepoId};

use super::{ForgeGateway, GatewayError, NewPullRequest};

/// Forge gateway authenticated with a per-project bearer token.
#[derive(Clone)]
pub struct OctocrabForge {
    client: Octocrab,
}

impl OctocrabForge {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Convenience constructor from a personal/bearer token.
    pub fn from_token(token: impl Into<String>) -> Result<Self, GatewayError> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .build()
            .map_err(GatewayError::from_octocrab)?;
        Ok(Self::new(client))
    }
}

impl std::fmt::Debug for OctocrabForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabForge").finish_non_exhaustive()
    }
}

impl ForgeGateway for OctocrabForge {
    async fn create_pull_request(
        &self,
        repo: &RepoId,
        spec: &NewPullRequest,
    ) -> Result<u64, GatewayError> {
        let pr = self
            .client
            .pulls(&repo.owner, &repo.repo)
            .create(&spec.title, &spec.head, spec.base.as_str())
            .body(&spec.body)
            .send()
            .await
            .map_err(GatewayError::from_octocrab)?;
        Ok(pr.number)
    }

    async fn delete_branch(&self, repo: &RepoId, branch: &BranchName) -> Result<(), GatewayError> {
        let route = format!(
            "/repos/{}/{}/git/refs/heads/{}",
            repo.owner, repo.repo, branch
        );
        self.client
            ._delete(route, None::<&()>)
            .await
            .map_err(GatewayError::from_octocrab)?;
        Ok(())
    }

    async fn add_labels(
        &self,
        repo: &RepoId,
        number: u64,
        labels: &[String],
    ) -> Result<(), GatewayError> {
        self.client
            .issues(&repo.owner, &repo.repo)
            .add_labels(number, labels)
            .await
            .map_err(GatewayError::from_octocrab)?;
        Ok(())
    }

    async fn post_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.client
            .issues(&repo.owner, &repo.repo)
            .create_comment(number, body)
            .await
            .map_err(GatewayError::from_octocrab)?;
        Ok(())
    }
}
