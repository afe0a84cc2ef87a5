use async_trait::async_trait;

use crate::api::models::JobsSnapshot;
use crate::poller::{FeedError, JobFeed};

/// Fetches snapshots from `GET {base_url}/generation/jobs?brandId=…`.
pub struct HttpJobFeed {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpJobFeed {
    /// * `base_url` - e.g. `http://localhost:8080`, no trailing slash needed.
    /// * `token` - session token sent as `Authorization: Bearer …`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl JobFeed for HttpJobFeed {
    async fn fetch(&self, brand_id: &str) -> Result<JobsSnapshot, FeedError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/generation/jobs", self.base_url),
            &[("brandId", brand_id)],
        )
        .map_err(|e| FeedError::InvalidUrl(e.to_string()))?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<JobsSnapshot>().await?)
    }
}
