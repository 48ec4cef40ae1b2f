//! GitHub REST implementation of `RequestHost`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::RequestHost;
use crate::domain::{ChangedFile, Comment, FileStatus, RequestSnapshot, RequestStatus, Review};
use crate::error::{EarbotError, Result};

/// Default GitHub API base URL
pub const GITHUB_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;

/// Connection settings for the GitHub host
#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    /// `owner/name`
    pub repository: String,
    pub token: String,
    /// Account the bot posts as; its comments count as automated
    pub bot_login: Option<String>,
    pub timeout: Duration,
}

impl GithubConfig {
    pub fn new(repository: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: GITHUB_API_URL.to_string(),
            repository: repository.into(),
            token: token.into(),
            bot_login: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
    #[serde(rename = "type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiPull {
    number: u64,
    html_url: String,
    user: ApiUser,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    assignee: Option<ApiUser>,
    #[serde(default)]
    requested_reviewers: Vec<ApiUser>,
    state: String,
    merged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    user: Option<ApiUser>,
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    filename: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRef {
    number: u64,
}

/// GitHub REST client scoped to one repository
pub struct GithubHost {
    client: Client,
    config: GithubConfig,
    owner: String,
    name: String,
}

impl GithubHost {
    pub fn new(config: GithubConfig) -> Result<Self> {
        let (owner, name) = config
            .repository
            .split_once('/')
            .map(|(o, n)| (o.to_string(), n.to_string()))
            .ok_or_else(|| {
                EarbotError::Collaborator(format!("repository must be owner/name, got '{}'", config.repository))
            })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            owner,
            name,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_url)
            .map_err(|e| EarbotError::Collaborator(format!("bad api_url '{}': {}", self.config.api_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| EarbotError::Collaborator(format!("bad api_url '{}'", self.config.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.name.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<serde_json::Value>) -> Result<reqwest::Response> {
        debug!("{} {}", method, url);
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("GitHub API error on {} {}: {} - {}", method, url, status, error_text);
            return Err(EarbotError::Collaborator(format!(
                "GitHub API error: {} - {}",
                status, error_text
            )));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.send(Method::GET, self.url(segments)?, None).await?;
        Ok(response.json().await?)
    }

    async fn get_paged<T: DeserializeOwned>(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let mut url = self.url(segments)?;
            url.query_pairs_mut()
                .extend_pairs(query)
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let items: Vec<T> = self.send(Method::GET, url, None).await?.json().await?;
            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    fn is_automated(&self, user: &ApiUser) -> bool {
        user.kind == "Bot"
            || self
                .config
                .bot_login
                .as_deref()
                .is_some_and(|b| b.eq_ignore_ascii_case(&user.login))
    }

    fn build_snapshot(
        &self,
        pull: ApiPull,
        comments: Vec<ApiComment>,
        reviews: Vec<ApiReview>,
        files: Vec<ApiFile>,
    ) -> RequestSnapshot {
        let status = match (pull.state.as_str(), pull.merged_at) {
            (_, Some(_)) => RequestStatus::Merged,
            ("open", None) => RequestStatus::Open,
            _ => RequestStatus::Closed,
        };

        let mut comments: Vec<Comment> = comments
            .into_iter()
            .filter_map(|c| {
                let user = c.user?;
                Some(Comment {
                    automated: self.is_automated(&user),
                    author: user.login,
                    body: c.body.unwrap_or_default(),
                    created_at: c.created_at,
                })
            })
            .collect();
        comments.sort_by_key(|c| c.created_at);

        let mut reviews: Vec<Review> = reviews
            .into_iter()
            .filter_map(|r| {
                Some(Review {
                    author: r.user?.login,
                    submitted_at: r.submitted_at?,
                })
            })
            .collect();
        reviews.sort_by_key(|r| r.submitted_at);

        RequestSnapshot {
            number: pull.number,
            url: pull.html_url,
            author: pull.user.login,
            body: pull.body.unwrap_or_default(),
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            assignee: pull.assignee.map(|a| a.login),
            requested_reviewers: pull.requested_reviewers.into_iter().map(|u| u.login).collect(),
            reviews,
            comments,
            status,
            files: files
                .into_iter()
                .map(|f| ChangedFile {
                    status: FileStatus::from_host(&f.status),
                    path: f.filename,
                })
                .collect(),
            created_at: pull.created_at,
        }
    }
}

#[async_trait]
impl RequestHost for GithubHost {
    async fn snapshot(&self, number: u64) -> Result<RequestSnapshot> {
        let n = number.to_string();
        let pull: ApiPull = self.get_json(&["pulls", &n]).await?;
        let comments: Vec<ApiComment> = self.get_paged(&["issues", &n, "comments"], &[]).await?;
        let reviews: Vec<ApiReview> = self.get_paged(&["pulls", &n, "reviews"], &[]).await?;
        let files: Vec<ApiFile> = self.get_paged(&["pulls", &n, "files"], &[]).await?;
        debug!(
            "Request #{}: {} comments, {} reviews, {} files",
            number,
            comments.len(),
            reviews.len(),
            files.len()
        );
        Ok(self.build_snapshot(pull, comments, reviews, files))
    }

    async fn list_open(&self) -> Result<Vec<u64>> {
        let pulls: Vec<ApiPullRef> = self.get_paged(&["pulls"], &[("state", "open")]).await?;
        Ok(pulls.into_iter().map(|p| p.number).collect())
    }

    async fn post_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = self.url(&["issues", &number.to_string(), "comments"])?;
        self.send(Method::POST, url, Some(json!({ "body": body }))).await?;
        info!("Commented on #{}", number);
        Ok(())
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<()> {
        let url = self.url(&["issues", &number.to_string(), "labels"])?;
        self.send(Method::POST, url, Some(json!({ "labels": [label] }))).await?;
        info!("Labelled #{} with {}", number, label);
        Ok(())
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<()> {
        let url = self.url(&["issues", &number.to_string(), "labels", label])?;
        let response = self
            .client
            .delete(url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        match response.status() {
            s if s.is_success() => {
                info!("Removed label {} from #{}", label, number);
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                debug!("Label {} not present on #{}", label, number);
                Ok(())
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(EarbotError::Collaborator(format!(
                    "GitHub API error: {} - {}",
                    status, error_text
                )))
            }
        }
    }

    async fn set_assignee(&self, number: u64, login: &str) -> Result<()> {
        let url = self.url(&["issues", &number.to_string(), "assignees"])?;
        self.send(Method::POST, url, Some(json!({ "assignees": [login] }))).await?;
        info!("Assigned #{} to {}", number, login);
        Ok(())
    }

    async fn request_reviewer(&self, number: u64, login: &str) -> Result<()> {
        let url = self.url(&["pulls", &number.to_string(), "requested_reviewers"])?;
        self.send(Method::POST, url, Some(json!({ "reviewers": [login] }))).await?;
        info!("Requested review of #{} from {}", number, login);
        Ok(())
    }
}
