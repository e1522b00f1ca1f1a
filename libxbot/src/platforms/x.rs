//! X (Twitter) API v2 client
//!
//! Implements [`Platform`] against the v2 REST API with OAuth 1.0a user
//! context. Every call is one attempt bounded by the configured timeout.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::OnceCell;
use url::Url;

use crate::config::PlatformConfig;
use crate::error::{ConfigError, PlatformError, Result};
use crate::platforms::oauth::{RequestSigner, SignatureScope};
use crate::platforms::{clamp_post_count, Platform};
use crate::types::{Account, Post};

const SERVICE: &str = "X API";
const FOLLOWING_PAGE_SIZE: u32 = 100;
const TWEET_FIELDS: &str = "created_at,author_id";

/// `{ "data": ..., "meta": { "next_token": ... } }`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
    username: String,
    #[serde(default)]
    name: String,
}

impl From<UserData> for Account {
    fn from(user: UserData) -> Self {
        Account {
            platform_id: user.id,
            display_name: if user.name.is_empty() {
                user.username.clone()
            } else {
                user.name
            },
            handle: user.username,
            active: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTweet {
    id: String,
    text: String,
}

pub struct XClient {
    http: Client,
    signer: RequestSigner,
    base_url: String,
    identity: OnceCell<Account>,
}

impl XClient {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let required = [
            ("platform.consumer_key", config.consumer_key.is_empty()),
            ("platform.consumer_secret", config.consumer_secret.expose_secret().is_empty()),
            ("platform.access_token", config.access_token.is_empty()),
            ("platform.access_secret", config.access_secret.expose_secret().is_empty()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
            return Err(ConfigError::MissingField(field.to_string()).into());
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            signer: RequestSigner::from_config(config),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity: OnceCell::new(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| {
            PlatformError::Signing(format!("invalid url {}{}: {}", self.base_url, path, e))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = self.url(path, query)?;
        let auth = self.signer.authorization_header(
            Method::GET.as_str(),
            url.as_str(),
            &[],
            SignatureScope::AllParams,
        )?;

        tracing::debug!(url = %url, "GET");
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(SERVICE, status.as_u16(), body).into());
        }

        response
            .json::<T>()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()).into())
    }

    async fn fetch_identity(&self) -> Result<Account> {
        let envelope: Envelope<UserData> = self.get_json("/users/me", &[]).await?;
        let user = envelope.data.ok_or_else(|| {
            PlatformError::Decode("missing data in /users/me response".to_string())
        })?;
        Ok(user.into())
    }
}

#[async_trait]
impl Platform for XClient {
    async fn identify(&self) -> Result<Account> {
        let account = self
            .identity
            .get_or_try_init(|| async {
                let account = self.fetch_identity().await?;
                tracing::info!(
                    id = %account.platform_id,
                    handle = %account.handle,
                    "authenticated"
                );
                Ok::<_, crate::error::XbotError>(account)
            })
            .await?;
        Ok(account.clone())
    }

    async fn list_followed(&self, account_id: &str) -> Result<Vec<Account>> {
        let path = format!("/users/{}/following", account_id);
        let page_size = FOLLOWING_PAGE_SIZE.to_string();
        let mut accounts = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = vec![("max_results", page_size.as_str())];
            if let Some(token) = next_token.as_deref() {
                query.push(("pagination_token", token));
            }

            let page: Envelope<Vec<UserData>> = self.get_json(&path, &query).await?;
            accounts.extend(page.data.unwrap_or_default().into_iter().map(Account::from));

            match page.meta.and_then(|m| m.next_token) {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        tracing::debug!(account_id, total = accounts.len(), "fetched following list");
        Ok(accounts)
    }

    async fn list_posts(&self, account_id: &str, count: u32) -> Result<Vec<Post>> {
        let path = format!("/users/{}/tweets", account_id);
        let max_results = clamp_post_count(count).to_string();
        let query = [
            ("max_results", max_results.as_str()),
            ("tweet.fields", TWEET_FIELDS),
        ];

        let envelope: Envelope<Vec<Post>> = self.get_json(&path, &query).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    async fn reply(&self, post_id: &str, text: &str) -> Result<Post> {
        let url = self.url("/tweets", &[])?;
        let auth = self.signer.authorization_header(
            Method::POST.as_str(),
            url.as_str(),
            &[],
            SignatureScope::OAuthOnly,
        )?;

        let body = serde_json::json!({
            "text": text,
            "reply": { "in_reply_to_tweet_id": post_id },
        });

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, auth)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::from_status(SERVICE, status.as_u16(), body).into());
        }

        let envelope: Envelope<CreatedTweet> = response
            .json()
            .await
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        let created = envelope
            .data
            .ok_or_else(|| PlatformError::Decode("missing data in create response".to_string()))?;

        tracing::info!(in_reply_to = post_id, reply_id = %created.id, "reply posted");

        Ok(Post {
            id: created.id,
            author_id: self
                .identity
                .get()
                .map(|a| a.platform_id.clone())
                .unwrap_or_default(),
            text: created.text,
            created_at: Some(chrono::Utc::now()),
        })
    }

    fn name(&self) -> &str {
        "x"
    }
}
