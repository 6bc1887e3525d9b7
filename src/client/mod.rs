//! Client for the community backend REST API.
//!
//! Attaches the stored bearer token to every request, retries transient
//! failures, renews the session once on 401/403 when a refresher is set, and
//! collapses concurrent identical reads into a single request.

mod failure;
mod retry;
mod token;

pub use failure::*;
pub use retry::*;
pub use token::*;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{Method, Response};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

type Shared = Arc<OnceCell<Result<Value, ApiFailure>>>;
type InFlight = Mutex<HashMap<String, Shared>>;

/// Drops the map entry once its request has finished, including when the
/// caller holding the guard is cancelled.
struct InFlightEntry<'a> {
    map: &'a InFlight,
    key: &'a str,
    cell: Shared,
}

impl Drop for InFlightEntry<'_> {
    fn drop(&mut self) {
        if !self.cell.initialized() {
            // another waiter takes over the initialization
            return;
        }
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.cell))
        {
            map.remove(self.key);
        }
    }
}

/// Query parameters for the member/business directory.
#[derive(Debug, Clone, Default)]
pub struct DirectoryQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub city: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl DirectoryQuery {
    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (key, value) in [
            ("search", &self.search),
            ("category", &self.category),
            ("city", &self.city),
        ] {
            if let Some(value) = value {
                pairs.push((key.to_string(), value.clone()));
            }
        }
        pairs.push(("page".to_string(), self.page.max(1).to_string()));
        pairs.push(("limit".to_string(), self.limit.max(1).to_string()));
        pairs
    }
}

fn page_query(page: u32) -> Vec<(String, String)> {
    vec![("page".to_string(), page.max(1).to_string())]
}

/// REST client for the backend.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    retry: RetryPolicy,
    in_flight: Arc<InFlight>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            refresher: None,
            retry: RetryPolicy::default(),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response, ApiFailure> {
        let mut request = self.http.request(method, self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        // read on every request so a token saved elsewhere is picked up
        if let Some(token) = self.tokens.load().await? {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn read(response: Response) -> Result<Value, ApiFailure> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiFailure::from_status(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiFailure::Decode(e.to_string()))
    }

    /// One request, plus a single replay if the session could be renewed.
    async fn send_once(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ApiFailure> {
        let response = self.dispatch(method.clone(), path, query, body).await?;
        let status = response.status().as_u16();

        if matches!(status, 401 | 403) {
            if let Some(refresher) = &self.refresher {
                match refresher.refresh().await {
                    Some(token) => {
                        tracing::info!("Session renewed after HTTP {} on {}", status, path);
                        self.tokens.save(&token).await?;
                        let replay = self.dispatch(method, path, query, body).await?;
                        return Self::read(replay).await;
                    }
                    None => tracing::warn!("Session could not be renewed for {}", path),
                }
            }
        }

        Self::read(response).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        policy: RetryPolicy,
    ) -> Result<Value, ApiFailure> {
        let this = self;
        with_retry(&policy, move || this.send_once(method.clone(), path, query, body)).await
    }

    /// GET with the configured retry policy.
    pub async fn get_json(&self, path: &str) -> Result<Value, ApiFailure> {
        self.get_with_query(path, &[]).await
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiFailure> {
        self.request(Method::GET, path, query, None, self.retry).await
    }

    /// POST is not retried, the backend may already have applied it.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiFailure> {
        self.request(Method::POST, path, &[], Some(body), RetryPolicy::none())
            .await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Result<Value, ApiFailure> {
        self.request(Method::PUT, path, &[], Some(body), self.retry)
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiFailure> {
        self.request(Method::DELETE, path, &[], None, self.retry)
            .await
    }

    /// GET that shares one in-flight request between all concurrent callers using `key`.
    pub async fn get_cached(
        &self,
        key: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, ApiFailure> {
        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let entry = InFlightEntry {
            map: &self.in_flight,
            key,
            cell,
        };

        let result = entry
            .cell
            .get_or_init(|| self.get_with_query(path, query))
            .await
            .clone();
        drop(entry);
        result
    }

    /// POST /api/auth/login and store the returned token.
    pub async fn login(&self, email: &str, password: &str) -> Result<Value, ApiFailure> {
        let response = self
            .post_json(
                "/api/auth/login",
                &json!({ "email": email, "password": password }),
            )
            .await?;

        let token = response
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiFailure::Decode("login response has no token".to_string()))?;
        self.tokens.save(token).await?;

        Ok(response)
    }

    pub async fn logout(&self) -> Result<(), ApiFailure> {
        self.tokens.clear().await?;
        Ok(())
    }

    /// GET /api/auth/me - The signed-in user.
    pub async fn current_user(&self) -> Result<Value, ApiFailure> {
        self.get_json("/api/auth/me").await
    }

    pub async fn profile(&self) -> Result<Value, ApiFailure> {
        self.get_json("/api/profile").await
    }

    pub async fn update_profile(&self, profile: &Value) -> Result<Value, ApiFailure> {
        self.put_json("/api/profile", profile).await
    }

    pub async fn directory(&self, query: &DirectoryQuery) -> Result<Value, ApiFailure> {
        let pairs = query.pairs();
        let key = format!(
            "directory?{}",
            pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        );
        self.get_cached(&key, "/api/directory", &pairs).await
    }

    pub async fn listings(&self, page: u32) -> Result<Value, ApiFailure> {
        self.get_with_query("/api/listings", &page_query(page)).await
    }

    pub async fn listing(&self, id: &str) -> Result<Value, ApiFailure> {
        self.get_json(&format!("/api/listings/{}", id)).await
    }

    pub async fn user(&self, id: &str) -> Result<Value, ApiFailure> {
        self.get_cached(&format!("user:{}", id), &format!("/api/users/{}", id), &[])
            .await
    }

    pub async fn questions(&self, page: u32) -> Result<Value, ApiFailure> {
        self.get_with_query("/questions", &page_query(page)).await
    }

    pub async fn answers(&self, question_id: &str) -> Result<Value, ApiFailure> {
        self.get_with_query(
            "/answers",
            &[("questionId".to_string(), question_id.to_string())],
        )
        .await
    }

    pub async fn news(&self, page: u32) -> Result<Value, ApiFailure> {
        self.get_with_query("/news", &page_query(page)).await
    }
}
