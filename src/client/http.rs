use super::{ApiError, ApiOperation, ApiResponse, CallContext, Session, TargetApi};
use crate::config::TargetConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

/// [`TargetApi`] over HTTP.
///
/// Session lifecycle endpoints live under `/auth` on the base URL; resource
/// reads live under the configured API prefix. Every request carries the
/// `X-Probe-*` correlation headers.
pub struct HttpTargetApi {
    client: Client,
    base_url: Url,
    api_prefix: String,
    health_path: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpTargetApi {
    pub fn new(config: &TargetConfig) -> Result<Self, ApiError> {
        let base_url =
            Url::parse(&config.base_url).map_err(|e| ApiError::Transport(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_prefix: normalize_prefix(&config.api_prefix),
            health_path: config.health_path.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ApiError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let mut url = Url::parse(&joined).map_err(|e| ApiError::Transport(e.to_string()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    fn tagged(&self, builder: RequestBuilder, ctx: &CallContext, session: &Session) -> RequestBuilder {
        let builder = builder
            .header("X-Probe-VU", ctx.vu_id.to_string())
            .header("X-Probe-Iteration", ctx.iteration.to_string())
            .header("X-Probe-Load-Level", ctx.load_level.to_string());
        match &session.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<ApiResponse, ApiError> {
        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok(ApiResponse {
            status,
            body_bytes: body.len(),
        })
    }
}

#[async_trait]
impl TargetApi for HttpTargetApi {
    async fn preflight(&self) -> Result<(), ApiError> {
        let url = self.url(&self.health_path, &[])?;
        debug!(url = %url, "Preflight check");
        let resp = self.send(self.client.get(url)).await?;
        if resp.status >= 500 {
            return Err(ApiError::Rejected {
                status: resp.status,
            });
        }
        Ok(())
    }

    async fn authenticate(&self, ctx: &CallContext) -> Result<Session, ApiError> {
        let url = self.url("/auth/login", &[])?;
        let body = json!({
            "username": self.username.as_deref().unwrap_or_default(),
            "password": self.password.as_deref().unwrap_or_default(),
        });
        let builder = self.tagged(self.client.post(url).json(&body), ctx, &Session::default());
        let resp = builder.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(ApiError::Rejected { status });
        }
        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(Session {
            token: extract_token(&payload),
        })
    }

    async fn verify_session(
        &self,
        ctx: &CallContext,
        session: &Session,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url("/auth/session", &[])?;
        self.send(self.tagged(self.client.get(url), ctx, session))
            .await
    }

    async fn call(
        &self,
        ctx: &CallContext,
        session: &Session,
        op: &ApiOperation,
    ) -> Result<ApiResponse, ApiError> {
        let path = format!("{}{}", self.api_prefix, op.relative_path());
        let url = self.url(&path, op.query)?;
        self.send(self.tagged(self.client.get(url), ctx, session))
            .await
    }

    async fn logout(&self, ctx: &CallContext, session: &Session) -> Result<ApiResponse, ApiError> {
        let url = self.url("/auth/logout", &[])?;
        self.send(self.tagged(self.client.post(url), ctx, session))
            .await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else if err.is_decode() {
        ApiError::Decode(err.to_string())
    } else {
        ApiError::Transport(err.to_string())
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Pull a bearer token out of a login response.
fn extract_token(payload: &Value) -> Option<String> {
    ["token", "access_token", "accessToken"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .or_else(|| payload.get("data").and_then(|d| d.get("token")).and_then(Value::as_str))
        .map(str::to_string)
}
