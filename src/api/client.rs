use super::{ApiError, QrBackend, QueryParams};
use crate::models::{LoginResponse, QrCreateRequest, QrUpdateRequest};
use crate::session::Session;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const QR_PATH: &str = "/api/admin/qr";
pub const LOGIN_PATH: &str = "/api/admin/login";

/// Paths that must never carry a bearer credential
pub const AUTHLESS_PATHS: [&str; 2] = ["/api/user/login", "/api/admin/login"];

#[derive(Clone)]
pub struct HttpQrBackend {
    client: Client,
    base_url: String,
    session: Session,
}

impl HttpQrBackend {
    pub fn new(base_url: impl Into<String>, session: Session) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer credential unless the path is a login path
    fn authorize(&self, builder: RequestBuilder, path: &str) -> RequestBuilder {
        if AUTHLESS_PATHS.iter().any(|p| path.contains(p)) {
            return builder;
        }
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request, adopt any refreshed credential and decode the body
    async fn execute(&self, builder: RequestBuilder, path: &str) -> Result<Value, ApiError> {
        let response = self.authorize(builder, path).send().await?;
        let status = response.status();
        debug!("{} → {}", path, status);

        if status.is_success() {
            self.adopt_refreshed_token(&response);
        }

        let body = response.text().await?;
        let value = if body.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&body) {
                Ok(v) => v,
                Err(e) if status.is_success() => return Err(ApiError::Serialization(e)),
                Err(_) => Value::String(body.clone()),
            }
        };

        if status.is_success() {
            return Ok(value);
        }

        let message = error_message(&value, status);
        warn!("✗ {} failed: {} ({})", path, message, status);
        if status == StatusCode::UNAUTHORIZED {
            Err(ApiError::Unauthorized(message))
        } else {
            Err(ApiError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// A successful response may carry `Authorization: Bearer <token>` with a
    /// new credential. The request is already committed, so a failure to
    /// persist the token is only logged.
    fn adopt_refreshed_token(&self, response: &Response) {
        let refreshed = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if let Some(token) = refreshed {
            debug!("Access token refreshed from response header");
            if let Err(e) = self.session.set_token(token) {
                warn!("Failed to persist refreshed access token: {}", e);
            }
        }
    }
}

/// Pull `message` out of an error envelope, else describe the status
fn error_message(body: &Value, status: StatusCode) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!(
                "Request failed with status {}",
                status.canonical_reason().unwrap_or(status.as_str())
            )
        })
}

#[async_trait::async_trait]
impl QrBackend for HttpQrBackend {
    async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        info!("📡 POST {} as {}", LOGIN_PATH, email);
        let builder = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&serde_json::json!({ "email": email, "password": password }));
        let value = self.execute(builder, LOGIN_PATH).await?;
        let login: LoginResponse = serde_json::from_value(value)?;

        if let Some(token) = &login.access_token {
            self.session.set_token(token)?;
        }
        if let Some(refresh) = &login.refresh_token {
            self.session.set_refresh_token(refresh)?;
        }
        Ok(login)
    }

    async fn list(&self, params: &QueryParams) -> Result<Value, ApiError> {
        debug!("📡 GET {} {:?}", QR_PATH, params.pairs());
        let builder = self.client.get(self.url(QR_PATH)).query(params.pairs());
        self.execute(builder, QR_PATH).await
    }

    async fn create(&self, record: &QrCreateRequest) -> Result<Value, ApiError> {
        debug!("📡 POST {} serial={}", QR_PATH, record.serial);
        let builder = self.client.post(self.url(QR_PATH)).json(record);
        self.execute(builder, QR_PATH).await
    }

    async fn create_batch(&self, records: &[QrCreateRequest]) -> Result<Value, ApiError> {
        debug!("📡 POST {} batch of {}", QR_PATH, records.len());
        let builder = self.client.post(self.url(QR_PATH)).json(records);
        self.execute(builder, QR_PATH).await
    }

    async fn update(&self, record: &QrUpdateRequest) -> Result<Value, ApiError> {
        let path = format!("{}/{}", QR_PATH, urlencoding::encode(&record.serial));
        debug!("📡 PUT {}", path);
        let builder = self.client.put(self.url(&path)).json(record);
        self.execute(builder, &path).await
    }
}
