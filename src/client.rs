//! Client session agent.
//!
//! Holds the access token for a signed-in user and attaches it to outgoing
//! requests. The refresh token lives only in the agent's cookie jar, where
//! the server put it; application code never sees it.
//!
//! When an authorised call comes back 401 the agent refreshes once and
//! retries the call once. Concurrent callers that fail together share a
//! single refresh. If the refresh itself fails the session is cleared and
//! the caller gets the original 401.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::cookie::Jar;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{AccessTokenResponse, MeResponse, SessionResponse};
use crate::auth::{REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH};
use crate::db::UserSummary;

const REGISTER_PATH: &str = "/api/auth/register";
const LOGIN_PATH: &str = "/api/auth/login";
const REFRESH_PATH: &str = "/api/auth/refresh-token";
const LOGOUT_PATH: &str = "/api/auth/logout";
const ME_PATH: &str = "/api/auth/me";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    /// The server answered with an error status.
    #[error("server returned {status}: {message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("token file error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// HTTP status for server-side errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine-readable reason sent by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    code: Option<String>,
}

#[derive(Default)]
struct AgentState {
    access_token: Option<String>,
    user: Option<UserSummary>,
}

pub struct SessionAgent {
    base: Url,
    http: reqwest::Client,
    cookies: Arc<Jar>,
    state: Mutex<AgentState>,
    /// Serialises refreshes so concurrent 401s trigger one refresh.
    refresh_lock: Mutex<()>,
    /// Where the access token is persisted between runs, if anywhere.
    token_file: Option<PathBuf>,
}

impl SessionAgent {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        let cookies = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .build()?;

        Ok(Self {
            base,
            http,
            cookies,
            state: Mutex::new(AgentState::default()),
            refresh_lock: Mutex::new(()),
            token_file: None,
        })
    }

    /// Persist the access token to `path`. The refresh token is never written.
    pub fn with_token_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_file = Some(path.into());
        self
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.lock().await.access_token.clone()
    }

    pub async fn user(&self) -> Option<UserSummary> {
        self.state.lock().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.access_token.is_some()
    }

    /// Replace the held access token.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        self.store_access_token(Some(token.into())).await;
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
    ) -> Result<UserSummary, ClientError> {
        let body = serde_json::json!({
            "name": name,
            "email": email,
            "password": password,
            "role": role,
        });
        let response = self
            .dispatch(&Method::POST, REGISTER_PATH, Some(&body), None)
            .await?;
        let session: SessionResponse = Self::decode(response).await?;

        info!(user = %session.user.id, "Registered");
        Ok(self.start_session(session).await)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserSummary, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let response = self
            .dispatch(&Method::POST, LOGIN_PATH, Some(&body), None)
            .await?;
        let session: SessionResponse = Self::decode(response).await?;

        info!(user = %session.user.id, "Logged in");
        Ok(self.start_session(session).await)
    }

    async fn start_session(&self, session: SessionResponse) -> UserSummary {
        self.store_access_token(Some(session.access_token)).await;
        self.state.lock().await.user = Some(session.user.clone());
        session.user
    }

    /// End the session on the server, then clear local state. Local state is
    /// cleared even if the server call fails.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let result = if self.is_authenticated().await {
            self.send::<Value>(Method::POST, LOGOUT_PATH, None)
                .await
                .map(|_| ())
        } else {
            Ok(())
        };

        if let Err(e) = &result {
            warn!(error = %e, "Server logout failed, clearing local session anyway");
        }

        self.clear_session().await;
        result
    }

    /// Fetch the identity of the current session.
    pub async fn me(&self) -> Result<UserSummary, ClientError> {
        let me: MeResponse = self.send(Method::GET, ME_PATH, None).await?;
        self.state.lock().await.user = Some(me.user.clone());
        Ok(me.user)
    }

    /// Load a persisted access token and check it against the server.
    ///
    /// Returns `Ok(None)` when nothing was persisted or the persisted token
    /// is no longer accepted. Anything that fails validation is cleared.
    pub async fn restore(&self) -> Result<Option<UserSummary>, ClientError> {
        let Some(path) = &self.token_file else {
            return Ok(None);
        };

        let token = match tokio::fs::read_to_string(path).await {
            Ok(token) => token.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if token.is_empty() {
            self.clear_session().await;
            return Ok(None);
        }

        self.state.lock().await.access_token = Some(token);

        match self.me().await {
            Ok(user) => Ok(Some(user)),
            Err(e @ ClientError::Api { .. }) => {
                debug!(error = %e, "Persisted session rejected");
                self.clear_session().await;
                Ok(None)
            }
            Err(e) => {
                self.clear_session().await;
                Err(e)
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let body = serde_json::to_value(body)?;
        self.send(Method::POST, path, Some(&body)).await
    }

    /// Authorised request with the refresh-and-retry protocol.
    ///
    /// At most one retry per call: a 401 on the retried request is returned
    /// as is.
    pub async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ClientError> {
        let token = self.access_token().await;
        let response = self.dispatch(&method, path, body, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        let original = Self::api_error(response).await;
        debug!(path = %path, code = ?original.code(), "Unauthorized, attempting refresh");

        let new_token = match self.refresh_after(token.as_deref()).await {
            Ok(new_token) => new_token,
            Err(e) => {
                debug!(error = %e, "Refresh failed");
                return Err(original);
            }
        };

        let response = self
            .dispatch(&method, path, body, Some(&new_token))
            .await?;
        Self::decode(response).await
    }

    /// Rotate the refresh cookie and obtain a new access token.
    /// Failure clears the session.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let held = self.access_token().await;
        self.refresh_after(held.as_deref()).await
    }

    /// Refresh unless another caller already replaced `stale` while we
    /// waited for the lock, in which case its token is reused.
    async fn refresh_after(&self, stale: Option<&str>) -> Result<String, ClientError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.access_token().await
            && Some(current.as_str()) != stale
        {
            return Ok(current);
        }

        let result = async {
            let response = self
                .dispatch(&Method::POST, REFRESH_PATH, None, None)
                .await?;
            Self::decode::<AccessTokenResponse>(response).await
        }
        .await;

        match result {
            Ok(tokens) => {
                self.store_access_token(Some(tokens.access_token.clone()))
                    .await;
                debug!("Access token refreshed");
                Ok(tokens.access_token)
            }
            Err(e) => {
                self.clear_session().await;
                Err(e)
            }
        }
    }

    /// Forget the access token, the user, the persisted file, and the
    /// refresh cookie.
    pub async fn clear_session(&self) {
        self.store_access_token(None).await;
        self.state.lock().await.user = None;

        match self.base.join(REFRESH_COOKIE_PATH) {
            Ok(url) => self.cookies.add_cookie_str(
                &format!(
                    "{}=; Max-Age=0; Path={}",
                    REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH
                ),
                &url,
            ),
            Err(e) => warn!(error = %e, "Failed to expire refresh cookie"),
        }
    }

    async fn store_access_token(&self, token: Option<String>) {
        let Some(path) = &self.token_file else {
            self.state.lock().await.access_token = token;
            return;
        };

        let result = match &token {
            Some(token) => tokio::fs::write(path, token).await,
            None => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "Failed to persist access token");
        }

        self.state.lock().await.access_token = token;
    }

    async fn dispatch(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let url = self.base.join(path)?;
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    async fn api_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let body = response.json::<ErrorBody>().await.ok();

        let (message, code) = match body {
            Some(body) => (body.error, body.code),
            None => (
                status.canonical_reason().unwrap_or("Request failed").to_string(),
                None,
            ),
        };

        ClientError::Api {
            status: status.as_u16(),
            message,
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_accessors() {
        let err = ClientError::Api {
            status: 401,
            message: "Token expired".to_string(),
            code: Some("TOKEN_EXPIRED".to_string()),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.code(), Some("TOKEN_EXPIRED"));

        let err = ClientError::Url(url::ParseError::EmptyHost);
        assert_eq!(err.status(), None);
        assert_eq!(err.code(), None);
    }

    #[tokio::test]
    async fn test_new_agent_has_no_session() {
        let agent = SessionAgent::new("http://127.0.0.1:1").unwrap();
        assert!(!agent.is_authenticated().await);
        assert!(agent.user().await.is_none());

        agent.set_access_token("abc").await;
        assert_eq!(agent.access_token().await.as_deref(), Some("abc"));

        agent.clear_session().await;
        assert!(agent.access_token().await.is_none());
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            SessionAgent::new("not a url"),
            Err(ClientError::Url(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_without_token_file() {
        let agent = SessionAgent::new("http://127.0.0.1:1").unwrap();
        assert!(agent.restore().await.unwrap().is_none());
    }
}
