use crate::MarketplaceClient;
use monitor_core::{CoreError, ErrorExt, MarketplaceError};
use std::fmt;
use tracing::{debug, info, warn};

/// Bearer token plus the session material that goes with it. Memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    access_token: String,
    device_id: String,
    session_cookies: Option<String>,
}

impl Credential {
    pub fn new(access_token: String, device_id: String) -> Self {
        Self {
            access_token,
            device_id,
            session_cookies: None,
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn session_cookies(&self) -> Option<&str> {
        self.session_cookies.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("device_id", &self.device_id)
            .field("has_session_cookies", &self.session_cookies.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NotAuthenticated,
    /// Token obtained, session cookies still missing.
    HandshakePending,
    Authenticated,
}

/// Holds the process-wide device id and the current credential.
#[derive(Debug)]
pub struct SessionManager {
    device_id: String,
    credential: Option<Credential>,
    state: AuthState,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::with_device_id(generate_device_id())
    }

    pub fn with_device_id(device_id: String) -> Self {
        Self {
            device_id,
            credential: None,
            state: AuthState::NotAuthenticated,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn auth_state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Return the held credential, authenticating first if there is none.
    ///
    /// Never retries: a failed authentication is returned to the caller, which
    /// owns the backoff policy. A failed session handshake does not fail this
    /// call; it is attempted again on the next one.
    pub async fn ensure_credential<C>(&mut self, client: &C) -> Result<Credential, CoreError>
    where
        C: MarketplaceClient + ?Sized,
    {
        if self.credential.is_none() {
            debug!("No credential held, authenticating device {}", self.device_id);
            let token = client.authenticate(&self.device_id).await?;
            if token.trim().is_empty() {
                return Err(MarketplaceError::MissingToken.into());
            }

            info!("Authenticated with marketplace");
            self.credential = Some(Credential::new(token, self.device_id.clone()));
            self.state = AuthState::HandshakePending;
        }

        if self.state == AuthState::HandshakePending {
            self.perform_handshake(client).await;
        }

        self.credential
            .clone()
            .ok_or_else(|| CoreError::Internal {
                message: "credential missing after authentication".to_string(),
            })
    }

    /// Forget the current credential so the next call re-authenticates.
    pub fn invalidate(&mut self) {
        if self.credential.take().is_some() {
            info!("Dropping marketplace credential");
        }
        self.state = AuthState::NotAuthenticated;
    }

    async fn perform_handshake<C>(&mut self, client: &C)
    where
        C: MarketplaceClient + ?Sized,
    {
        let Some(credential) = self.credential.as_mut() else {
            return;
        };

        match client.fetch_session_cookies(credential).await {
            Ok(cookies) => {
                credential.session_cookies = Some(cookies).filter(|c| !c.is_empty());
                self.state = AuthState::Authenticated;
                debug!("Session handshake complete");
            }
            Err(e) => {
                warn!(
                    "Session handshake failed, continuing without cookies: {}",
                    e.user_friendly_message()
                );
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase hex UUID without dashes, as the iOS app sends it.
pub fn generate_device_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
