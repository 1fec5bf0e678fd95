//! Session Manager: credentials, access/refresh tokens and their lifetime.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use serde::Deserialize;
use std::fmt;

use crate::error::{Error, Result};
use crate::operations::{payload_error, Operation};
use crate::transport::Transport;
use crate::types::{Credentials, TemperatureUnit};

/// Remaining lifetime (seconds) below which an access token is refreshed before use.
pub const LOW_WATER_MARK_SECS: i64 = 300;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    ttl: i64,
    #[serde(default)]
    user: Option<GrantUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GrantUser {
    temperature_unit: TemperatureUnit,
}

/// What the executor is allowed to see of a session.
#[async_trait]
pub trait SessionView: Send {
    fn current_token(&self) -> Option<&str>;
    fn needs_refresh(&self) -> bool;
    async fn refresh(&mut self, transport: &dyn Transport) -> Result<()>;
    async fn authenticate(&mut self, transport: &dyn Transport) -> Result<()>;
}

pub struct Session {
    email: String,
    token: Option<String>,
    access_token: Option<String>,
    refresh_token: Option<String>,
    ttl: Option<i64>,
    last_refresh: i64,
    temperature_unit: Option<TemperatureUnit>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("email", &self.email)
            .field("has_token", &self.token.is_some())
            .field("has_access_token", &self.access_token.is_some())
            .field("ttl", &self.ttl)
            .field("last_refresh", &self.last_refresh)
            .finish()
    }
}

impl Session {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            email: credentials.email,
            token: credentials.token.filter(|t| !t.is_empty()),
            access_token: credentials.access_token.filter(|t| !t.is_empty()),
            refresh_token: credentials.refresh_token.filter(|t| !t.is_empty()),
            ttl: credentials.ttl,
            last_refresh: credentials.last_refresh,
            temperature_unit: None,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn ttl(&self) -> Option<i64> {
        self.ttl
    }

    pub fn last_refresh(&self) -> i64 {
        self.last_refresh
    }

    pub fn temperature_unit(&self) -> Option<TemperatureUnit> {
        self.temperature_unit
    }

    pub(crate) fn set_temperature_unit(&mut self, unit: TemperatureUnit) {
        self.temperature_unit = Some(unit);
    }

    /// Current token state, in the shape the caller persists across restarts.
    pub fn snapshot(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            token: self.token.clone(),
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            ttl: self.ttl,
            last_refresh: self.last_refresh,
        }
    }

    /// Forgets the token lifetime so the next remote call refreshes first.
    pub fn invalidate_ttl(&mut self) {
        self.ttl = None;
    }

    pub fn needs_refresh_at(&self, now: i64) -> bool {
        if self.access_token.is_none() {
            return false;
        }
        match self.ttl {
            Some(ttl) => ttl - (now - self.last_refresh) < LOW_WATER_MARK_SECS,
            None => true,
        }
    }

    /// Exchanges the long-lived token for a fresh access/refresh/ttl triple.
    pub async fn authenticate(&mut self, transport: &dyn Transport) -> Result<()> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| Error::Auth("A valid token or access_token is required.".to_string()))?;
        debug!("Authenticating account: {}", self.email);

        let data = transport
            .send(&Operation::sign_in(&self.email, token), None)
            .await?;
        let grant = parse_grant(&data, "signIn", "Failed to authenticate")?;

        if let Some(user) = &grant.user {
            self.temperature_unit = Some(user.temperature_unit);
        }
        self.apply(grant);
        info!("Authenticated account: {}", self.email);
        Ok(())
    }

    /// Exchanges the refresh token for a new access/refresh/ttl triple.
    pub async fn refresh(&mut self, transport: &dyn Transport) -> Result<()> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::Auth("No refresh token available".to_string()))?;
        debug!("Refreshing access token for account: {}", self.email);

        let data = transport
            .send(&Operation::refresh_token(refresh_token), None)
            .await?;
        let grant = parse_grant(&data, "refreshToken", "Failed to get new token")?;

        self.apply(grant);
        debug!("Access token refreshed, valid for {}s", self.ttl.unwrap_or_default());
        Ok(())
    }

    fn apply(&mut self, grant: TokenGrant) {
        self.last_refresh = Utc::now().timestamp();
        self.access_token = Some(grant.access_token);
        self.refresh_token = Some(grant.refresh_token);
        self.ttl = Some(grant.ttl);
    }
}

fn parse_grant(data: &serde_json::Value, field: &str, context: &str) -> Result<TokenGrant> {
    let payload = data
        .get(field)
        .filter(|p| !p.is_null())
        .ok_or_else(|| Error::Api(format!("Missing {} in response", field)))?;

    if let Some((kind, message)) = payload_error(payload) {
        error!("{}: {} ({})", context, message, kind);
        return Err(Error::Auth(message));
    }

    Ok(serde_json::from_value(payload.clone())?)
}

#[async_trait]
impl SessionView for Session {
    fn current_token(&self) -> Option<&str> {
        self.access_token()
    }

    fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now().timestamp())
    }

    async fn refresh(&mut self, transport: &dyn Transport) -> Result<()> {
        Session::refresh(self, transport).await
    }

    async fn authenticate(&mut self, transport: &dyn Transport) -> Result<()> {
        Session::authenticate(self, transport).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, MockTransport};
    use serde_json::json;

    fn session_with(ttl: Option<i64>, last_refresh: i64) -> Session {
        Session::new(Credentials {
            email: "test@example.com".to_string(),
            token: Some("T".to_string()),
            access_token: Some("A".to_string()),
            refresh_token: Some("R".to_string()),
            ttl,
            last_refresh,
        })
    }

    #[test]
    fn test_needs_refresh_low_water_mark() {
        let session = session_with(Some(3600), 1_000);

        assert!(!session.needs_refresh_at(1_000));
        assert!(!session.needs_refresh_at(1_000 + 3600 - 300));
        assert!(session.needs_refresh_at(1_000 + 3600 - 299));
        assert!(session.needs_refresh_at(1_000 + 7200));
    }

    #[test]
    fn test_needs_refresh_without_ttl_or_token() {
        let mut session = session_with(Some(3600), 1_000);
        session.invalidate_ttl();
        assert!(session.needs_refresh_at(1_000));

        let session = Session::new(Credentials::with_token("test@example.com", "T"));
        assert!(!session.needs_refresh_at(0));
    }

    #[test]
    fn test_empty_tokens_are_treated_as_missing() {
        let session = Session::new(Credentials {
            email: "test@example.com".to_string(),
            token: Some(String::new()),
            access_token: Some(String::new()),
            ..Default::default()
        });
        assert!(!session.has_token());
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_success() {
        let transport = MockTransport::new();
        transport.push_ok("signIn", mock::sign_in_success("A1", "R1", 3600));

        let mut session = Session::new(Credentials::with_token("test@example.com", "T"));
        session.authenticate(&transport).await.unwrap();

        let now = Utc::now().timestamp();
        assert_eq!(session.access_token(), Some("A1"));
        assert_eq!(session.ttl(), Some(3600));
        assert!((now - session.last_refresh()).abs() <= 1);
        assert_eq!(session.temperature_unit(), Some(TemperatureUnit::Fahrenheit));
        assert!(!SessionView::needs_refresh(&session));

        let calls = transport.calls();
        assert_eq!(calls[0].variables["input"]["token"], "T");
        assert_eq!(calls[0].variables["input"]["email"], "test@example.com");
    }

    #[tokio::test]
    async fn test_authenticate_rejected_token() {
        let transport = MockTransport::new();
        transport.push_ok(
            "signIn",
            json!({ "signIn": { "__typename": "TokenInvalid", "message": "Token is invalid" } }),
        );

        let mut session = Session::new(Credentials::with_token("test@example.com", "bad"));
        match session.authenticate(&transport).await {
            Err(Error::Auth(msg)) => assert_eq!(msg, "Token is invalid"),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert!(session.access_token().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_without_token_fails_locally() {
        let transport = MockTransport::new();
        let mut session = Session::new(Credentials {
            email: "test@example.com".to_string(),
            ..Default::default()
        });

        assert!(matches!(
            session.authenticate(&transport).await,
            Err(Error::Auth(_))
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_refresh_replaces_tokens() {
        let transport = MockTransport::new();
        transport.push_ok("refreshToken", mock::refresh_success("A2", "R2", 1800));

        let mut session = session_with(None, 0);
        assert!(SessionView::needs_refresh(&session));
        session.refresh(&transport).await.unwrap();

        assert_eq!(session.access_token(), Some("A2"));
        assert_eq!(session.snapshot().refresh_token.as_deref(), Some("R2"));
        assert_eq!(session.ttl(), Some(1800));
        assert!(!SessionView::needs_refresh(&session));
        assert_eq!(transport.calls()[0].variables["input"]["token"], "R");
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let transport = MockTransport::new();
        transport.push_ok(
            "refreshToken",
            json!({ "refreshToken": { "__typename": "TokenInvalid", "message": "expired" } }),
        );

        let mut session = session_with(Some(3600), 0);
        assert!(matches!(session.refresh(&transport).await, Err(Error::Auth(_))));
        assert_eq!(session.access_token(), Some("A"));
    }
}
