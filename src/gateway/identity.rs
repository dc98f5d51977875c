//! Per-request identity headers.

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION, USER_AGENT};

use crate::constants::BROWSER_USER_AGENTS;

/// Supplies the headers attached to each request attempt.
pub trait IdentityProvider: Send + Sync {
    fn headers(&self) -> HeaderMap;
}

/// Picks a random user agent from a pool on every call.
#[derive(Debug, Clone)]
pub struct RotatingUserAgent {
    agents: Vec<HeaderValue>,
}

impl RotatingUserAgent {
    #[must_use]
    pub fn new(agents: Vec<HeaderValue>) -> Self {
        Self { agents }
    }

    /// Rotate through the built-in desktop browser user agents.
    #[must_use]
    pub fn browsers() -> Self {
        Self::new(
            BROWSER_USER_AGENTS
                .iter()
                .copied()
                .map(HeaderValue::from_static)
                .collect(),
        )
    }
}

impl IdentityProvider for RotatingUserAgent {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(agent) = self.agents.choose(&mut rand::thread_rng()) {
            headers.insert(USER_AGENT, agent.clone());
        }
        headers
    }
}

/// Fixed user agent plus a bearer token, for the authenticated API.
#[derive(Debug, Clone)]
pub struct BearerIdentity {
    user_agent: HeaderValue,
    authorization: HeaderValue,
}

impl BearerIdentity {
    /// # Errors
    ///
    /// Returns an error if the user agent or token contain characters not
    /// allowed in a header value.
    pub fn new(user_agent: &str, token: &str) -> Result<Self, InvalidHeaderValue> {
        let mut authorization = HeaderValue::from_str(&format!("bearer {token}"))?;
        authorization.set_sensitive(true);
        Ok(Self {
            user_agent: HeaderValue::from_str(user_agent)?,
            authorization,
        })
    }
}

impl IdentityProvider for BearerIdentity {
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers
    }
}
