//! Token sets issued by the HighLevel token endpoint

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Account level a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    /// Sub-account (location) token
    Location,
    /// Agency (company) token
    Company,
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Location => f.write_str("Location"),
            Self::Company => f.write_str("Company"),
        }
    }
}

/// Logical validity of a token set at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// Access token can still be used
    Valid,
    /// Access token lifetime has elapsed
    Expired,
}

/// The account a token set is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountContext {
    /// A location (sub-account) by id
    Location(String),
    /// A company (agency) by id
    Company(String),
}

impl std::fmt::Display for AccountContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Location(id) => write!(f, "location:{id}"),
            Self::Company(id) => write!(f, "company:{id}"),
        }
    }
}

/// Access/refresh token pair plus the account it was issued for
///
/// Field names follow the token endpoint's JSON keys (`userType`,
/// `locationId`, ...). `issued_at` is added locally so expiry can be
/// computed after the set has been persisted and reloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token for API calls
    pub access_token: String,

    /// Token type (always "Bearer")
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Lifetime of the access token in seconds, counted from `issued_at`
    pub expires_in: u64,

    /// Refresh token; always persist the most recent one
    #[serde(default)]
    pub refresh_token: String,

    /// Space-delimited granted scopes
    #[serde(default)]
    pub scope: String,

    /// Account level of the token
    #[serde(rename = "userType")]
    pub user_type: UserType,

    /// Location id (absent on company tokens)
    #[serde(
        rename = "locationId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub location_id: Option<String>,

    /// Company id
    #[serde(rename = "companyId", default)]
    pub company_id: String,

    /// Hashed company id
    #[serde(rename = "hashedCompanyId", default)]
    pub hashed_company_id: String,

    /// Id of the user who granted consent
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Unix timestamp at which the token endpoint issued this set
    #[serde(default = "unix_now")]
    pub issued_at: u64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    /// Parse a token endpoint response body, stamping it with `issued_at`
    ///
    /// # Errors
    ///
    /// Returns a JSON error if required keys are missing or mistyped.
    pub fn from_response(body: &str, issued_at: u64) -> Result<Self, serde_json::Error> {
        let mut token: TokenSet = serde_json::from_str(body)?;
        token.issued_at = issued_at;
        Ok(token)
    }

    /// Unix timestamp at which the access token stops being valid
    #[must_use]
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    /// Classify the token at the given unix time
    ///
    /// Expired exactly at `issued_at + expires_in`.
    #[must_use]
    pub fn state_at(&self, now: u64) -> TokenState {
        if now >= self.expires_at() {
            TokenState::Expired
        } else {
            TokenState::Valid
        }
    }

    /// Classify the token now
    #[must_use]
    pub fn state(&self) -> TokenState {
        self.state_at(unix_now())
    }

    /// Whether the token is expired at the given unix time
    #[must_use]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.state_at(now) == TokenState::Expired
    }

    /// Whether the token is expired now
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now())
    }

    /// Whether the remaining lifetime at `now` is below `margin`
    #[must_use]
    pub fn needs_refresh_at(&self, now: u64, margin: Duration) -> bool {
        now.saturating_add(margin.as_secs()) >= self.expires_at()
    }

    /// Get remaining validity duration, `None` once expired
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        let now = unix_now();
        let expires_at = self.expires_at();
        (expires_at > now).then(|| Duration::from_secs(expires_at - now))
    }

    /// Get the Authorization header value
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Granted scopes as individual strings
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    /// The account this token set is bound to
    ///
    /// Location tokens without a `locationId` fall back to the company.
    #[must_use]
    pub fn account(&self) -> AccountContext {
        match (self.user_type, &self.location_id) {
            (UserType::Location, Some(id)) if !id.is_empty() => {
                AccountContext::Location(id.clone())
            }
            _ => AccountContext::Company(self.company_id.clone()),
        }
    }

    /// Merge a refresh response into this set's identity
    ///
    /// Keeps the previous refresh token when the provider did not rotate it.
    pub(crate) fn inherit_refresh_token(mut self, previous: &str) -> Self {
        if self.refresh_token.is_empty() {
            self.refresh_token = previous.to_string();
        }
        self
    }
}
