//! OAuth 2.0 authorization for HighLevel marketplace apps
//!
//! # Overview
//!
//! HighLevel uses the Authorization Code flow with a client secret:
//!
//! 1. [`AuthorizationFlow`] builds the URL the user visits to pick a location
//!    and grant the requested scopes
//! 2. The provider redirects to the app's redirect URI with `?code=...`
//! 3. [`CallbackHandler`] exchanges the code for a [`TokenSet`]
//! 4. The token set is persisted through a [`TokenStore`]
//! 5. [`TokenRefresher`] (usually driven by [`TokenManager`]) swaps the
//!    refresh token for a new token set before the access token expires
//!
//! # Example
//!
//! ```no_run
//! use highlevel_sdk::auth::{AuthorizationFlow, CallbackHandler, MemoryTokenStore, TokenStore};
//! use highlevel_sdk::{ClientCredentials, OAuthConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = ClientCredentials::from_env()?;
//!     let config = OAuthConfig::default();
//!
//!     let flow = AuthorizationFlow::new(credentials.clone(), &config)?;
//!     println!("Visit: {}", flow.authorization_url());
//!
//!     // Later, in the redirect route handler:
//!     let handler = CallbackHandler::new(credentials, &config)?;
//!     let token = handler.handle_redirect("code=abc123").await?;
//!
//!     let store = MemoryTokenStore::new();
//!     store.save(&token).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Refresh token rotation
//!
//! The provider may issue a new refresh token on every refresh. Always persist
//! the token set returned by the latest refresh, and never refresh the same
//! token set from two places at once; [`TokenRefresher`] and [`TokenManager`]
//! serialize refreshes for that reason.

mod callback;
mod endpoint;
mod flow;
mod manager;
mod refresh;
mod store;
mod token;

pub use callback::{CallbackHandler, CallbackParams, error_page, success_page};
pub use flow::{AuthorizationFlow, AuthorizationRequest};
pub use manager::TokenManager;
pub use refresh::TokenRefresher;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, TokenStoreError};
pub use token::{AccountContext, TokenSet, TokenState, UserType};
