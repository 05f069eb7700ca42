//! # HighLevel SDK for Rust
//!
//! Rust SDK for the GoHighLevel REST API v2.
//! Async/await, strong typing, tokio-based.
//!
//! ## Quick Start
//!
//! Send the user through the OAuth authorization flow, then call the API
//! with automatically refreshed tokens:
//!
//! ```no_run
//! use highlevel_sdk::auth::{
//!     AuthorizationFlow, CallbackHandler, FileTokenStore, TokenManager, TokenRefresher,
//! };
//! use highlevel_sdk::{ClientCredentials, HighLevelClient, OAuthConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = ClientCredentials::from_env()?;
//!     let config = OAuthConfig::default();
//!
//!     // 1. Redirect the user here
//!     let flow = AuthorizationFlow::new(credentials.clone(), &config)?;
//!     println!("{}", flow.authorization_url());
//!
//!     // 2. In the redirect route, exchange the code
//!     let handler = CallbackHandler::new(credentials.clone(), &config)?;
//!     let token = handler.exchange_code("code-from-query").await?;
//!
//!     // 3. Keep tokens fresh and call the API
//!     let refresher = TokenRefresher::new(credentials, &config)?;
//!     let tokens = Arc::new(TokenManager::new(
//!         Arc::new(FileTokenStore::new()),
//!         refresher,
//!         config.refresh_margin,
//!     ));
//!     tokens.store_initial(&token).await?;
//!
//!     let client = HighLevelClient::new(tokens, &config)?;
//!     let location = client
//!         .get(&format!("locations/{}", token.location_id.unwrap_or_default()), None)
//!         .await?;
//!     println!("{}", location.text());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: client credentials, endpoints, timeouts and retry policy
//! - [`auth`]: authorization URL, code exchange, token refresh and storage
//! - [`client`]: authenticated API requests
//! - [`pagination`]: cursors over list endpoints
//! - [`error`]: error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tracing events are always emitted but are zero-cost when no subscriber is attached.
//! Tokens and client secrets are never logged. To see logs, attach a tracing
//! subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, HighLevelError>`](Result):
//!
//! ```no_run
//! # use highlevel_sdk::{HighLevelError, auth::TokenManager};
//! # async fn example(tokens: &TokenManager) {
//! match tokens.valid_token().await {
//!     Ok(token) => { /* ... */ }
//!     Err(e) if e.requires_reauthorization() => {
//!         eprintln!("Please connect the app again: {e}");
//!     }
//!     Err(e) => {
//!         eprintln!("Error: {e}");
//!     }
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod pagination;
pub mod utils;

// Re-export commonly used types
pub use auth::{
    AuthorizationFlow, CallbackHandler, TokenManager, TokenRefresher, TokenSet, TokenStore,
};
pub use client::{ApiResponse, HighLevelClient};
pub use config::{ClientCredentials, OAuthConfig, RetryPolicy};
pub use error::{ApiError, HighLevelError, ProviderError, Result};
pub use pagination::{Cursor, PageStrategy};
pub use reqwest::Method;

/// Version of the SDK
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
