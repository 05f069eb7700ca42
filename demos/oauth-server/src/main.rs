//! HighLevel OAuth Callback Server
//!
//! Runs the redirect URI listener for a marketplace app:
//! 1. `GET /` redirects the browser to the HighLevel location chooser
//! 2. `GET /oauth/callback?code=...` exchanges the code and stores the token set
//! 3. `GET /refresh` refreshes the stored token set
//! 4. `GET /status` shows what is stored
//!
//! Credentials come from the environment (or a `.env` file):
//! `GHL_API_V2_CLIENT_ID`, `GHL_API_V2_SECRET_KEY`, optionally `GHL_SCOPES`
//! and `GHL_REDIRECT_URI`.
//!
//! Run with:
//!   cargo run -p highlevel-oauth-server -- --token-file ./token.json

mod http;

use clap::Parser;
use highlevel_sdk::auth::{
    AuthorizationFlow, CallbackHandler, FileTokenStore, TokenManager, TokenRefresher, error_page,
    success_page,
};
use highlevel_sdk::utils::html_escape;
use highlevel_sdk::{ClientCredentials, HighLevelError, OAuthConfig};
use http::{Request, Response};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Local OAuth callback listener
#[derive(Parser, Debug)]
#[command(name = "highlevel-oauth-server")]
#[command(about = "Serve the OAuth redirect URI for a HighLevel marketplace app")]
struct Args {
    /// Where to persist the token set (defaults to the user config directory)
    #[arg(long, env = "GHL_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    /// Seconds a client may take to send its request head
    #[arg(long, default_value_t = 10)]
    read_timeout_secs: u64,
}

struct AppState {
    flow: AuthorizationFlow,
    handler: CallbackHandler,
    tokens: TokenManager,
    callback_path: String,
    read_timeout: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "highlevel_sdk=debug,highlevel_oauth_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let credentials = ClientCredentials::from_env()?;
    let config = OAuthConfig::default();

    let redirect = reqwest::Url::parse(credentials.redirect_uri())?;
    let port = redirect.port_or_known_default().unwrap_or(3000);
    let callback_path = redirect.path().to_string();

    let store = match args.token_file {
        Some(path) => FileTokenStore::with_path(path),
        None => FileTokenStore::new(),
    };
    tracing::info!(path = %store.path().display(), "Token storage");

    let http_client = config.http_client()?;
    let state = Arc::new(AppState {
        flow: AuthorizationFlow::new(credentials.clone(), &config)?,
        handler: CallbackHandler::with_http_client(
            credentials.clone(),
            &config,
            http_client.clone(),
        )?,
        tokens: TokenManager::new(
            Arc::new(store),
            TokenRefresher::with_http_client(credentials, &config, http_client)?,
            config.refresh_margin,
        ),
        callback_path,
        read_timeout: Duration::from_secs(args.read_timeout_secs),
    });

    let listeners = bind_loopback(port).await?;
    tracing::info!(
        "Listening on http://localhost:{port} - open it in a browser to connect an account"
    );

    let mut accept_loops = tokio::task::JoinSet::new();
    for listener in listeners {
        accept_loops.spawn(accept_loop(listener, Arc::clone(&state)));
    }
    while let Some(result) = accept_loops.join_next().await {
        result??;
    }
    Ok(())
}

/// Bind the IPv4 and IPv6 loopback addresses, since `localhost` may resolve to either
async fn bind_loopback(port: u16) -> anyhow::Result<Vec<TcpListener>> {
    let mut listeners = Vec::new();
    let mut bind_errors = Vec::new();
    for host in ["127.0.0.1", "::1"] {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => listeners.push(listener),
            Err(e) => {
                tracing::debug!(host, port, "Bind failed: {e}");
                bind_errors.push(format!("{host}:{port} ({e})"));
            }
        }
    }
    if listeners.is_empty() {
        anyhow::bail!("could not bind callback listener: {}", bind_errors.join("; "));
    }
    Ok(listeners)
}

async fn accept_loop(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = serve(stream, &state).await {
                tracing::warn!(%peer, "Connection failed: {e}");
            }
        });
    }
}

async fn serve(mut stream: TcpStream, state: &AppState) -> std::io::Result<()> {
    let Some(request) = http::read_request(&mut stream, state.read_timeout).await? else {
        return Ok(());
    };
    tracing::info!(method = %request.method, path = %request.path, "Request");

    let response = route(&request, state).await;
    http::write_response(&mut stream, response).await
}

async fn route(request: &Request, state: &AppState) -> Response {
    if request.method != "GET" {
        return Response::html(405, "<h1>Method not allowed</h1>".to_string());
    }

    match request.path.as_str() {
        "/" => Response::redirect(state.flow.authorization_url()),
        "/refresh" => refresh(state).await,
        "/status" => status(state).await,
        path if path == state.callback_path => callback(&request.query, state).await,
        _ => Response::not_found(),
    }
}

async fn callback(query: &str, state: &AppState) -> Response {
    let token = match state.handler.handle_redirect(query).await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("Authorization failed: {e}");
            return Response::html(error_status(&e), error_page(&e));
        }
    };

    if let Err(e) = state.tokens.store_initial(&token).await {
        tracing::error!("Could not persist token set: {e}");
        return Response::html(500, error_page(&e));
    }
    Response::html(200, success_page())
}

async fn refresh(state: &AppState) -> Response {
    match state.tokens.force_refresh().await {
        Ok(token) => Response::html(
            200,
            format!(
                "<h1>Token refreshed</h1><p>Account {} - expires in {}s</p>",
                html_escape(&token.account().to_string()),
                token.expires_in
            ),
        ),
        Err(e) if e.requires_reauthorization() => {
            tracing::warn!("Refresh needs a new authorization: {e}");
            Response::html(
                401,
                format!("{}<p><a href=\"/\">Connect again</a></p>", error_page(&e)),
            )
        }
        Err(e) => {
            tracing::warn!("Refresh failed: {e}");
            Response::html(error_status(&e), error_page(&e))
        }
    }
}

async fn status(state: &AppState) -> Response {
    match state.tokens.store().get_current().await {
        Ok(Some(token)) => {
            let remaining = token
                .remaining_validity()
                .map(|d| format!("{}h {}m", d.as_secs() / 3600, (d.as_secs() % 3600) / 60))
                .unwrap_or_else(|| "expired".to_string());
            Response::html(
                200,
                format!(
                    "<h1>Connected</h1><p>Account: {}</p><p>Scopes: {}</p><p>Expires in: {}</p>",
                    html_escape(&token.account().to_string()),
                    html_escape(&token.scope),
                    remaining
                ),
            )
        }
        Ok(None) => Response::html(
            200,
            "<h1>Not connected</h1><p><a href=\"/\">Connect an account</a></p>".to_string(),
        ),
        Err(e) => Response::html(500, error_page(&HighLevelError::from(e))),
    }
}

fn error_status(error: &HighLevelError) -> u16 {
    match error {
        HighLevelError::Authorization(_) => 400,
        HighLevelError::Transport(_) | HighLevelError::Api(_) => 502,
        _ => 500,
    }
}
