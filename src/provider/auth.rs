//! Interactive OAuth login: consent URL plus one-shot redirect capture.
//!
//! Binds an ephemeral localhost port, prints the consent URL, waits for the
//! provider to redirect back with `?code=`, exchanges it, and persists the
//! tokens. The embedded server handles exactly one callback and shuts down.

use super::token::{OAuthClient, TokenStore};
use super::{ProviderError, ProviderResult};
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use std::collections::HashMap;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::info;
use uuid::Uuid;

/// Everything needed to drive one provider's consent flow.
pub struct LoginFlow {
    pub provider: String,
    /// Authorization endpoint, e.g. the Google or Microsoft consent URL.
    pub auth_url: String,
    pub scopes: String,
    pub oauth: OAuthClient,
    /// Provider-specific consent parameters (offline access etc.).
    pub extra_params: Vec<(String, String)>,
}

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    tx: mpsc::Sender<Result<String, String>>,
}

async fn callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let outcome = if params.get("state") != Some(&state.expected_state) {
        Err("state parameter mismatch".to_string())
    } else if let Some(error) = params.get("error") {
        Err(error.clone())
    } else if let Some(code) = params.get("code") {
        Ok(code.clone())
    } else {
        Err("redirect carried no code".to_string())
    };

    let authorized = outcome.is_ok();
    let _ = state.tx.send(outcome).await;
    if authorized {
        Html("<h3>Authorized. You can close this tab.</h3>")
    } else {
        Html("<h3>Authorization failed. Check the terminal.</h3>")
    }
}

/// Run the full login flow and persist the resulting tokens.
pub async fn run_login(flow: &LoginFlow, store: &TokenStore) -> ProviderResult<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    let redirect_uri = format!("http://127.0.0.1:{port}/callback");
    let expected_state = Uuid::new_v4().to_string();

    let mut consent =
        reqwest::Url::parse(&flow.auth_url).map_err(|e| ProviderError::Token(e.to_string()))?;
    {
        let mut pairs = consent.query_pairs_mut();
        pairs
            .append_pair("client_id", &flow.oauth.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &flow.scopes)
            .append_pair("state", &expected_state);
        for (key, value) in &flow.extra_params {
            pairs.append_pair(key, value);
        }
    }

    println!("Open this URL to authorize {}:\n\n{consent}\n", flow.provider);
    info!(provider = %flow.provider, %redirect_uri, "waiting for OAuth redirect");

    let (tx, mut rx) = mpsc::channel(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = Router::new().route("/callback", get(callback)).with_state(CallbackState {
        expected_state,
        tx,
    });
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = rx
        .recv()
        .await
        .ok_or_else(|| ProviderError::Token("callback channel closed".to_string()))?;
    let _ = shutdown_tx.send(());
    let _ = server.await;

    let code = outcome.map_err(ProviderError::Token)?;
    let http = reqwest::Client::new();
    let token = flow.oauth.exchange_code(&http, &code, &redirect_uri).await?;
    store.save(&flow.provider, token)?;
    info!(provider = %flow.provider, "login complete, tokens stored");
    Ok(())
}
