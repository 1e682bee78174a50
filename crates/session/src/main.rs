//! Session probe: sign in, call one endpoint through the gateway, print the
//! result and the landing route.
//!
//! ```text
//! RISKDESK_USER=ana RISKDESK_PASSWORD=... riskdesk-session /customers
//! ```

use anyhow::Context;

use riskdesk_observability::ObservabilityConfig;
use riskdesk_session::{SessionClient, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    riskdesk_observability::init_with(&ObservabilityConfig::from_env());

    let config = SessionConfig::from_env().context("invalid session configuration")?;
    let client = SessionClient::connect(&config)
        .await
        .context("failed to start the session client")?;

    let path = std::env::args().nth(1).unwrap_or_else(|| "/auth/validate".to_string());

    if !client.lifecycle().is_authenticated() {
        let user = std::env::var("RISKDESK_USER").context("RISKDESK_USER not set")?;
        let password = std::env::var("RISKDESK_PASSWORD").context("RISKDESK_PASSWORD not set")?;
        let profile = client
            .lifecycle()
            .login(&user, &password)
            .await
            .context("login failed")?;
        tracing::info!(username = %profile.username, roles = ?profile.role_slugs().collect::<Vec<_>>(), "signed in");
    }

    if client.lifecycle().requires_password_change() {
        tracing::warn!("password change required before the console can be used");
    }

    let response = client
        .gateway()
        .get(path.clone())
        .await
        .with_context(|| format!("GET {path} failed"))?;

    println!("{}", serde_json::to_string_pretty(&response.body)?);
    if let Some(route) = client.dashboard_route() {
        println!("landing route: {route}");
    }
    Ok(())
}
