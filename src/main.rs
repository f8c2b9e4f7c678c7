use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info};

use ourroots_auth::logging::init_tracing;
use ourroots_auth::notifications::NotificationCenter;
use ourroots_auth::{ApiClient, AuthClient, AuthConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if it exists
    let env_file_path = dotenvy::dotenv().ok();

    init_tracing();
    info!("ourroots-auth starting");

    match env_file_path {
        Some(path) => info!("Loaded environment variables from {}", path.display()),
        None => debug!("No .env file found. Using existing environment variables."),
    };

    let config = AuthConfig::from_env().context("Failed to load configuration")?;
    let auth = Arc::new(AuthClient::from_config(&config)?);
    let api = ApiClient::from_config(&config, auth.clone())?;

    auth.init(Some(&api)).await;
    info!(
        logged_in = auth.store().user_is_logged_in(),
        user_id = auth.store().user_id(),
        "Session loaded"
    );

    let notifications = NotificationCenter::new();
    for path in std::env::args().skip(1) {
        match api.get::<Value>(&path, &[]).await {
            Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
            Err(e) => {
                error!(path = %path, error = %e, "Request failed");
                notifications.report(format!("Unable to load {}", path), e);
            }
        }
    }

    for notification in notifications.list() {
        eprintln!("[{:?}] {}", notification.kind, notification.message);
        if notification.error.as_ref().is_some_and(|e| e.is_login_required()) {
            eprintln!("Sign in at {}", auth.login()?.url);
        }
    }

    Ok(())
}
