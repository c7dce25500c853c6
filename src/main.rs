// src/main.rs
use std::sync::Arc;

use fridge_inventory::api::{self, ApiState};
use fridge_inventory::autosave::AutosaveController;
use fridge_inventory::client::BackendClient;
use fridge_inventory::config::AppConfig;
use fridge_inventory::session::{Session, SessionStore};
use fridge_inventory::status::spawn_status_poller;
use fridge_inventory::types::StandardOrder;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(err) = dotenvy::dotenv() {
        if !matches!(err, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Could not load .env: {}", err);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let app_config = AppConfig::from_env();

    let session_store = SessionStore::new(app_config.session.path());
    let session = match session_store.load().await {
        Ok(session) => session,
        Err(err) => {
            warn!("{err}; starting signed out");
            Session::default()
        }
    };

    let client = match BackendClient::new(&app_config.backend) {
        Ok(client) => client.with_token(session.token.clone()),
        Err(err) => {
            error!("Could not build the backend client: {err}");
            return;
        }
    };

    info!("Inventory service starting, backend at {}", client.base_url());

    let initial_order = load_standard_order(&client).await;
    let autosave = Arc::new(AutosaveController::new(
        Arc::new(client.clone()),
        app_config.engine.autosave_debounce(),
        initial_order,
    ));

    // Kept alive for the whole process; dropping it stops the polling.
    let status_handle = app_config.engine.status_poll_enabled().then(|| {
        spawn_status_poller(
            Arc::new(client.clone()),
            app_config.engine.status_poll_interval(),
        )
    });

    let state = ApiState::new(
        app_config.engine.clone(),
        client,
        session,
        session_store,
        autosave,
        status_handle.as_ref().map(|handle| handle.subscribe()),
    );

    api::start_api_server(app_config.api, state).await;
    drop(status_handle);
}

async fn load_standard_order(client: &BackendClient) -> StandardOrder {
    if !client.has_token() {
        info!("No session token, starting with an empty standard order");
        return StandardOrder::default();
    }

    match client.standard_products().await {
        Ok(names) => {
            // The backend tolerates case-insensitive duplicates; the editor does not.
            let mut order = StandardOrder::default();
            for name in names {
                if let Err(err) = order.push(name) {
                    warn!("Skipping standard product: {err}");
                }
            }
            info!(count = order.len(), "Standard order loaded");
            order
        }
        Err(err) => {
            warn!("Could not load the standard order: {err}");
            StandardOrder::default()
        }
    }
}
