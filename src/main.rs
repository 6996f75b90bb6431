use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::signal;
use tracing::{error, info};

use crystal_commerce_api as api;

const EVENT_CHANNEL_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    // Event pipeline: services publish after commit, the consumer forwards
    // low-stock alerts to the configured sink.
    let (event_sender, event_receiver) = api::events::event_channel(EVENT_CHANNEL_BUFFER);
    let sink: Arc<dyn api::notifications::NotificationSink> = match &cfg.low_stock_webhook_url {
        Some(url) => {
            info!(url = %url, "low-stock webhook notifications enabled");
            Arc::new(api::notifications::WebhookSink::new(url.clone()))
        }
        None => {
            info!("low-stock webhook URL not configured; outbound notifications disabled");
            Arc::new(api::notifications::NullSink)
        }
    };
    tokio::spawn(api::events::process_events(event_receiver, sink));

    let auth_cfg = api::auth::AuthConfig {
        jwt_secret: cfg.jwt_secret.clone(),
        jwt_issuer: cfg.auth_issuer.clone(),
        jwt_audience: cfg.auth_audience.clone(),
        access_token_expiration: Duration::from_secs(cfg.jwt_expiration_secs),
    };
    let auth_service = Arc::new(api::auth::AuthService::new(auth_cfg, db.clone()));
    let admin_policy = Arc::new(api::auth::AdminPolicy::new(cfg.admin_allow_list()));

    let config = Arc::new(cfg);
    let services = api::AppServices::build(
        db.clone(),
        Some(Arc::new(event_sender)),
        config.default_currency.clone(),
    );
    let state = api::AppState::new(db, config.clone(), services);

    let app = api::app_router(state, auth_service, admin_policy);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    info!("crystal-commerce-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
