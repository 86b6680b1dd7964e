use std::sync::Arc;
use storefront_hex::application::catalog_service::CatalogService;
use storefront_hex::application::dispatcher::NotificationDispatcher;
use storefront_hex::application::order_service::OrderService;
use storefront_hex::application::templates::NotificationTemplates;
use storefront_hex::auth::JwtKeys;
use storefront_hex::config::Config;
use storefront_hex::inbound::http::{HttpServer, HttpServerConfig};
use storefront_hex::outbound::dashboard::{DashboardHub, DashboardNotifier};
use storefront_hex::outbound::email::{outbox, run_outbox_logger};
use storefront_hex::outbound::telegram::TelegramNotifier;
use storefront_repo::{build_repo, Repo};
use storefront_types::domain::inventory::OversellPolicy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL / SERVER_PORT / JWT_SECRET when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let config = Config::from_env()?;
    let repo: Arc<Repo> = Arc::new(build_repo(config.database_url.as_deref()).await?);

    let hub = DashboardHub::default();
    let (email, mail_rx) = outbox(1024);
    tokio::spawn(run_outbox_logger(mail_rx));

    let http_client = reqwest::Client::builder()
        .timeout(config.notify.attempt_timeout)
        .build()?;
    let dispatcher = NotificationDispatcher::new(NotificationTemplates::default(), &config.notify)
        .with_notifier(Arc::new(TelegramNotifier::new(
            http_client,
            config.telegram_api_base.clone(),
            config.notify.bot_max_attempts,
        )))
        .with_notifier(Arc::new(DashboardNotifier::new(hub.clone())))
        .with_notifier(Arc::new(email));
    tracing::info!(channels = ?dispatcher.channels(), "notification channels ready");

    let oversell = if config.strict_stock {
        OversellPolicy::Reject
    } else {
        OversellPolicy::Clamp
    };
    let orders = OrderService::new(repo.clone(), Arc::new(dispatcher))
        .with_dispatch_timeout(config.notify.dispatch_timeout)
        .with_oversell(oversell);
    let catalog = CatalogService::new(repo);

    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
    };

    let http = HttpServer::new(
        orders,
        catalog,
        JwtKeys::from_secret(&config.jwt_secret),
        hub,
        server_cfg,
    )
    .await?;
    http.run().await
}
