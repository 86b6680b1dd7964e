///  To run :
///  cargo r --example client_example
use std::sync::Arc;
use std::time::Duration;
use storefront_client::{
    CheckoutLine, CheckoutRequest, CreateProductRequest, CreateStoreRequest, StorefrontClient,
};
use storefront_hex::application::catalog_service::CatalogService;
use storefront_hex::application::dispatcher::NotificationDispatcher;
use storefront_hex::application::order_service::OrderService;
use storefront_hex::application::templates::NotificationTemplates;
use storefront_hex::auth::JwtKeys;
use storefront_hex::config::NotifySettings;
use storefront_hex::inbound::http::{HttpServer, HttpServerConfig};
use storefront_hex::outbound::dashboard::{DashboardHub, DashboardNotifier};
use storefront_repo::build_repo;
use storefront_types::domain::caller::{Caller, Role};
use storefront_types::domain::order::{Customer, OrderStatus};
use tempfile::tempdir;
use uuid::Uuid;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let port = find_free_port();
    let addr = format!("http://127.0.0.1:{port}/");

    // Use a temp file-backed SQLite DB so multiple connections see the same data.
    let tmp = tempdir()?;
    let db_path = tmp.path().join("storefront.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let repo = Arc::new(build_repo(Some(&db_url)).await?);
    let hub = DashboardHub::default();
    let dispatcher = NotificationDispatcher::new(
        NotificationTemplates::default(),
        &NotifySettings::default(),
    )
    .with_notifier(Arc::new(DashboardNotifier::new(hub.clone())));
    let keys = JwtKeys::from_secret("example-secret");

    let server = HttpServer::new(
        OrderService::new(repo.clone(), Arc::new(dispatcher)),
        CatalogService::new(repo),
        keys.clone(),
        hub,
        HttpServerConfig {
            port: port.to_string(),
        },
    )
    .await?;

    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let admin = Caller::new(Uuid::new_v4(), Role::Admin);
    let token = keys.issue(admin, Duration::from_secs(600))?;
    let client = StorefrontClient::builder(&addr)?
        .with_bearer_token(token)?
        .with_timeout(Duration::from_secs(5))
        .build()?;

    let store = client
        .create_store(&CreateStoreRequest {
            name: "Example Shop".into(),
            currency: "usd".into(),
            bot_token: None,
            admin_ids: vec![],
        })
        .await?;
    println!("Created store id={} currency={}", store.id, store.currency);

    let product = client
        .create_product(
            store.id,
            &CreateProductRequest {
                name: "Widget".into(),
                price_cents: 500,
                stock: 10,
                variants: vec![],
            },
        )
        .await?;

    let created = client
        .checkout(
            store.id,
            &CheckoutRequest {
                customer: Customer {
                    telegram_chat_id: 1001,
                    name: "Example".into(),
                    email: Some("example@example.com".into()),
                },
                items: vec![CheckoutLine {
                    product_id: product.id,
                    variant_id: None,
                    qty: 3,
                }],
            },
        )
        .await?;
    println!("Created order id={} total={}", created.id, created.total_cents);
    assert_eq!(created.status, OrderStatus::PendingAdmin);

    let order_id = Uuid::parse_str(&created.id)?;
    client.attach_payment_proof(order_id, "bank-ref-42", None).await?;
    let paid = client.verify_payment(order_id, true, None).await?;
    println!(
        "Verified: status={} notifications={}",
        paid.order.status, paid.notifications.status
    );

    let shipped = client
        .update_status(order_id, OrderStatus::Shipped, None)
        .await?;
    println!("Updated status={}", shipped.order.status);

    let products = client.list_products(store.id).await?;
    println!("Remaining stock={}", products[0].stock);
    assert_eq!(products[0].stock, 7);

    // Skipping straight back to PAID is refused by the server.
    if let Err(err) = client.update_status(order_id, OrderStatus::Paid, None).await {
        println!("Refused as expected: {err}");
    }

    handle.abort();
    Ok(())
}
