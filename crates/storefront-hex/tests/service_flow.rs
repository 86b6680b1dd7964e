use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use storefront_hex::application::dispatcher::NotificationDispatcher;
use storefront_hex::application::order_service::{CheckoutLine, NotificationStatus, OrderService};
use storefront_hex::application::templates::NotificationTemplates;
use storefront_hex::config::NotifySettings;
use storefront_hex::errors::AppError;
use storefront_repo::memory::InMemoryRepo;
use storefront_types::domain::caller::{Caller, Role};
use storefront_types::domain::inventory::OversellPolicy;
use storefront_types::domain::notification::StatusChanged;
use storefront_types::domain::order::{Customer, OrderStatus};
use storefront_types::domain::store::{NewVariant, Product, Store};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::notifier::{Notifier, NotifyError};
use uuid::Uuid;

struct Recording {
    calls: AtomicU32,
}

#[async_trait]
impl Notifier for Recording {
    fn channel(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, _event: &StatusChanged) -> Result<bool, NotifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct Down;

#[async_trait]
impl Notifier for Down {
    fn channel(&self) -> &'static str {
        "telegram"
    }

    fn max_attempts(&self) -> u32 {
        3
    }

    async fn notify(&self, _event: &StatusChanged) -> Result<bool, NotifyError> {
        Err(NotifyError::Unavailable("bot api down".into()))
    }
}

struct Slow;

#[async_trait]
impl Notifier for Slow {
    fn channel(&self) -> &'static str {
        "slow"
    }

    async fn notify(&self, _event: &StatusChanged) -> Result<bool, NotifyError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(true)
    }
}

fn settings() -> NotifySettings {
    NotifySettings {
        dispatch_timeout: Duration::from_millis(100),
        attempt_timeout: Duration::from_secs(1),
        bot_max_attempts: 3,
        backoff: Duration::from_millis(1),
    }
}

struct Shop {
    repo: Arc<InMemoryRepo>,
    admin: Caller,
    store: Store,
    tee: Product,
}

async fn shop() -> Shop {
    let repo = Arc::new(InMemoryRepo::new());
    let admin = Caller::new(Uuid::new_v4(), Role::Admin);
    let store = repo
        .create_store(Store::new("Tees".into(), admin.user_id, "EUR".into(), None).unwrap())
        .await
        .unwrap();
    let tee = repo
        .create_product(
            Product::new(
                store.id,
                "Tee".into(),
                2000,
                5,
                vec![NewVariant {
                    name: "XL".into(),
                    price_cents: Some(2500),
                    stock: 3,
                }],
            )
            .unwrap(),
        )
        .await
        .unwrap();
    Shop {
        repo,
        admin,
        store,
        tee,
    }
}

fn service(shop: &Shop, dispatcher: NotificationDispatcher) -> OrderService<InMemoryRepo> {
    OrderService::new(shop.repo.clone(), Arc::new(dispatcher))
        .with_dispatch_timeout(settings().dispatch_timeout)
}

fn customer() -> Customer {
    Customer {
        telegram_chat_id: 42,
        name: "Bob".into(),
        email: Some("bob@example.com".into()),
    }
}

fn lines(shop: &Shop, plain: u32, xl: u32) -> Vec<CheckoutLine> {
    vec![
        CheckoutLine {
            product_id: shop.tee.id,
            variant_id: None,
            qty: plain,
        },
        CheckoutLine {
            product_id: shop.tee.id,
            variant_id: Some(shop.tee.variants[0].id),
            qty: xl,
        },
    ]
}

async fn levels(shop: &Shop) -> (i64, i64) {
    let p = shop.repo.get_product(shop.tee.id).await.unwrap().unwrap();
    (p.stock, p.variants[0].stock)
}

#[tokio::test]
async fn order_walks_the_happy_path() {
    let s = shop().await;
    let recorder = Arc::new(Recording {
        calls: AtomicU32::new(0),
    });
    let svc = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings())
            .with_notifier(recorder.clone()),
    );

    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 2, 1))
        .await
        .unwrap();
    assert_eq!(order.total_cents, 2 * 2000 + 2500);
    assert_eq!(order.items[1].name, "Tee (XL)");

    let bot = Caller::new(Uuid::new_v4(), Role::Customer);
    let wrong_chat = svc
        .attach_payment_proof(&bot, order.id, "receipt.png".into(), Some(41))
        .await;
    assert!(matches!(wrong_chat, Err(AppError::Forbidden(_))));
    let proved = svc
        .attach_payment_proof(&bot, order.id, "receipt.png".into(), Some(42))
        .await
        .unwrap();
    assert_eq!(proved.payment_proof.as_deref(), Some("receipt.png"));
    let paid = svc.confirm_payment(&s.admin, order.id).await.unwrap();
    assert_eq!(paid.order.status, OrderStatus::Paid);
    assert!(paid.inventory.is_clean());
    assert_eq!(levels(&s).await, (3, 2));

    for next in [OrderStatus::Shipped, OrderStatus::Delivered] {
        let report = svc.transition(&s.admin, order.id, next, None).await.unwrap();
        assert_eq!(report.order.status, next);
    }
    assert_eq!(levels(&s).await, (3, 2));

    let order = svc.get_order(&s.admin, order.id).await.unwrap();
    let path: Vec<_> = order.history.iter().map(|c| c.to).collect();
    assert_eq!(
        path,
        vec![OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered]
    );
    assert_eq!(recorder.calls.load(Ordering::SeqCst), 3);

    let delivered = svc
        .list_orders(&s.admin, s.store.id, Some(OrderStatus::Delivered))
        .await
        .unwrap();
    assert_eq!(delivered.len(), 1);
}

#[tokio::test]
async fn cancelling_a_paid_order_restores_stock() {
    let s = shop().await;
    let svc = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings()),
    );
    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 1, 2))
        .await
        .unwrap();
    svc.confirm_payment(&s.admin, order.id).await.unwrap();
    assert_eq!(levels(&s).await, (4, 1));

    let cancelled = svc
        .transition(
            &s.admin,
            order.id,
            OrderStatus::Cancelled,
            Some("customer asked".into()),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(levels(&s).await, (5, 3));
}

#[tokio::test]
async fn failing_channel_degrades_but_commits() {
    let s = shop().await;
    let svc = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings())
            .with_notifier(Arc::new(Down)),
    );
    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 1, 0))
        .await;
    // zero-qty lines are refused at checkout
    assert!(matches!(order, Err(AppError::BadRequest(_))));

    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 1, 1))
        .await
        .unwrap();
    let report = svc.confirm_payment(&s.admin, order.id).await.unwrap();
    assert_eq!(report.order.status, OrderStatus::Paid);
    assert_eq!(report.notifications.status, NotificationStatus::Degraded);
    assert_eq!(report.notifications.channels[0].attempts, 3);

    let stored = svc.get_order(&s.admin, order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn slow_channel_is_reported_delayed() {
    let s = shop().await;
    let svc = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings())
            .with_notifier(Arc::new(Slow)),
    );
    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 1, 1))
        .await
        .unwrap();
    let report = svc
        .reject_payment(&s.admin, order.id, Some("blurry proof".into()))
        .await
        .unwrap();
    assert_eq!(report.order.status, OrderStatus::Rejected);
    assert_eq!(report.notifications.status, NotificationStatus::Delayed);
    assert!(report.notifications.channels.is_empty());
}

#[tokio::test]
async fn oversell_policy_is_honoured() {
    let s = shop().await;
    let strict = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings()),
    )
    .with_oversell(OversellPolicy::Reject);
    let first = strict
        .checkout(s.store.id, customer(), lines(&s, 4, 1))
        .await
        .unwrap();
    let second = strict
        .checkout(s.store.id, customer(), lines(&s, 4, 1))
        .await
        .unwrap();
    strict.confirm_payment(&s.admin, first.id).await.unwrap();

    let refused = strict.confirm_payment(&s.admin, second.id).await;
    assert!(matches!(refused, Err(AppError::InsufficientStock(_))));
    assert_eq!(levels(&s).await, (1, 2));
    let untouched = strict.get_order(&s.admin, second.id).await.unwrap();
    assert_eq!(untouched.status, OrderStatus::PendingAdmin);

    let lenient = service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings()),
    );
    let report = lenient.confirm_payment(&s.admin, second.id).await.unwrap();
    assert_eq!(report.inventory.clamped.len(), 1);
    assert_eq!(levels(&s).await, (0, 1));

    // Only the single plain tee actually taken goes back on the shelf.
    lenient
        .transition(&s.admin, second.id, OrderStatus::Cancelled, None)
        .await
        .unwrap();
    assert_eq!(levels(&s).await, (1, 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_confirms_apply_once() {
    let s = shop().await;
    let svc = Arc::new(service(
        &s,
        NotificationDispatcher::new(NotificationTemplates::default(), &settings()),
    ));
    let order = svc
        .checkout(s.store.id, customer(), lines(&s, 2, 2))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        tokio::spawn({
            let svc = svc.clone();
            let admin = s.admin;
            async move { svc.confirm_payment(&admin, order.id).await }
        }),
        tokio::spawn({
            let svc = svc.clone();
            let admin = s.admin;
            async move { svc.confirm_payment(&admin, order.id).await }
        }),
    );
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::InvalidTransition(_)))));
    assert_eq!(levels(&s).await, (3, 1));
}
