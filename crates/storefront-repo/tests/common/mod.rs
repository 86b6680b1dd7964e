#![allow(dead_code)]

use storefront_types::domain::inventory::{OversellPolicy, StockRef};
use storefront_types::domain::order::{Customer, Order, OrderItem, OrderStatus};
use storefront_types::domain::store::{NewVariant, Product, Store};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::{OrderRepository, RepoError, TransitionRequest};
use uuid::Uuid;

pub struct Fixture {
    pub store: Store,
    pub product_a: Product,
    pub product_b: Product,
    pub order: Order,
}

impl Fixture {
    pub fn variant_b(&self) -> Uuid {
        self.product_b.variants[0].id
    }
}

pub fn request(order_id: Uuid, to: OrderStatus) -> TransitionRequest {
    TransitionRequest {
        order_id,
        to,
        actor: None,
        reason: None,
        oversell: OversellPolicy::Reject,
    }
}

/// Store with product A (stock `stock_a`) and product B whose single variant
/// has stock `stock_b`, plus an order for A x2 and B's variant x1.
pub async fn seed<R>(repo: &R, stock_a: i64, stock_b: i64) -> Fixture
where
    R: OrderRepository + CatalogRepository,
{
    let store = repo
        .create_store(Store::new("Shop".into(), Uuid::new_v4(), "USD".into(), None).unwrap())
        .await
        .unwrap();
    let product_a = repo
        .create_product(Product::new(store.id, "Mug".into(), 900, stock_a, vec![]).unwrap())
        .await
        .unwrap();
    let product_b = repo
        .create_product(
            Product::new(
                store.id,
                "Tee".into(),
                1500,
                0,
                vec![NewVariant {
                    name: "L".into(),
                    price_cents: None,
                    stock: stock_b,
                }],
            )
            .unwrap(),
        )
        .await
        .unwrap();
    let order = Order::new(
        store.id,
        Customer {
            telegram_chat_id: 7,
            name: "Test".into(),
            email: None,
        },
        "USD".into(),
        vec![
            OrderItem {
                product_id: product_a.id,
                variant_id: None,
                name: "Mug".into(),
                qty: 2,
                unit_price_cents: 900,
            },
            OrderItem {
                product_id: product_b.id,
                variant_id: Some(product_b.variants[0].id),
                name: "Tee (L)".into(),
                qty: 1,
                unit_price_cents: 1500,
            },
        ],
    )
    .unwrap();
    let order = repo.create(order).await.unwrap();
    Fixture {
        store,
        product_a,
        product_b,
        order,
    }
}

pub async fn stocks<R: CatalogRepository>(repo: &R, fx: &Fixture) -> (i64, i64) {
    let a = repo.get_product(fx.product_a.id).await.unwrap().unwrap();
    let b = repo.get_product(fx.product_b.id).await.unwrap().unwrap();
    (a.stock, b.variants[0].stock)
}

pub async fn crud_flow<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 5, 5).await;

    let store = repo.get_store(fx.store.id).await.unwrap().unwrap();
    assert_eq!(store.name, "Shop");

    let products = repo.list_products(fx.store.id).await.unwrap();
    assert_eq!(products.len(), 2);
    assert_eq!(products[1].variants.len(), 1);

    let fetched = repo.get(fx.order.id).await.unwrap().unwrap();
    assert_eq!(fetched.customer.name, "Test");
    assert_eq!(fetched.items.len(), 2);
    assert_eq!(fetched.status, OrderStatus::PendingAdmin);

    let listed = repo.list_by_store(fx.store.id, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    let paid = repo
        .list_by_store(fx.store.id, Some(OrderStatus::Paid))
        .await
        .unwrap();
    assert!(paid.is_empty());

    let with_proof = repo
        .attach_payment_proof(fx.order.id, "photo-1".into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(with_proof.payment_proof.as_deref(), Some("photo-1"));

    assert!(repo
        .set_stock(StockRef::Variant(fx.variant_b()), 9)
        .await
        .unwrap());
    assert_eq!(stocks(repo, &fx).await, (5, 9));

    assert!(repo.delete_product(fx.product_a.id).await.unwrap());
    assert!(repo.get_product(fx.product_a.id).await.unwrap().is_none());
    assert!(!repo
        .set_stock(StockRef::Product(fx.product_a.id), 1)
        .await
        .unwrap());
}

pub async fn missing_rows<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let id = Uuid::new_v4();
    assert!(repo.get(id).await.unwrap().is_none());
    assert!(repo.get_store(id).await.unwrap().is_none());
    assert!(repo.get_product(id).await.unwrap().is_none());
    assert!(repo
        .attach_payment_proof(id, "x".into())
        .await
        .unwrap()
        .is_none());
    assert!(!repo.delete_product(id).await.unwrap());
    let res = repo.apply_transition(request(id, OrderStatus::Paid)).await;
    assert!(matches!(res, Err(RepoError::NotFound(missing)) if missing == id));
}

pub async fn confirm_decrements_stock<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 5, 3).await;
    let outcome = repo
        .apply_transition(request(fx.order.id, OrderStatus::Paid))
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Paid);
    assert_eq!(outcome.change.from, OrderStatus::PendingAdmin);
    assert_eq!(outcome.inventory.applied.len(), 2);
    assert!(outcome.inventory.is_clean());
    assert_eq!(stocks(repo, &fx).await, (3, 2));

    let stored = repo.get(fx.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert_eq!(stored.history.len(), 1);

    // Same transition again is stale.
    let again = repo
        .apply_transition(request(fx.order.id, OrderStatus::Paid))
        .await;
    assert!(matches!(again, Err(RepoError::InvalidTransition(_))));
    assert_eq!(stocks(repo, &fx).await, (3, 2));
}

pub async fn insufficient_stock_persists_nothing<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    // A has plenty, B's variant has none: the A line passes, the B line fails.
    let fx = seed(repo, 5, 0).await;
    let res = repo
        .apply_transition(request(fx.order.id, OrderStatus::Paid))
        .await;
    assert!(matches!(res, Err(RepoError::InsufficientStock(_))));

    let stored = repo.get(fx.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::PendingAdmin);
    assert!(stored.history.is_empty());
    assert_eq!(stocks(repo, &fx).await, (5, 0));
}

pub async fn clamp_policy_allows_oversell<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 1, 1).await;
    let mut req = request(fx.order.id, OrderStatus::Paid);
    req.oversell = OversellPolicy::Clamp;
    let outcome = repo.apply_transition(req).await.unwrap();
    assert_eq!(outcome.inventory.clamped.len(), 1);
    assert_eq!(stocks(repo, &fx).await, (0, 0));
}

pub async fn clamped_cancel_restores_only_what_was_taken<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 1, 1).await;
    let mut req = request(fx.order.id, OrderStatus::Paid);
    req.oversell = OversellPolicy::Clamp;
    let paid = repo.apply_transition(req).await.unwrap();
    assert_eq!(paid.inventory.clamped.len(), 1);
    assert_eq!(paid.change.stock_moves.len(), 2);
    assert_eq!(stocks(repo, &fx).await, (0, 0));

    // The recorded moves survive a reload.
    let stored = repo.get(fx.order.id).await.unwrap().unwrap();
    let taken: i64 = stored.history[0].stock_moves.iter().map(|m| m.delta).sum();
    assert_eq!(taken, -2);

    let cancelled = repo
        .apply_transition(request(fx.order.id, OrderStatus::Cancelled))
        .await
        .unwrap();
    assert!(cancelled.inventory.is_clean());
    assert_eq!(stocks(repo, &fx).await, (1, 1));
}

pub async fn cancel_skips_lines_never_taken<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 0, 3).await;
    let mut req = request(fx.order.id, OrderStatus::Paid);
    req.oversell = OversellPolicy::Clamp;
    repo.apply_transition(req).await.unwrap();
    assert_eq!(stocks(repo, &fx).await, (0, 2));

    let outcome = repo
        .apply_transition(request(fx.order.id, OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(outcome.inventory.applied.len(), 1);
    assert_eq!(stocks(repo, &fx).await, (0, 3));
}

pub async fn reject_and_cancel_restore_rules<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let rejected = seed(repo, 5, 5).await;
    let outcome = repo
        .apply_transition(request(rejected.order.id, OrderStatus::Rejected))
        .await
        .unwrap();
    assert!(outcome.inventory.applied.is_empty());
    assert_eq!(stocks(repo, &rejected).await, (5, 5));

    let cancelled = seed(repo, 5, 5).await;
    repo.apply_transition(request(cancelled.order.id, OrderStatus::Paid))
        .await
        .unwrap();
    assert_eq!(stocks(repo, &cancelled).await, (3, 4));
    let outcome = repo
        .apply_transition(request(cancelled.order.id, OrderStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(outcome.inventory.applied.len(), 2);
    assert_eq!(stocks(repo, &cancelled).await, (5, 5));
}

pub async fn deleted_product_is_skipped<R>(repo: &R)
where
    R: OrderRepository + CatalogRepository,
{
    let fx = seed(repo, 5, 5).await;
    assert!(repo.delete_product(fx.product_a.id).await.unwrap());
    let outcome = repo
        .apply_transition(request(fx.order.id, OrderStatus::Paid))
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::Paid);
    assert_eq!(outcome.inventory.skipped.len(), 1);
    assert_eq!(
        outcome.inventory.skipped[0].target,
        StockRef::Product(fx.product_a.id)
    );
    let b = repo.get_product(fx.product_b.id).await.unwrap().unwrap();
    assert_eq!(b.variants[0].stock, 4);
}

pub async fn concurrent_confirms_one_wins<R>(repo: R)
where
    R: OrderRepository + CatalogRepository + Clone,
{
    let fx = seed(&repo, 5, 5).await;
    let (first, second) = (repo.clone(), repo.clone());
    let id = fx.order.id;
    let (a, b) = tokio::join!(
        tokio::spawn(async move { first.apply_transition(request(id, OrderStatus::Paid)).await }),
        tokio::spawn(async move { second.apply_transition(request(id, OrderStatus::Paid)).await }),
    );
    let results = [a.unwrap(), b.unwrap()];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    let stale = results
        .iter()
        .filter(|r| matches!(r, Err(RepoError::InvalidTransition(_))))
        .count();
    assert_eq!((ok, stale), (1, 1));
    assert_eq!(stocks(&repo, &fx).await, (3, 4));
}
