use storefront_repo::{build_repo, Repo};
use storefront_types::ports::catalog_repository::CatalogRepository;
use storefront_types::ports::order_repository::OrderRepository;
use uuid::Uuid;

#[tokio::test]
async fn builds_repo_from_database_url() {
    // Use a temp DB path for isolation.
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("storefront-test.db");
    let url = format!("sqlite://{}", db_path.display());

    let repo: Repo = build_repo(Some(&url)).await.expect("build repo");
    // basic sanity: lookups succeed and find nothing
    let store_id = Uuid::new_v4();
    assert!(repo.get_store(store_id).await.expect("get store").is_none());
    let list = repo.list_by_store(store_id, None).await.expect("list");
    assert!(list.is_empty());
}
