#![cfg(feature = "memory")]

mod common;

use storefront_repo::memory::InMemoryRepo;

#[tokio::test]
async fn memory_repo_crud_flow() {
    common::crud_flow(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_handles_missing_rows() {
    common::missing_rows(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_confirm_decrements_stock() {
    common::confirm_decrements_stock(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_insufficient_stock_rolls_back() {
    common::insufficient_stock_persists_nothing(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_clamp_policy() {
    common::clamp_policy_allows_oversell(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_clamped_cancel_restores_taken_stock() {
    common::clamped_cancel_restores_only_what_was_taken(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_cancel_skips_untaken_lines() {
    common::cancel_skips_lines_never_taken(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_reject_and_cancel() {
    common::reject_and_cancel_restore_rules(&InMemoryRepo::new()).await;
}

#[tokio::test]
async fn memory_repo_skips_deleted_products() {
    common::deleted_product_is_skipped(&InMemoryRepo::new()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn memory_repo_concurrent_confirms() {
    common::concurrent_confirms_one_wins(InMemoryRepo::new()).await;
}
