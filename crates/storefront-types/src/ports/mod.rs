pub mod authorizer;
pub mod catalog_repository;
pub mod notifier;
pub mod order_repository;
