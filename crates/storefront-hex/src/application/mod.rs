pub mod catalog_service;
pub mod dispatcher;
pub mod order_service;
pub mod templates;
