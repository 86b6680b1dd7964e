pub mod caller;
pub mod inventory;
pub mod notification;
pub mod order;
pub mod store;
