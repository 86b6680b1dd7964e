pub mod dashboard;
pub mod email;
pub mod telegram;
