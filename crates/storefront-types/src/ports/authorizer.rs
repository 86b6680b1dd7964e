use crate::domain::caller::Caller;
use crate::domain::order::Order;
use crate::domain::store::Store;

/// Decides whether a caller may drive an order's lifecycle.
pub trait Authorizer: Send + Sync + 'static {
    fn can_transition(&self, caller: &Caller, store: &Store, order: &Order) -> bool;

    fn can_manage_store(&self, caller: &Caller, store: &Store) -> bool;

    /// `telegram_chat_id` is the chat the upload came from, as vouched for
    /// by the bot front-end.
    fn can_submit_proof(
        &self,
        caller: &Caller,
        store: &Store,
        order: &Order,
        telegram_chat_id: Option<i64>,
    ) -> bool;
}
