pub mod billing_period;
pub mod store_context;
pub mod subscriptions;
