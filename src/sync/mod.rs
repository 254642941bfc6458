//! Synchronization engine: subscriptions, reconciliation, selection and write routing.

pub mod reconcile;
pub mod router;
pub mod selection;
pub mod subscriptions;

pub use router::WriteRouter;
pub use selection::ActiveSelection;
pub use subscriptions::{Command, SubscriptionManager};
