pub mod exchanger;
pub mod ingress;
pub mod reconciler;
pub mod worker;

pub use exchanger::SessionExchanger;
pub use ingress::{channel, AuthEvent, AuthSender, AuthStatus};
pub use reconciler::Reconciler;
pub use worker::AuthWorker;
