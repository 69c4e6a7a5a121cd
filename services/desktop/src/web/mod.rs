pub mod loopback;
pub mod pages;
pub mod state;

// Re-export what the binary needs to stand the loopback server up.
pub use loopback::{bind, router, serve, ApiDoc};
pub use state::LoopbackState;
