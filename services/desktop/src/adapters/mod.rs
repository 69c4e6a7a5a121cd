pub mod settings_store;
pub mod supabase;
pub mod windows;

pub use settings_store::{JsonSettingsStore, MemorySessionStore};
pub use supabase::SupabaseAuthAdapter;
pub use windows::{WindowEvent, WindowRegistry};
