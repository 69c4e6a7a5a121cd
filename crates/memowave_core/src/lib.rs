pub mod callback;
pub mod domain;
pub mod ports;

pub use callback::{extract_tokens, wrap_fragment, LOGIN_CALLBACK_HOST};
pub use domain::{
    AuthFailure, AuthRecord, AuthUser, CallbackPayload, Session, WindowHandle, WindowMessage,
    WindowRole, WindowState,
};
pub use ports::{IdentityBackend, PortError, PortResult, SessionStore, WindowManager};
