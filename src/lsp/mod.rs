pub mod apply_edit;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod transport;
pub mod types;

pub use apply_edit::{dispatch, ApplyEditHandler, ApplyReport, APPLY_EDIT_METHOD};
pub use connection::{LanguageServer, RequestHandler, ServerConnection};
pub use error::LspError;
pub use lifecycle::{declares_commands, transition, Action, LifecycleEvent, Registrar, SessionState};
