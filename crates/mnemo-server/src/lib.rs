pub mod config;
pub mod error;
pub mod handlers;
pub mod server;

pub use config::{ProviderSettings, ServerConfig};
pub use error::ApiError;
pub use server::{build_router, start, start_with_state, AppState, ServerHandle};
