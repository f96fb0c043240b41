pub mod errors;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod tokens;

pub use errors::GatewayError;
pub use messages::{ChatMessage, Role};
pub use provider::{ChatCompletion, ChatProvider};
