pub mod hub;
pub mod models;
pub mod openai;
pub mod registry;
pub mod usage;

pub mod mock;

pub use mock::{MockProvider, MockResponse};
pub use models::{context_limit, ProviderKind, DEFAULT_CONTEXT_LIMIT};
pub use openai::OpenAiCompatProvider;
pub use registry::ProviderRegistry;
pub use usage::{extract_token_usage, TokenUsageReport};
