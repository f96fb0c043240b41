pub mod chat;
pub mod commands;
pub mod error;
pub mod ltm;
pub mod prompts;
pub mod summarization;

pub use chat::{ChatRequest, ChatService, ChatTurn};
pub use error::EngineError;
pub use ltm::retrieval::{retrieve, RetrievalOutcome, RetrievalRequest};
pub use ltm::{LtmPager, PageScope};
