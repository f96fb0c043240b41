pub mod database;
pub mod error;
pub mod fts;
pub mod ltm;
pub mod messages;
pub mod row_helpers;
pub mod schema;
pub mod store;

pub use database::Database;
pub use error::StoreError;
pub use fts::RankedMessage;
pub use ltm::{LtmMessage, LtmPage};
pub use messages::{IdRange, NewMessage, SaveOutcome, StoredMessage};
pub use store::MessageStore;
