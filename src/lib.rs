pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod session;
pub mod stats;
pub mod storage;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use errors::ClientError;
pub use session::{ApiRequest, AuthState, SessionManager};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
