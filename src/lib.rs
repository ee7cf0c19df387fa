pub mod app;
pub mod config;
pub mod cors;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod state;
pub mod storage;

pub use app::router;
pub use config::Config;
pub use state::AppState;
pub use storage::ProgressStore;
