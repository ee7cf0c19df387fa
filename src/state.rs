use crate::storage::ProgressStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProgressStore>,
    pub allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(store: ProgressStore, allowed_origins: Vec<String>) -> Self {
        Self {
            store: Arc::new(store),
            allowed_origins: Arc::new(allowed_origins),
        }
    }

    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|allowed| allowed == origin)
    }
}
