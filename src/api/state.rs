use std::sync::Arc;

use crate::application::{ChatService, HybridRetriever, SttService};
use crate::infrastructure::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub chat: Arc<ChatService>,
    pub stt: Arc<SttService>,
}

impl AppState {
    pub fn new(config: AppConfig, chat: Arc<ChatService>, stt: Arc<SttService>) -> Self {
        Self {
            config: Arc::new(config),
            chat,
            stt,
        }
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever> {
        self.chat.retriever()
    }
}
