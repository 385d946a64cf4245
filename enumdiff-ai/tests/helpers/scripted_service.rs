//! Scripted analysis service
//!
//! Stands in for the HTTP client. A responder closure decides the answer for
//! every request from its tier, content and global call index; every call is
//! recorded for assertions.

use async_trait::async_trait;
use enumdiff_ai::models::ModelTier;
use enumdiff_ai::services::{AnalysisRequest, AnalysisService};
use enumdiff_ai::ServiceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const CHAT_MODEL: &str = "scripted-chat";
pub const REASONER_MODEL: &str = "scripted-reasoner";

type Responder = dyn Fn(&AnalysisRequest, usize) -> Result<String, ServiceError> + Send + Sync;

/// One call as seen by the service
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub index: usize,
    pub tier: ModelTier,
    pub content: String,
}

pub struct ScriptedService {
    responder: Box<Responder>,
    counter: AtomicUsize,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Duration,
    chat_model: String,
    reasoner_model: String,
}

impl ScriptedService {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&AnalysisRequest, usize) -> Result<String, ServiceError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            counter: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            chat_model: CHAT_MODEL.to_string(),
            reasoner_model: REASONER_MODEL.to_string(),
        }
    }

    /// Always answer with the same content
    pub fn constant(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::new(move |_, _| Ok(content.clone()))
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_models(mut self, chat: &str, reasoner: &str) -> Self {
        self.chat_model = chat.to_string();
        self.reasoner_model = reasoner.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, tier: ModelTier) -> usize {
        self.calls().iter().filter(|c| c.tier == tier).count()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    async fn complete(&self, request: &AnalysisRequest) -> Result<String, ServiceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RecordedCall {
            index,
            tier: request.tier,
            content: request.user_content.clone(),
        });

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        (self.responder)(request, index)
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Chat => &self.chat_model,
            ModelTier::Reasoner => &self.reasoner_model,
        }
    }
}
