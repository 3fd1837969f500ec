use super::AlertService;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MockAlerter {
    messages: Arc<Mutex<Vec<String>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MockAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn get_alert_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertService for MockAlerter {
    async fn send_alert(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());

        if *self.should_fail.lock().unwrap() {
            return Err(Error::Alert("Mock webhook unavailable".to_string()));
        }
        Ok(())
    }
}
