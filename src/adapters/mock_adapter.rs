//! Scripted transport for testing instrument drivers
//!
//! This adapter implements the [`Transport`] trait without physical hardware. It provides:
//! - Scripted responses, returned in FIFO order to successive `ask` calls
//! - Controllable one-shot failure injection
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep a clone after moving the adapter into a
//! driver and still inspect the call log or queue more responses.

use super::{AdapterError, Transport};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Mock transport for testing
///
/// # Example
///
/// ```
/// use smu_daq::adapters::{MockAdapter, Transport};
///
/// # tokio_test_block_on(async {
/// let mut adapter = MockAdapter::new().with_response("1.0,0.5");
/// adapter.connect().await.unwrap();
/// assert_eq!(adapter.ask(":READ?").await.unwrap(), "1.0,0.5");
/// assert_eq!(adapter.get_call_log(), vec!["ask::READ?"]);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockAdapter {
    connected: Arc<AtomicBool>,
    should_fail_next: Arc<AtomicBool>,
    responses: Arc<Mutex<VecDeque<String>>>,
    call_log: Arc<Mutex<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockAdapter {
    /// Create a new mock adapter with no scripted responses
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a future `ask`
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push_response(response);
        self
    }

    /// Queue a response for a future `ask`
    pub fn push_response(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(response.into());
    }

    /// Trigger a failure on the next operation
    pub fn trigger_failure(&self) {
        self.should_fail_next.store(true, Ordering::SeqCst);
    }

    /// Get a copy of the call log for verification
    ///
    /// Writes are logged as `write:<command>`, queries as `ask:<query>`.
    pub fn get_call_log(&self) -> Vec<String> {
        lock(&self.call_log).clone()
    }

    /// Clear the call log
    pub fn clear_call_log(&self) {
        lock(&self.call_log).clear();
    }

    /// Number of scripted responses not consumed yet
    pub fn pending_responses(&self) -> usize {
        lock(&self.responses).len()
    }

    fn log_call(&self, entry: String) {
        lock(&self.call_log).push(entry);
    }

    fn take_failure(&self) -> bool {
        self.should_fail_next.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockAdapter {
    fn info(&self) -> String {
        "MockAdapter".to_string()
    }

    async fn connect(&mut self) -> Result<(), AdapterError> {
        self.log_call("connect".to_string());

        if self.take_failure() {
            return Err(AdapterError::ConnectionFailed(
                "Mock connection failure".into(),
            ));
        }

        self.connected.store(true, Ordering::SeqCst);
        debug!("MockAdapter connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.log_call("disconnect".to_string());
        self.connected.store(false, Ordering::SeqCst);
        debug!("MockAdapter disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn write(&mut self, command: &str) -> Result<(), AdapterError> {
        self.log_call(format!("write:{command}"));

        if !self.is_connected() {
            return Err(AdapterError::NotConnected);
        }
        if self.take_failure() {
            return Err(AdapterError::SendFailed("Mock send failure".into()));
        }
        Ok(())
    }

    async fn ask(&mut self, query: &str) -> Result<String, AdapterError> {
        self.log_call(format!("ask:{query}"));

        if !self.is_connected() {
            return Err(AdapterError::NotConnected);
        }
        if self.take_failure() {
            return Err(AdapterError::QueryFailed("Mock query failure".into()));
        }

        // An exhausted script behaves like a device that answered nothing.
        Ok(lock(&self.responses).pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_adapter_connection() {
        let mut adapter = MockAdapter::new();

        assert!(!adapter.is_connected());

        adapter.connect().await.unwrap();
        assert!(adapter.is_connected());

        adapter.disconnect().await.unwrap();
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_mock_adapter_failure() {
        let mut adapter = MockAdapter::new();

        adapter.trigger_failure();
        let result = adapter.connect().await;

        assert!(result.is_err());
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn test_failure_is_one_shot() {
        let mut adapter = MockAdapter::new();
        adapter.connect().await.unwrap();

        adapter.trigger_failure();
        assert!(adapter.write(":OUTP ON;").await.is_err());
        assert!(adapter.write(":OUTP ON;").await.is_ok());
    }

    #[tokio::test]
    async fn test_responses_are_fifo() {
        let mut adapter = MockAdapter::new()
            .with_response("first")
            .with_response("second");
        adapter.connect().await.unwrap();

        assert_eq!(adapter.ask("q1").await.unwrap(), "first");
        assert_eq!(adapter.ask("q2").await.unwrap(), "second");
        assert_eq!(adapter.ask("q3").await.unwrap(), "");
        assert_eq!(adapter.pending_responses(), 0);
    }

    #[tokio::test]
    async fn test_io_requires_connection() {
        let mut adapter = MockAdapter::new();
        assert!(matches!(
            adapter.ask(":READ?").await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_clones_share_call_log() {
        let mut adapter = MockAdapter::new();
        let observer = adapter.clone();

        adapter.connect().await.unwrap();
        adapter.write(":OUTP OFF;").await.unwrap();

        assert_eq!(observer.get_call_log(), vec!["connect", "write::OUTP OFF;"]);

        observer.clear_call_log();
        assert!(adapter.get_call_log().is_empty());
    }
}
