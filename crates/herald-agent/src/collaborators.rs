use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use herald_core::backoff;
use herald_core::config::CollaboratorConfig;
use herald_core::error::{HeraldError, Result};
use herald_core::traits::{Classifier, Generator, Publisher, Retriever};

/// The external services a campaign run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn Generator>,
    pub retriever: Arc<dyn Retriever>,
    pub classifier: Arc<dyn Classifier>,
    pub publisher: Arc<dyn Publisher>,
}

impl Collaborators {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        classifier: Arc<dyn Classifier>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            generator,
            retriever,
            classifier,
            publisher,
        }
    }
}

/// Timeout plus bounded retry for transient collaborator failures.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    timeout: Duration,
    max_attempts: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self {
            timeout,
            max_attempts: max_attempts.max(1),
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn from_config(config: &CollaboratorConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_attempts: config.max_attempts.max(1),
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    pub fn with_backoff(mut self, initial_ms: u64, max_ms: u64) -> Self {
        self.initial_backoff_ms = initial_ms;
        self.max_backoff_ms = max_ms;
        self
    }

    /// Run `op` under the timeout, retrying transient failures.
    pub async fn call<T, F, Fut>(&self, collaborator: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.once(collaborator, op()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let backoff = self.backoff(attempt - 1);
                    warn!(
                        collaborator,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying collaborator call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run a single attempt under the timeout. A timeout is an error, never an empty result.
    pub async fn once<T, Fut>(&self, collaborator: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(HeraldError::CollaboratorTimeout {
                collaborator: collaborator.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        backoff::jittered(attempt, self.initial_backoff_ms, self.max_backoff_ms)
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&CollaboratorConfig::default())
    }
}
