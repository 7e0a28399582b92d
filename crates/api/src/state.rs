use extract::{AnalysisModel, ModelError, ModelRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::cache::AnalysisCache;
use crate::config::AppConfig;
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;

/// Shared by every handler. The model client is built once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub model: Arc<dyn AnalysisModel>,
    pub cache: Option<AnalysisCache>,
    pub metrics: Arc<Metrics>,
    llm_permits: Arc<Semaphore>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl AppState {
    pub fn new(config: AppConfig, model: Arc<dyn AnalysisModel>) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| AnalysisCache::new(config.cache.max_entries));

        Self {
            llm_permits: Arc::new(Semaphore::new(config.concurrency.max_concurrent_llm_calls)),
            retry: RetryPolicy::from_config(&config.retry),
            request_timeout: Duration::from_secs(config.concurrency.request_timeout_secs),
            metrics: Metrics::new(),
            cache,
            model,
            config,
        }
    }

    /// One model call under the concurrency limit, timeout and retry policy.
    pub async fn call_model(&self, request: ModelRequest) -> Result<String, ModelError> {
        let request = Arc::new(request);

        self.retry
            .retry("model_generate", ModelError::is_transient, || {
                let model = Arc::clone(&self.model);
                let permits = Arc::clone(&self.llm_permits);
                let metrics = Arc::clone(&self.metrics);
                let request = Arc::clone(&request);
                let timeout = self.request_timeout;

                async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|_| ModelError::Cancelled)?;

                    let timer = TimedOperation::start();
                    let outcome = match tokio::time::timeout(timeout, model.generate(&request)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ModelError::Timeout(timeout)),
                    };
                    metrics.record_model_call(timer.elapsed(), outcome.is_ok());
                    outcome
                }
            })
            .await
    }
}
