//! The medical assistant service consumed by chat frontends.
//!
//! Composes the connection manager, the request executor and the medical
//! formatter. Constructed once at the composition root and passed around
//! explicitly.

use std::sync::Arc;
use std::time::Duration;

use medassist_core::{
    AssistantSettings, ConnectionState, ConnectivitySignal, Endpoint, ExecutionError,
    InferenceTransport, MedicalFormatter, MedicalResponse, PlatformProfile, select_model,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, Subscription};
use crate::executor::{ExecuteOptions, RequestExecutor};
use crate::prober::EndpointProber;

/// Deadline for downloading a model that is not installed yet.
pub const MODEL_PULL_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// What the UI shows about the current backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveEndpointInfo {
    pub endpoint: Option<Endpoint>,
    pub connected: bool,
    pub model_name: String,
}

pub struct MedicalAssistant {
    transport: Arc<dyn InferenceTransport>,
    connection: Arc<ConnectionManager>,
    executor: RequestExecutor,
    formatter: MedicalFormatter,
    settings: AssistantSettings,
}

impl MedicalAssistant {
    /// Wire the service.
    ///
    /// `profile` should already carry the user's overrides
    /// (see [`PlatformProfile::with_overrides`]); `settings` supplies the
    /// model, attempt budget and temperature.
    pub fn new(
        transport: Arc<dyn InferenceTransport>,
        profile: PlatformProfile,
        settings: AssistantSettings,
    ) -> Self {
        let prober = EndpointProber::new(Arc::clone(&transport));
        let connection = Arc::new(ConnectionManager::new(profile, prober));
        let signal: Arc<dyn ConnectivitySignal> = connection.clone();
        let executor = RequestExecutor::new(Arc::clone(&transport), signal);

        let formatter = settings
            .temperature
            .map_or_else(MedicalFormatter::new, |t| {
                MedicalFormatter::new().with_temperature(t)
            });

        Self {
            transport,
            connection,
            executor,
            formatter,
            settings,
        }
    }

    pub const fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Subscribe to connectivity changes. See [`ConnectionManager::subscribe`].
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.connection.subscribe(callback)
    }

    pub async fn check_now(&self) -> bool {
        self.connection.check_now().await
    }

    /// Model the next generation will use.
    pub fn model_name(&self) -> String {
        select_model(self.settings.model.as_deref(), &self.connection.models())
    }

    pub fn active_endpoint_info(&self) -> ActiveEndpointInfo {
        let state = self.connection.state();
        ActiveEndpointInfo {
            endpoint: state.active_endpoint,
            connected: state.connected,
            model_name: self.model_name(),
        }
    }

    /// Make sure the model the next generation will use is installed.
    ///
    /// Pulls the model onto the active endpoint when the last listing does
    /// not include it (an empty listing, or a configured model that is not
    /// installed), then refreshes the listing. Returns the model name.
    pub async fn ensure_model(&self) -> Result<String, ExecutionError> {
        let endpoint = self
            .connection
            .state()
            .active_endpoint
            .ok_or(ExecutionError::NotInitialized)?;
        let model = self.model_name();
        if self.connection.models().contains(&model) {
            return Ok(model);
        }

        info!(endpoint = %endpoint, model = %model, "Model not installed, pulling it");
        match tokio::time::timeout(
            MODEL_PULL_TIMEOUT,
            self.transport.pull_model(&endpoint, &model),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(endpoint = %endpoint, model = %model, error = %e, "Model pull failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(endpoint = %endpoint, model = %model, "Model pull timed out");
                return Err(ExecutionError::Timeout {
                    timeout_ms: u64::try_from(MODEL_PULL_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        info!(model = %model, "Model pulled");
        self.connection.check_now().await;
        Ok(model)
    }

    pub async fn generate_medical_response(
        &self,
        user_text: &str,
    ) -> Result<MedicalResponse, ExecutionError> {
        self.generate_medical_response_with_context(user_text, None)
            .await
    }

    /// Generate an answer, continuing from `prior_context` when given.
    ///
    /// `prior_context` must come from an earlier response of the same model.
    /// Fails with `NotInitialized` if no endpoint has ever answered. While
    /// connected, a missing model is pulled first (see [`Self::ensure_model`]).
    pub async fn generate_medical_response_with_context(
        &self,
        user_text: &str,
        prior_context: Option<Vec<i64>>,
    ) -> Result<MedicalResponse, ExecutionError> {
        let state = self.connection.state();
        let endpoint = state
            .active_endpoint
            .ok_or(ExecutionError::NotInitialized)?;
        let model = if state.connected {
            self.ensure_model().await?
        } else {
            self.model_name()
        };

        let request = self
            .formatter
            .format_query(user_text)
            .with_context(prior_context);
        let options = ExecuteOptions::new(
            self.connection.profile().request_timeout(),
            self.settings.retry_policy(),
        );

        debug!(endpoint = %endpoint, model = %model, "Generating medical response");
        let result = self
            .executor
            .execute(&endpoint, &model, &request, options)
            .await?;

        Ok(self.formatter.format_result(&result, user_text))
    }
}
