use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

use super::{
    CapabilityProvider, McpError, ProviderConnector, ProviderStatus, ProviderStatusEntry,
};
use crate::config::ProviderSpec;

/// Starts the configured providers and stops them again, in reverse order.
pub struct CapabilityServerSupervisor {
    connector: Arc<dyn ProviderConnector>,
    started: Mutex<Vec<Arc<dyn CapabilityProvider>>>,
    statuses: Mutex<Vec<ProviderStatusEntry>>,
}

impl CapabilityServerSupervisor {
    pub fn new(connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            connector,
            started: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
        }
    }

    /// Start every provider in order.
    ///
    /// Optional providers that fail or time out are logged and skipped. A
    /// required provider failing stops whatever already started and returns
    /// its error.
    pub async fn start(
        &self,
        specs: &[ProviderSpec],
    ) -> Result<Vec<Arc<dyn CapabilityProvider>>, McpError> {
        for spec in specs {
            let outcome = match tokio::time::timeout(spec.startup_timeout, self.connector.connect(spec)).await {
                Ok(result) => result,
                Err(_) => Err(McpError::StartupTimeout {
                    server_name: spec.name.clone(),
                    timeout_secs: spec.startup_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(provider) => {
                    let tool_names = provider.tools().into_iter().map(|t| t.name).collect();
                    info!("Capability provider '{}' started", spec.name);
                    self.record(spec, ProviderStatus::Connected { tool_names });
                    self.started_guard().push(provider);
                }
                Err(e) if spec.required => {
                    error!("Required capability provider '{}' failed: {}", spec.name, e);
                    self.record(
                        spec,
                        ProviderStatus::Failed {
                            error: e.to_string(),
                        },
                    );
                    self.stop_all().await;
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "Capability provider '{}' failed to start, continuing without it: {}",
                        spec.name, e
                    );
                    self.record(
                        spec,
                        ProviderStatus::Failed {
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        Ok(self.providers())
    }

    /// Stop every started provider, newest first. Never fails.
    pub async fn stop_all(&self) {
        let providers = std::mem::take(&mut *self.started_guard());
        for provider in providers.into_iter().rev() {
            if let Err(e) = provider.shutdown().await {
                warn!("Error stopping capability provider '{}': {}", provider.name(), e);
            }
        }
    }

    pub fn providers(&self) -> Vec<Arc<dyn CapabilityProvider>> {
        self.started_guard().clone()
    }

    pub fn statuses(&self) -> Vec<ProviderStatusEntry> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn started_guard(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn CapabilityProvider>>> {
        self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, spec: &ProviderSpec, status: ProviderStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProviderStatusEntry {
                name: spec.name.clone(),
                required: spec.required,
                status,
            });
    }
}
