//! Application state shared across handlers.

use std::path::Path;
use std::sync::Arc;

use mood_core::Catalog;

use crate::claude::ClaudeClient;
use crate::config::ConfiguratorConfig;
use crate::error::AppError;
use crate::presentation::SessionStore;
use crate::services::StreamBudget;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ConfiguratorConfig,
    catalog: Arc<Catalog>,
    claude: ClaudeClient,
    sessions: SessionStore,
    budget: StreamBudget,
}

impl AppState {
    /// Build state with the default stream budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the Claude client cannot be created.
    pub fn new(config: ConfiguratorConfig, catalog: Catalog) -> Result<Self, AppError> {
        Self::with_budget(config, catalog, StreamBudget::default())
    }

    /// Build state with an explicit stream budget.
    ///
    /// # Errors
    ///
    /// Returns an error if the Claude client cannot be created.
    pub fn with_budget(
        config: ConfiguratorConfig,
        catalog: Catalog,
        budget: StreamBudget,
    ) -> Result<Self, AppError> {
        let claude = ClaudeClient::new(config.claude())?;
        let sessions = SessionStore::new(config.reveal_delay);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog: Arc::new(catalog),
                claude,
                sessions,
                budget,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &ConfiguratorConfig {
        &self.inner.config
    }

    /// The catalog, shared read-only for the process lifetime.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    #[must_use]
    pub fn claude(&self) -> &ClaudeClient {
        &self.inner.claude
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    #[must_use]
    pub fn budget(&self) -> StreamBudget {
        self.inner.budget
    }
}

/// Load the catalog from `path`, or the built-in one when `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog, AppError> {
    let Some(path) = path else {
        return Ok(Catalog::builtin()?);
    };

    let json = std::fs::read_to_string(path).map_err(|e| {
        AppError::Internal(format!("Failed to read catalog {}: {e}", path.display()))
    })?;
    let catalog = Catalog::from_json(&json)?;
    tracing::info!(
        path = %path.display(),
        houses = catalog.houses().len(),
        add_ons = catalog.add_ons().len(),
        "Catalog loaded"
    );
    Ok(catalog)
}
