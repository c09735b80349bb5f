//! Extension registry — maps device model identifiers to capability bundles.
//!
//! Vendor crates register their [`Bundle`] at process start; lookup is then a
//! plain map access with no side effects.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use homelink_domain::error::{ConfigurationError, HubError, UnsupportedError};

use crate::ports::extension::Bundle;

#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    bundles: HashMap<String, Arc<dyn Bundle>>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `models` for `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateModel`] when another bundle
    /// already claims one of the models; nothing is registered in that case.
    pub fn register(&mut self, models: &[&str], bundle: Arc<dyn Bundle>) -> Result<(), HubError> {
        if let Some((model, existing)) = models
            .iter()
            .find_map(|m| self.bundles.get(*m).map(|b| (*m, b)))
        {
            return Err(ConfigurationError::DuplicateModel {
                model: model.to_string(),
                existing: existing.extension(),
                extension: bundle.extension(),
            }
            .into());
        }
        for model in models {
            self.bundles.insert((*model).to_string(), Arc::clone(&bundle));
        }
        tracing::info!(extension = bundle.extension(), ?models, "extension registered");
        Ok(())
    }

    /// Bundle for `model`, if any extension claims it.
    #[must_use]
    pub fn resolve(&self, model: &str) -> Option<Arc<dyn Bundle>> {
        self.bundles.get(model).cloned()
    }

    /// Like [`resolve`](Self::resolve), for callers that cannot proceed
    /// without a bundle.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Unsupported`] for unclaimed models.
    pub fn require(&self, model: &str) -> Result<Arc<dyn Bundle>, HubError> {
        self.resolve(model).ok_or_else(|| {
            UnsupportedError {
                model: model.to_string(),
                capability: "integration",
            }
            .into()
        })
    }

    /// Every registered model identifier, sorted.
    #[must_use]
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.bundles.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.bundles.iter().map(|(m, b)| (m, b.extension())))
            .finish()
    }
}
