//! Shared collaborators handed to every publisher and subscriber.

use crate::config::BindingSettings;
use crate::delegate::DelegateFactory;
use crate::error::EventError;
use crate::reflect::TypeRegistry;
use crate::registry::PublisherRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of a [`Publisher`](crate::Publisher) or [`Subscriber`](crate::Subscriber).
///
/// `Uninitialized -> Active -> Cleared`; `Cleared` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    Cleared,
}

/// The registry, member resolver and settings a publisher or subscriber binds against.
///
/// Cloning is cheap; clones share the same registries.
#[derive(Debug, Clone)]
pub struct EventContext {
    registry: Arc<PublisherRegistry>,
    factory: DelegateFactory,
    settings: BindingSettings,
}

impl EventContext {
    pub fn new(
        registry: Arc<PublisherRegistry>,
        types: Arc<TypeRegistry>,
        settings: BindingSettings,
    ) -> Self {
        let factory = DelegateFactory::new(types, &settings);
        Self {
            registry,
            factory,
            settings,
        }
    }

    /// Context over the process-wide registries.
    pub fn global(settings: BindingSettings) -> Self {
        Self::new(PublisherRegistry::global(), TypeRegistry::global(), settings)
    }

    /// Context over fresh registries that nothing else shares.
    pub fn isolated() -> Self {
        Self::new(
            Arc::new(PublisherRegistry::new()),
            Arc::new(TypeRegistry::new()),
            BindingSettings::default(),
        )
    }

    /// Same type registry and settings, fresh publisher registry.
    pub fn with_registry(&self, registry: Arc<PublisherRegistry>) -> Self {
        Self {
            registry,
            factory: self.factory.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn registry(&self) -> &Arc<PublisherRegistry> {
        &self.registry
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        self.factory.types()
    }

    pub fn factory(&self) -> &DelegateFactory {
        &self.factory
    }

    pub fn settings(&self) -> &BindingSettings {
        &self.settings
    }

    /// Logs a request or call that failed to bind and is being skipped.
    pub(crate) fn report_dropped(&self, what: &str, token: &str, error: &EventError) {
        if self.settings.warn_on_dropped {
            warn!("⚠️ Dropped {} '{}': {}", what, token, error);
        } else {
            debug!("Dropped {} '{}': {}", what, token, error);
        }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::global(BindingSettings::default())
    }
}
