//! Provider registry: the ordered provider mix plus the client behind each id.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::adapters::SampleProvider;
use crate::client::Client;
use crate::config::MixConfig;
use crate::error::{ConfigurationError, ProviderRole};
use crate::{ProviderDescriptor, ProviderId};

/// Ordered provider descriptors and their clients.
///
/// Construction guarantees that every primary and fallback id has a client,
/// so lookups during a request cannot fail.
#[derive(Clone)]
pub struct ProviderRegistry {
    descriptors: Vec<ProviderDescriptor>,
    clients: HashMap<ProviderId, Arc<dyn Client>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered = self.clients.keys().map(ProviderId::as_str).collect::<Vec<_>>();
        registered.sort_unstable();
        f.debug_struct("ProviderRegistry")
            .field("descriptors", &self.descriptors)
            .field("clients", &registered)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new(
        descriptors: Vec<ProviderDescriptor>,
        clients: HashMap<ProviderId, Arc<dyn Client>>,
    ) -> Result<Self, ConfigurationError> {
        for (position, descriptor) in descriptors.iter().enumerate() {
            if !clients.contains_key(&descriptor.id) {
                return Err(ConfigurationError::UnregisteredProvider {
                    id: descriptor.id.clone(),
                    position,
                    role: ProviderRole::Primary,
                });
            }

            if let Some(fallback) = &descriptor.fallback {
                if !clients.contains_key(fallback) {
                    return Err(ConfigurationError::UnregisteredProvider {
                        id: fallback.clone(),
                        position,
                        role: ProviderRole::Fallback,
                    });
                }
            }
        }

        Ok(Self {
            descriptors,
            clients,
        })
    }

    /// Builds a registry backed by [`SampleProvider`] clients for every id the
    /// config references.
    pub fn from_config(config: &MixConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let referenced = config
            .providers
            .iter()
            .flat_map(|descriptor| std::iter::once(&descriptor.id).chain(descriptor.fallback.as_ref()))
            .cloned()
            .collect::<BTreeSet<_>>();

        let mut builder = RegistryBuilder::new();
        for id in referenced {
            let client = SampleProvider::with_behavior(id.clone(), config.sample);
            builder = builder.with_client(id, Arc::new(client));
        }
        for descriptor in &config.providers {
            builder = builder.with_descriptor(descriptor.clone());
        }
        builder.build()
    }

    pub fn resolve_client(&self, id: &ProviderId) -> Option<Arc<dyn Client>> {
        self.clients.get(id).cloned()
    }

    pub fn descriptor_at(&self, position: usize) -> Option<&ProviderDescriptor> {
        self.descriptors.get(position)
    }

    pub fn descriptors(&self) -> &[ProviderDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for assembling a [`ProviderRegistry`] programmatically.
///
/// ```rust,ignore
/// let registry = RegistryBuilder::new()
///     .with_client(a.clone(), Arc::new(SampleProvider::new(a.clone())))
///     .with_client(b.clone(), Arc::new(SampleProvider::new(b.clone())))
///     .with_entry(a, Some(b.clone()))
///     .with_entry(b, None)
///     .build()?;
/// ```
#[derive(Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ProviderDescriptor>,
    clients: HashMap<ProviderId, Arc<dyn Client>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the client serving `id`.
    pub fn with_client(mut self, id: ProviderId, client: Arc<dyn Client>) -> Self {
        self.clients.insert(id, client);
        self
    }

    /// Appends a provider slot.
    pub fn with_entry(self, id: ProviderId, fallback: Option<ProviderId>) -> Self {
        self.with_descriptor(ProviderDescriptor::new(id, fallback))
    }

    pub fn with_descriptor(mut self, descriptor: ProviderDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, ConfigurationError> {
        ProviderRegistry::new(self.descriptors, self.clients)
    }
}
