//! Capability-aware load balancing.
//!
//! Requests name the capabilities they need; the balancer picks the
//! least-loaded provider that supports all of them. Every successful
//! [`LoadBalancer::select_server`] must be paired with exactly one
//! [`LoadBalancer::release`], including when the caller times out.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{olog_debug, olog_trace};

/// A registered capability provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    pub capabilities: BTreeSet<String>,
    /// Requests currently routed here and not yet released.
    pub current_load: u32,
    /// Requests ever routed here. Never decreases.
    pub total_handled: u64,
}

impl Provider {
    pub fn new<I>(name: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities
                .into_iter()
                .map(|c| c.as_ref().to_string())
                .collect(),
            current_load: 0,
            total_handled: 0,
        }
    }

    /// Whether this provider supports every capability in `required`.
    pub fn supports(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }
}

/// Routes capability requests to providers. Ties on load go to the provider
/// registered first.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancer {
    providers: Vec<Provider>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider, or replace one with the same name.
    ///
    /// Replacing resets both counters but keeps the registration position.
    pub fn register_server<I>(&mut self, name: impl Into<String>, capabilities: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let provider = Provider::new(name, capabilities);
        olog_debug!(
            "LoadBalancer::register_server name={} capabilities={:?}",
            provider.name,
            provider.capabilities
        );
        match self.providers.iter_mut().find(|p| p.name == provider.name) {
            Some(existing) => *existing = provider,
            None => self.providers.push(provider),
        }
    }

    /// Pick the least-loaded provider supporting every required capability.
    ///
    /// Increments the chosen provider's load and handled count. Returns
    /// `None` when no provider qualifies.
    pub fn select_server<I>(&mut self, required: I) -> Option<String>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let required: BTreeSet<String> = required
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect();

        let chosen = self
            .providers
            .iter_mut()
            .filter(|p| p.supports(&required))
            .min_by_key(|p| p.current_load);

        match chosen {
            Some(provider) => {
                provider.current_load += 1;
                provider.total_handled += 1;
                olog_trace!(
                    "LoadBalancer::select_server required={:?} chosen={} load={}",
                    required,
                    provider.name,
                    provider.current_load
                );
                Some(provider.name.clone())
            }
            None => {
                olog_debug!("LoadBalancer::select_server no provider for {:?}", required);
                None
            }
        }
    }

    /// Release one unit of load. Never drops below zero; unknown names are ignored.
    pub fn release(&mut self, name: &str) {
        match self.providers.iter_mut().find(|p| p.name == name) {
            Some(provider) => {
                provider.current_load = provider.current_load.saturating_sub(1);
            }
            None => olog_debug!("LoadBalancer::release unknown provider {}", name),
        }
    }

    /// Requests handled per provider.
    pub fn load_distribution(&self) -> BTreeMap<String, u64> {
        self.providers
            .iter()
            .map(|p| (p.name.clone(), p.total_handled))
            .collect()
    }

    pub fn provider(&self, name: &str) -> Option<&Provider> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn current_load(&self, name: &str) -> Option<u32> {
        self.provider(name).map(|p| p.current_load)
    }

    /// Providers in registration order.
    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
