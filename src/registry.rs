//! Name registry: (name, config) pairs mapped to stable ids with pluggable factories

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::errors::{BoxError, RegistryError, RegistryResult};
use crate::fingerprint::{Config, Fingerprint};
use crate::metrics::RegistryStats;

/// Construction routine for one logical entity name, shared by every config
/// registered under that name.
pub trait EntityFactory<E>: Send + Sync {
    fn create(&self, config: &Config) -> Result<E, BoxError>;
}

impl<E, F> EntityFactory<E> for F
where
    F: Fn(&Config) -> Result<E, BoxError> + Send + Sync,
{
    fn create(&self, config: &Config) -> Result<E, BoxError> {
        self(config)
    }
}

/// What `register` does when the computed id already exists.
///
/// `Idempotent` is the default: the existing id is returned and a debug note
/// is logged, which composes with concurrent auto-registration. `Reject`
/// raises [`RegistryError::AlreadyRegistered`] instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    #[default]
    Idempotent,
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryOptions {
    /// Register unknown (name, config) pairs on the fly in `create_by_name`
    pub auto_register: bool,

    /// Duplicate-registration behavior
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            auto_register: true,
            duplicate_policy: DuplicatePolicy::Idempotent,
        }
    }
}

impl RegistryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict mode: `create_by_name` fails for unregistered pairs instead of
    /// registering them.
    pub fn strict(mut self) -> Self {
        self.auto_register = false;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }
}

/// One registered (name, config) pair. The config is bound at registration
/// time and immutable thereafter; the same name with a different config
/// yields a different id.
pub struct RegistryEntry<E> {
    pub id: Fingerprint,
    pub name: String,
    pub config: Config,
    factory: Arc<dyn EntityFactory<E>>,
}

impl<E> Clone for RegistryEntry<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
            factory: Arc::clone(&self.factory),
        }
    }
}

struct RegistryState<E> {
    factories: HashMap<String, Arc<dyn EntityFactory<E>>>,
    entries: HashMap<Fingerprint, RegistryEntry<E>>,
    ids_by_name: HashMap<String, Vec<Fingerprint>>,
    auto_register: bool,
    total_creations: u64,
}

/// Deduplicating registry of logical entities keyed by
/// `fingerprint(name, config)`.
///
/// Entries live for the process lifetime; there is no deregistration.
pub struct Registry<E> {
    state: Mutex<RegistryState<E>>,
    duplicate_policy: DuplicatePolicy,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Self::new(RegistryOptions::default())
    }
}

impl<E> Registry<E> {
    pub fn new(options: RegistryOptions) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                factories: HashMap::new(),
                entries: HashMap::new(),
                ids_by_name: HashMap::new(),
                auto_register: options.auto_register,
                total_creations: 0,
            }),
            duplicate_policy: options.duplicate_policy,
        }
    }

    /// Install the factory for `name`, replacing any previous one. Resolved
    /// once per name; every config registered under the name shares it.
    pub fn install_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: EntityFactory<E> + 'static,
    {
        let name = name.into();
        let mut state = self.state.lock();
        if state
            .factories
            .insert(name.clone(), Arc::new(factory))
            .is_some()
        {
            debug!(name, "replaced existing factory");
        }
    }

    /// Register `(name, config)` and return its stable id.
    ///
    /// A duplicate id is handled per the configured [`DuplicatePolicy`]; a
    /// name with no installed factory fails with
    /// [`RegistryError::UnknownFactory`].
    pub fn register(&self, name: &str, config: &Config) -> RegistryResult<Fingerprint> {
        let id = Fingerprint::of_named(name, config);
        let mut state = self.state.lock();

        if state.entries.contains_key(&id) {
            return match self.duplicate_policy {
                DuplicatePolicy::Idempotent => {
                    debug!(name, id = %id, "already registered, returning existing id");
                    Ok(id)
                }
                DuplicatePolicy::Reject => Err(RegistryError::AlreadyRegistered {
                    name: name.to_string(),
                    id,
                }),
            };
        }

        let factory = state
            .factories
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownFactory {
                name: name.to_string(),
            })?;

        state.entries.insert(
            id.clone(),
            RegistryEntry {
                id: id.clone(),
                name: name.to_string(),
                config: config.clone(),
                factory,
            },
        );
        state
            .ids_by_name
            .entry(name.to_string())
            .or_default()
            .push(id.clone());
        info!(name, id = %id, "registered entity");
        Ok(id)
    }

    /// Construct the entity registered under `id`.
    ///
    /// Factory failures are wrapped as [`RegistryError::Construction`] with
    /// the entity name, never propagated raw.
    pub fn create(&self, id: &Fingerprint) -> RegistryResult<E> {
        let (name, config, factory) = {
            let state = self.state.lock();
            let entry = state
                .entries
                .get(id)
                .ok_or_else(|| RegistryError::NotRegistered { id: id.clone() })?;
            (
                entry.name.clone(),
                entry.config.clone(),
                Arc::clone(&entry.factory),
            )
        };

        // The factory may block (typically it re-enters a resource pool), so
        // it runs without the registry lock held.
        let entity = factory
            .create(&config)
            .map_err(|source| RegistryError::Construction { name, source })?;
        self.state.lock().total_creations += 1;
        Ok(entity)
    }

    /// Construct by `(name, config)`, registering first when auto-register
    /// is on. In strict mode an unregistered pair fails with
    /// [`RegistryError::NotRegistered`].
    pub fn create_by_name(&self, name: &str, config: &Config) -> RegistryResult<E> {
        let id = Fingerprint::of_named(name, config);
        if !self.is_registered(&id) {
            if self.auto_register() {
                debug!(name, id = %id, "auto-registering before creation");
                self.register(name, config)?;
            } else {
                return Err(RegistryError::NotRegistered { id });
            }
        }
        self.create(&id)
    }

    /// Every id registered under `name`, in registration order.
    pub fn ids_for_name(&self, name: &str) -> Vec<Fingerprint> {
        self.state
            .lock()
            .ids_by_name
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn entry(&self, id: &Fingerprint) -> Option<RegistryEntry<E>> {
        self.state.lock().entries.get(id).cloned()
    }

    pub fn is_registered(&self, id: &Fingerprint) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn auto_register(&self) -> bool {
        self.state.lock().auto_register
    }

    pub fn set_auto_register(&self, enabled: bool) {
        self.state.lock().auto_register = enabled;
        debug!(enabled, "auto-register toggled");
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            total_registered: state.entries.len(),
            total_creations: state.total_creations,
            per_name_counts: state
                .ids_by_name
                .iter()
                .map(|(name, ids)| (name.clone(), ids.len()))
                .collect(),
            auto_register: state.auto_register,
        }
    }
}
