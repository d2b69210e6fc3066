//! Error types for the pool and the registry

use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Boxed error returned by constructor callbacks and factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("resource construction failed for fingerprint {fingerprint}")]
    Construction {
        fingerprint: Fingerprint,
        #[source]
        source: BoxError,
    },
}

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no factory installed for name '{name}'")]
    UnknownFactory { name: String },

    #[error("no entry registered for id {id}")]
    NotRegistered { id: Fingerprint },

    #[error("'{name}' is already registered under id {id}")]
    AlreadyRegistered { name: String, id: Fingerprint },

    #[error("factory for '{name}' failed")]
    Construction {
        name: String,
        #[source]
        source: BoxError,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
