//! Registry of named implementations.
//!
//! Persisted specs reference implementations (LLM clients, tools, memory
//! backends, callback modules, secret providers) by dotted string names;
//! the registry is the resolution table. Deserialization and coordinator
//! init both resolve against it and fail with a precise error when a name
//! is absent.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use crate::callback::AgentCallbacks;
use crate::llm::LlmClient;
use crate::memory::{InMemoryBackend, MemoryBackend, MemoryError};
use crate::spec::ApiKey;
use crate::tool::Tool;

/// Registry name of the bundled in-memory backend.
pub const IN_MEMORY_BACKEND: &str = "stageflow.memory.InMemory";

/// Factory producing a backend instance from a source's configured opts.
pub type BackendFactory =
    Arc<dyn Fn(&Value) -> Result<Arc<dyn MemoryBackend>, MemoryError> + Send + Sync>;

/// A deferred secret provider reconstructed from a module-function-arity
/// triple. Arity-1 providers receive the model name.
#[derive(Clone)]
pub enum SecretProvider {
    Arity0(Arc<dyn Fn() -> Result<String, String> + Send + Sync>),
    Arity1(Arc<dyn Fn(&str) -> Result<String, String> + Send + Sync>),
}

impl SecretProvider {
    /// Arity of this provider.
    pub fn arity(&self) -> u8 {
        match self {
            Self::Arity0(_) => 0,
            Self::Arity1(_) => 1,
        }
    }

    /// Builds an arity-0 provider reading the given environment variable
    /// at resolution time (populated e.g. by [`crate::init_env`]).
    pub fn env(var: impl Into<String>) -> Self {
        let var = var.into();
        Self::Arity0(Arc::new(move || {
            std::env::var(&var).map_err(|_| format!("environment variable {} not set", var))
        }))
    }
}

/// Resolution failures against the registry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("{kind} not registered: {name}")]
    NotRegistered { kind: &'static str, name: String },
    #[error("secret provider '{name}' failed: {cause}")]
    SecretFailed { name: String, cause: String },
    #[error("secret provider '{name}' has arity {actual}, spec declares {declared}")]
    SecretArityMismatch {
        name: String,
        declared: u8,
        actual: u8,
    },
    #[error("api key was marked non-serializable and cannot be resolved")]
    NonSerializableSecret,
}

/// Named-implementation registry. Cheap to clone; all tables are shared.
///
/// **Interaction**: Passed to [`start`](crate::runtime::start) and
/// [`deserialize_spec`](crate::spec::deserialize_spec). The bundled
/// in-memory backend is pre-registered under [`IN_MEMORY_BACKEND`].
#[derive(Clone)]
pub struct Registry {
    llm_clients: Arc<DashMap<String, Arc<dyn LlmClient>>>,
    tools: Arc<DashMap<String, Arc<dyn Tool>>>,
    backends: Arc<DashMap<String, BackendFactory>>,
    callbacks: Arc<DashMap<String, Arc<dyn AgentCallbacks>>>,
    secrets: Arc<DashMap<String, SecretProvider>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry with the bundled in-memory backend registered.
    pub fn new() -> Self {
        let registry = Self {
            llm_clients: Arc::new(DashMap::new()),
            tools: Arc::new(DashMap::new()),
            backends: Arc::new(DashMap::new()),
            callbacks: Arc::new(DashMap::new()),
            secrets: Arc::new(DashMap::new()),
        };
        registry.register_memory_backend(IN_MEMORY_BACKEND, |_opts| {
            Ok(Arc::new(InMemoryBackend::new()) as Arc<dyn MemoryBackend>)
        });
        registry
    }

    /// Registers an LLM client under a dotted name.
    pub fn register_llm_client(&self, name: impl Into<String>, client: Arc<dyn LlmClient>) {
        self.llm_clients.insert(name.into(), client);
    }

    /// Registers a tool under a dotted name.
    pub fn register_tool(&self, name: impl Into<String>, tool: Arc<dyn Tool>) {
        self.tools.insert(name.into(), tool);
    }

    /// Registers a memory backend factory under a dotted name.
    pub fn register_memory_backend<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> Result<Arc<dyn MemoryBackend>, MemoryError> + Send + Sync + 'static,
    {
        self.backends.insert(name.into(), Arc::new(factory));
    }

    /// Registers a callback module under a dotted name.
    pub fn register_callbacks(&self, name: impl Into<String>, callbacks: Arc<dyn AgentCallbacks>) {
        self.callbacks.insert(name.into(), callbacks);
    }

    /// Registers a secret provider under `module.function`.
    pub fn register_secret(
        &self,
        module: impl Into<String>,
        function: impl Into<String>,
        provider: SecretProvider,
    ) {
        let key = format!("{}.{}", module.into(), function.into());
        self.secrets.insert(key, provider);
    }

    /// Resolves an LLM client by name.
    pub fn llm_client(&self, name: &str) -> Result<Arc<dyn LlmClient>, RegistryError> {
        self.llm_clients
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "llm client",
                name: name.to_string(),
            })
    }

    /// Resolves a tool by name.
    pub fn tool(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "tool",
                name: name.to_string(),
            })
    }

    /// Creates a backend instance from the named factory.
    pub fn create_backend(
        &self,
        name: &str,
        opts: &Value,
    ) -> Result<Result<Arc<dyn MemoryBackend>, MemoryError>, RegistryError> {
        let factory = self
            .backends
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "memory backend",
                name: name.to_string(),
            })?;
        Ok(factory(opts))
    }

    /// Resolves a callback module by name.
    pub fn callbacks(&self, name: &str) -> Result<Arc<dyn AgentCallbacks>, RegistryError> {
        self.callbacks
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotRegistered {
                kind: "callback module",
                name: name.to_string(),
            })
    }

    /// True when the named LLM client exists.
    pub fn has_llm_client(&self, name: &str) -> bool {
        self.llm_clients.contains_key(name)
    }

    /// True when the named tool exists.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// True when the named backend factory exists.
    pub fn has_memory_backend(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// True when the named callback module exists.
    pub fn has_callbacks(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Resolves an API key to its secret value.
    ///
    /// `Literal` keys resolve to themselves; `Provider` triples are looked
    /// up under `module.function` and invoked (arity-1 providers receive
    /// `model`); the `NonSerializable` sentinel cannot be resolved.
    pub fn resolve_api_key(
        &self,
        key: &ApiKey,
        model: &str,
    ) -> Result<String, RegistryError> {
        match key {
            ApiKey::Literal { value } => Ok(value.clone()),
            ApiKey::NonSerializable => Err(RegistryError::NonSerializableSecret),
            ApiKey::Provider {
                module,
                function,
                arity,
            } => {
                let name = format!("{}.{}", module, function);
                let provider = self.secrets.get(&name).map(|e| e.value().clone()).ok_or_else(
                    || RegistryError::NotRegistered {
                        kind: "secret provider",
                        name: name.clone(),
                    },
                )?;
                if provider.arity() != *arity {
                    return Err(RegistryError::SecretArityMismatch {
                        name,
                        declared: *arity,
                        actual: provider.arity(),
                    });
                }
                let result = match &provider {
                    SecretProvider::Arity0(f) => f(),
                    SecretProvider::Arity1(f) => f(model),
                };
                result.map_err(|cause| RegistryError::SecretFailed { name, cause })
            }
        }
    }
}
