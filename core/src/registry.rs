//! Mode-keyed executor instances.
//!
//! # Design
//! An [`ExecutorRegistry`] builds each executor the first time its mode is
//! asked for and hands out the same instance afterwards. Construction is
//! serialized, so racing first calls never open two multiplexers.
//!
//! Code that can pass a registry (or an executor) around explicitly should
//! do so. [`executor`] exists for call sites that cannot: it reads a
//! process-wide registry that lives until the process exits.

use std::sync::{Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::executor::{Executor, Mode, MultiplexedExecutor, SingleExecutor};

pub struct ExecutorRegistry {
    config: ExecutorConfig,
    init: Mutex<()>,
    single: OnceLock<SingleExecutor>,
    multiplexed: OnceLock<MultiplexedExecutor>,
}

impl ExecutorRegistry {
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        Ok(Self::unchecked(config))
    }

    fn unchecked(config: ExecutorConfig) -> Self {
        Self {
            config,
            init: Mutex::new(()),
            single: OnceLock::new(),
            multiplexed: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn get(&self, mode: Mode) -> Result<&dyn Executor, ExecutorError> {
        match mode {
            Mode::Single => Ok(self.single()?),
            Mode::Multiplexed => Ok(self.multiplexed()?),
        }
    }

    pub fn single(&self) -> Result<&SingleExecutor, ExecutorError> {
        get_or_try_init(&self.single, &self.init, || {
            debug!("creating single executor");
            Ok(SingleExecutor::new(&self.config))
        })
    }

    pub fn multiplexed(&self) -> Result<&MultiplexedExecutor, ExecutorError> {
        get_or_try_init(&self.multiplexed, &self.init, || {
            debug!("creating multiplexed executor");
            MultiplexedExecutor::new(self.config.clone())
        })
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::unchecked(ExecutorConfig::default())
    }
}

fn get_or_try_init<'a, T>(
    cell: &'a OnceLock<T>,
    init: &Mutex<()>,
    build: impl FnOnce() -> Result<T, ExecutorError>,
) -> Result<&'a T, ExecutorError> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let _guard = init.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = build()?;
    Ok(cell.get_or_init(|| value))
}

static GLOBAL: OnceLock<ExecutorRegistry> = OnceLock::new();

/// Install the configuration used by the process-wide registry. Must run
/// before the first [`executor`] call.
pub fn init(config: ExecutorConfig) -> Result<(), ExecutorError> {
    let registry = ExecutorRegistry::new(config)?;
    GLOBAL
        .set(registry)
        .map_err(|_| ExecutorError::AlreadyInitialized)
}

/// The process-wide registry, created with defaults on first use.
pub fn global() -> &'static ExecutorRegistry {
    GLOBAL.get_or_init(ExecutorRegistry::default)
}

/// Shared executor for `mode` from the process-wide registry.
pub fn executor(mode: Mode) -> Result<&'static dyn Executor, ExecutorError> {
    global().get(mode)
}
