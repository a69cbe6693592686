// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One harvester per process.
//!
//! A harvester owns a runtime thread and an HTTP client, neither of which
//! survives a fork. Harvesters are therefore keyed by process id: a forked
//! child misses the lookup and builds its own instead of sharing the parent's.

use crate::config::HarvesterConfig;
use crate::errors::ConfigError;
use crate::harvester::Harvester;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once, OnceLock, PoisonError};
use tracing::{debug, info, warn};

pub type HarvesterFactory = Box<dyn Fn() -> Result<Harvester, ConfigError> + Send + Sync>;

static GLOBAL_REGISTRY: OnceLock<HarvesterRegistry> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

pub struct HarvesterRegistry {
    // Copy-on-write map: readers never take the lock.
    harvesters: ArcSwap<HashMap<u32, Arc<Harvester>>>,
    lock: Mutex<()>,
    factory: HarvesterFactory,
    process_id: fn() -> u32,
    stop_at_exit: bool,
}

impl HarvesterRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Harvester, ConfigError> + Send + Sync + 'static,
    {
        HarvesterRegistry {
            harvesters: ArcSwap::from_pointee(HashMap::new()),
            lock: Mutex::new(()),
            factory: Box::new(factory),
            process_id: std::process::id,
            stop_at_exit: false,
        }
    }

    /// Overrides how the current process is identified.
    pub fn with_process_id(mut self, process_id: fn() -> u32) -> Self {
        self.process_id = process_id;
        self
    }

    /// The process-wide registry. Harvesters are configured from the
    /// environment and stopped when the process exits.
    pub fn global() -> &'static HarvesterRegistry {
        GLOBAL_REGISTRY.get_or_init(|| {
            let mut registry = HarvesterRegistry::new(|| {
                let config = HarvesterConfig::from_env()?;
                Harvester::from_config(&config)
            });
            registry.stop_at_exit = true;
            registry
        })
    }

    /// Returns the harvester of the current process, building and starting it
    /// on first use.
    ///
    /// Lookups of an existing harvester are lock-free. Construction happens at
    /// most once per process, under the registry lock; a configuration error is
    /// returned as is and nothing is cached, so the next call tries again.
    pub fn resolve(&self) -> Result<Arc<Harvester>, ConfigError> {
        let pid = (self.process_id)();
        if let Some(harvester) = self.harvesters.load().get(&pid) {
            return Ok(Arc::clone(harvester));
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(harvester) = self.harvesters.load().get(&pid) {
            return Ok(Arc::clone(harvester));
        }

        let harvester = Arc::new((self.factory)()?);
        info!("PID: {pid} -- Using metrics harvester");
        harvester.start();
        if self.stop_at_exit {
            register_exit_hook();
        }

        let mut harvesters = HashMap::clone(&self.harvesters.load());
        harvesters.insert(pid, Arc::clone(&harvester));
        self.harvesters.store(Arc::new(harvesters));

        Ok(harvester)
    }

    /// The current process's harvester, if one was built.
    pub fn current(&self) -> Option<Arc<Harvester>> {
        self.harvesters
            .load()
            .get(&(self.process_id)())
            .map(Arc::clone)
    }

    /// Stops the current process's harvester. Harvesters inherited from a
    /// parent process are left alone.
    pub fn shutdown(&self) {
        if let Some(harvester) = self.current() {
            debug!("Stopping metrics harvester");
            harvester.stop();
        }
    }

    pub fn len(&self) -> usize {
        self.harvesters.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.harvesters.load().is_empty()
    }
}

extern "C" fn stop_global_harvester() {
    if let Some(registry) = GLOBAL_REGISTRY.get() {
        registry.shutdown();
    }
}

fn register_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // SAFETY: registers a plain extern "C" function with no captured state.
        let rc = unsafe { libc::atexit(stop_global_harvester) };
        if rc != 0 {
            warn!("Unable to register exit hook, pending metrics will be lost at exit");
        }
    });
}
