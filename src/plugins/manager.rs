//! Plugin manager - handles plugin lifecycle and execution
//!
//! Plugins move through four phases, always in registration order:
//! init (once), new-connection and disconnected (once per connection), and
//! teardown (once). Init and teardown may be requested from several threads
//! at the same time (signal handler, console, connection loop); only the
//! first request runs the pass, the others wait for it and get its outcome.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::application::errors::{LifecycleError, Phase, PluginError};
use crate::application::messaging::{EventRegistry, HandlerRegistry};
use crate::infrastructure::config::PluginSettings;
use crate::infrastructure::database::DatabaseRegistry;
use crate::plugins::trait_def::{display_name, InitContext, Plugin};

/// A teardown callback that reported an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub plugin: String,
    pub error: PluginError,
}

/// Plugin information for listing
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
    pub inited: bool,
}

struct Registration {
    plugin: Arc<dyn Plugin>,
    inited: AtomicBool,
}

impl Registration {
    fn is_inited(&self) -> bool {
        self.inited.load(Ordering::SeqCst)
    }
}

enum Pass<T> {
    Pending,
    Running,
    Finished(T),
}

type InitOutcome = Result<(), LifecycleError>;
type TeardownOutcome = Result<Vec<TeardownFailure>, LifecycleError>;

struct Inner {
    phase: Phase,
    plugins: Vec<Arc<Registration>>,
    init: Pass<InitOutcome>,
    teardown: Pass<TeardownOutcome>,
    /// New-connection and disconnected passes still running callbacks
    connection_passes: usize,
}

/// Manages all plugins for the bot
pub struct PluginManager {
    inner: Mutex<Inner>,
    pass_done: Condvar,
    events: Arc<EventRegistry>,
    resources: Arc<DatabaseRegistry>,
}

impl PluginManager {
    /// Create an empty manager using `resources` for shared databases
    pub fn new(resources: Arc<DatabaseRegistry>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::PreInit,
                plugins: Vec::new(),
                init: Pass::Pending,
                teardown: Pass::Pending,
                connection_passes: 0,
            }),
            pass_done: Condvar::new(),
            events: Arc::new(EventRegistry::new()),
            resources,
        }
    }

    pub fn builder() -> PluginManagerBuilder {
        PluginManagerBuilder::default()
    }

    /// Register a plugin
    pub fn register<P: Plugin + 'static>(&self, plugin: P) -> Result<(), LifecycleError> {
        self.register_shared(Arc::new(plugin))
    }

    /// Register a plugin that is also referenced elsewhere.
    ///
    /// Only legal before init. Non-empty names must be unique.
    pub fn register_shared(&self, plugin: Arc<dyn Plugin>) -> Result<(), LifecycleError> {
        let mut inner = self.lock()?;
        if inner.phase != Phase::PreInit {
            return Err(out_of_phase("register", inner.phase));
        }

        let name = plugin.name();
        if !name.is_empty() && inner.plugins.iter().any(|r| r.plugin.name() == name) {
            return Err(LifecycleError::DuplicatePlugin(name.to_string()));
        }

        info!("Registering plugin: {}", display_name(plugin.as_ref()));
        inner.plugins.push(Arc::new(Registration {
            plugin,
            inited: AtomicBool::new(false),
        }));
        Ok(())
    }

    /// Run every included plugin's init callback, in registration order.
    ///
    /// `selected` is the allow-list of plugin names (`None` means all);
    /// unnamed support plugins are always included. Stops at the first
    /// failing plugin. Plugins initialized before the failure stay
    /// initialized and still get torn down.
    ///
    /// Only the first call runs the pass. Concurrent and later calls wait
    /// for it and return its outcome.
    pub fn invoke_init(
        &self,
        selected: Option<&[String]>,
        config: &BTreeMap<String, PluginSettings>,
    ) -> Result<(), LifecycleError> {
        let plugins = {
            let mut inner = self.lock()?;
            loop {
                if let Pass::Finished(outcome) = &inner.init {
                    if inner.phase == Phase::PostTeardown {
                        return Err(out_of_phase("invoke_init", inner.phase));
                    }
                    return outcome.clone();
                }
                if !matches!(inner.init, Pass::Running) {
                    break;
                }
                inner = self.wait(inner)?;
            }
            if inner.phase != Phase::PreInit {
                return Err(out_of_phase("invoke_init", inner.phase));
            }

            // Leave pre-init before any callback runs so teardown stays
            // possible even if init fails halfway.
            inner.phase = Phase::PostInit;
            inner.init = Pass::Running;
            inner.plugins.clone()
        };

        let guard = PassGuard::new(self, PassKind::Init);
        let outcome = self.run_init(&plugins, selected, config);
        guard.finish(|inner| inner.init = Pass::Finished(outcome.clone()));
        outcome
    }

    /// Let every initialized plugin add line handlers for a new connection
    pub fn invoke_new_connection(&self, handlers: &mut HandlerRegistry) -> Result<(), LifecycleError> {
        let pass = self.connection_pass("invoke_new_connection")?;
        for reg in &pass.plugins {
            debug!("New connection: {}", display_name(reg.plugin.as_ref()));
            reg.plugin.new_connection(handlers);
        }
        Ok(())
    }

    /// Tell every initialized plugin that the connection is gone
    pub fn invoke_disconnected(&self) -> Result<(), LifecycleError> {
        let pass = self.connection_pass("invoke_disconnected")?;
        for reg in &pass.plugins {
            debug!("Disconnected: {}", display_name(reg.plugin.as_ref()));
            reg.plugin.disconnected();
        }
        Ok(())
    }

    /// Tear down every initialized plugin, in registration order.
    ///
    /// A failing teardown is logged and collected; it never stops the
    /// remaining plugins. Like init, only the first call runs the pass and
    /// every caller gets the same list of failures. Waits for running init
    /// and connection passes to finish first.
    pub fn invoke_teardown(&self) -> Result<Vec<TeardownFailure>, LifecycleError> {
        let plugins = {
            let mut inner = self.lock()?;
            loop {
                if let Pass::Finished(outcome) = &inner.teardown {
                    return outcome.clone();
                }
                let busy = matches!(inner.teardown, Pass::Running)
                    || matches!(inner.init, Pass::Running)
                    || inner.connection_passes > 0;
                if !busy {
                    break;
                }
                inner = self.wait(inner)?;
            }
            if inner.phase != Phase::PostInit {
                return Err(out_of_phase("invoke_teardown", inner.phase));
            }

            inner.phase = Phase::PostTeardown;
            inner.teardown = Pass::Running;
            inner.plugins.clone()
        };

        let guard = PassGuard::new(self, PassKind::Teardown);
        let failures = self.run_teardown(&plugins);
        guard.finish(|inner| inner.teardown = Pass::Finished(Ok(failures.clone())));
        Ok(failures)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Result<Phase, LifecycleError> {
        Ok(self.lock()?.phase)
    }

    /// List all registered plugins, in registration order
    pub fn list_plugins(&self) -> Result<Vec<PluginInfo>, LifecycleError> {
        Ok(self
            .lock()?
            .plugins
            .iter()
            .map(|r| PluginInfo {
                name: r.plugin.name().to_string(),
                description: r.plugin.description().to_string(),
                inited: r.is_inited(),
            })
            .collect())
    }

    /// Check if a named plugin is currently initialized
    pub fn is_inited(&self, name: &str) -> Result<bool, LifecycleError> {
        Ok(self
            .lock()?
            .plugins
            .iter()
            .any(|r| r.plugin.name() == name && r.is_inited()))
    }

    /// The event dispatch registry plugins subscribe to
    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    /// The shared database registry
    pub fn resources(&self) -> &Arc<DatabaseRegistry> {
        &self.resources
    }

    fn run_init(
        &self,
        plugins: &[Arc<Registration>],
        selected: Option<&[String]>,
        config: &BTreeMap<String, PluginSettings>,
    ) -> InitOutcome {
        if let Some(names) = selected {
            for name in names {
                if !plugins.iter().any(|r| r.plugin.name() == name) {
                    warn!("Plugin '{}' is enabled but not registered", name);
                }
            }
        }

        let empty = PluginSettings::default();
        for reg in plugins {
            let name = reg.plugin.name();
            let included = name.is_empty() || selected.map_or(true, |names| names.iter().any(|n| n == name));
            if !included {
                debug!("Skipping disabled plugin: {}", name);
                continue;
            }

            let settings = config.get(name).unwrap_or(&empty);
            let ctx = InitContext::new(&self.events, &self.resources, settings);
            info!("Initializing plugin: {}", display_name(reg.plugin.as_ref()));
            if let Err(source) = reg.plugin.init(&ctx) {
                let plugin = display_name(reg.plugin.as_ref()).to_string();
                error!("Plugin '{}' failed to initialize: {}", plugin, source);
                return Err(LifecycleError::Init { plugin, source });
            }
            reg.inited.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn run_teardown(&self, plugins: &[Arc<Registration>]) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();
        for reg in plugins.iter().filter(|r| r.is_inited()) {
            let plugin = display_name(reg.plugin.as_ref()).to_string();
            info!("Tearing down plugin: {}", plugin);
            if let Err(error) = reg.plugin.teardown() {
                error!("Plugin '{}' failed to tear down: {}", plugin, error);
                failures.push(TeardownFailure { plugin, error });
            }
            reg.inited.store(false, Ordering::SeqCst);
        }
        failures
    }

    /// Snapshot of initialized plugins; waits out an in-flight init pass.
    /// Teardown cannot start until the returned pass is dropped.
    fn connection_pass(&self, operation: &'static str) -> Result<ConnectionPass<'_>, LifecycleError> {
        let mut inner = self.lock()?;
        while matches!(inner.init, Pass::Running) {
            inner = self.wait(inner)?;
        }
        if inner.phase != Phase::PostInit {
            return Err(out_of_phase(operation, inner.phase));
        }
        inner.connection_passes += 1;
        Ok(ConnectionPass {
            manager: self,
            plugins: inner.plugins.iter().filter(|r| r.is_inited()).cloned().collect(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, LifecycleError> {
        self.inner.lock().map_err(|_| LifecycleError::Poisoned)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Inner>) -> Result<MutexGuard<'a, Inner>, LifecycleError> {
        self.pass_done.wait(guard).map_err(|_| LifecycleError::Poisoned)
    }
}

fn out_of_phase(operation: &'static str, phase: Phase) -> LifecycleError {
    LifecycleError::OutOfPhase { operation, phase }
}

#[derive(Clone, Copy)]
enum PassKind {
    Init,
    Teardown,
}

/// Publishes the outcome of a pass and wakes waiters. If the pass unwinds
/// before finishing, the pass is recorded as aborted instead.
struct PassGuard<'a> {
    manager: &'a PluginManager,
    kind: PassKind,
    finished: bool,
}

impl<'a> PassGuard<'a> {
    fn new(manager: &'a PluginManager, kind: PassKind) -> Self {
        Self {
            manager,
            kind,
            finished: false,
        }
    }

    fn finish(mut self, record: impl FnOnce(&mut Inner)) {
        self.publish(record);
        self.finished = true;
    }

    fn publish(&self, record: impl FnOnce(&mut Inner)) {
        let mut inner = self.manager.inner.lock().unwrap_or_else(PoisonError::into_inner);
        record(&mut inner);
        drop(inner);
        self.manager.pass_done.notify_all();
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.kind {
            PassKind::Init => self.publish(|inner| inner.init = Pass::Finished(Err(LifecycleError::Aborted("init")))),
            PassKind::Teardown => {
                self.publish(|inner| inner.teardown = Pass::Finished(Err(LifecycleError::Aborted("teardown"))))
            }
        }
    }
}

/// A running new-connection or disconnected pass
struct ConnectionPass<'a> {
    manager: &'a PluginManager,
    plugins: Vec<Arc<Registration>>,
}

impl Drop for ConnectionPass<'_> {
    fn drop(&mut self) {
        let mut inner = self.manager.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.connection_passes -= 1;
        drop(inner);
        self.manager.pass_done.notify_all();
    }
}

/// Thread-safe handle to the plugin manager
pub type SharedPluginManager = Arc<PluginManager>;

/// Builds a [`PluginManager`] from an explicit, ordered plugin list
#[derive(Default)]
pub struct PluginManagerBuilder {
    plugins: Vec<Arc<dyn Plugin>>,
    resources: Option<Arc<DatabaseRegistry>>,
}

impl PluginManagerBuilder {
    /// Append a plugin; registration order is dispatch order
    pub fn plugin<P: Plugin + 'static>(self, plugin: P) -> Self {
        self.shared(Arc::new(plugin))
    }

    pub fn shared(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn plugins(mut self, plugins: impl IntoIterator<Item = Arc<dyn Plugin>>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    pub fn resources(mut self, resources: Arc<DatabaseRegistry>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Register every plugin, in order. Fails on duplicate names.
    pub fn build(self) -> Result<PluginManager, LifecycleError> {
        let manager = PluginManager::new(self.resources.unwrap_or_else(|| Arc::new(DatabaseRegistry::sqlite())));
        for plugin in self.plugins {
            manager.register_shared(plugin)?;
        }
        Ok(manager)
    }
}
