//! Plugin lifecycle integration tests
//! Run with: cargo test --test lifecycle_test

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier, Mutex, Once};
use std::thread;
use std::time::Duration;

use voidbot::application::errors::{LifecycleError, Phase, PluginError};
use voidbot::application::messaging::HandlerRegistry;
use voidbot::plugins::{InitContext, Plugin, PluginManager, PluginResult};

static INIT: Once = Once::new();

fn ensure_init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Counts callbacks. Init and new-connection can be slowed down and
/// signal when they start; init can also fail or panic.
#[derive(Default)]
struct Counting {
    name: &'static str,
    inits: AtomicUsize,
    connects: AtomicUsize,
    teardowns: AtomicUsize,
    init_delay: Option<Duration>,
    init_started: Option<Mutex<mpsc::Sender<()>>>,
    connect_delay: Option<Duration>,
    connect_started: Option<Mutex<mpsc::Sender<()>>>,
    fail_init: bool,
    panic_in_init: bool,
    log: Option<Arc<Mutex<Vec<String>>>>,
}

impl Counting {
    fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn record(&self, event: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(event.to_string());
        }
    }
}

impl Plugin for Counting {
    fn name(&self) -> &str {
        self.name
    }

    fn init(&self, _ctx: &InitContext<'_>) -> PluginResult<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.record("init start");
        if let Some(started) = &self.init_started {
            started.lock().unwrap().send(()).unwrap();
        }
        if let Some(delay) = self.init_delay {
            thread::sleep(delay);
        }
        if self.panic_in_init {
            panic!("plugin blew up");
        }
        self.record("init end");
        if self.fail_init {
            return Err(PluginError::Failed("no config".into()));
        }
        Ok(())
    }

    fn new_connection(&self, _handlers: &mut HandlerRegistry) {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.record("connect start");
        if let Some(started) = &self.connect_started {
            started.lock().unwrap().send(()).unwrap();
        }
        if let Some(delay) = self.connect_delay {
            thread::sleep(delay);
        }
        self.record("connect end");
    }

    fn teardown(&self) -> PluginResult<()> {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        self.record("teardown");
        Ok(())
    }
}

fn manager_with(plugin: &Arc<Counting>) -> Arc<PluginManager> {
    Arc::new(PluginManager::builder().shared(plugin.clone()).build().unwrap())
}

/// Run `f` on `n` threads released at the same moment
fn race<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(n));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f()
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_init_runs_each_plugin_once() {
    ensure_init();
    let plugin = Arc::new(Counting {
        init_delay: Some(Duration::from_millis(50)),
        ..Counting::named("urls")
    });
    let manager = manager_with(&plugin);

    let m = manager.clone();
    let outcomes = race(8, move || m.invoke_init(None, &BTreeMap::new()));

    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(plugin.inits.load(Ordering::SeqCst), 1);
    assert_eq!(manager.phase().unwrap(), Phase::PostInit);
}

#[test]
fn test_concurrent_init_callers_share_the_failure() {
    ensure_init();
    let plugin = Arc::new(Counting {
        init_delay: Some(Duration::from_millis(20)),
        fail_init: true,
        ..Counting::named("stocks")
    });
    let manager = manager_with(&plugin);

    let m = manager.clone();
    let outcomes = race(6, move || m.invoke_init(None, &BTreeMap::new()));

    let first = outcomes[0].clone().unwrap_err();
    assert!(matches!(&first, LifecycleError::Init { plugin, .. } if plugin == "stocks"));
    assert!(outcomes.iter().all(|o| o.as_ref().err() == Some(&first)));
    assert_eq!(plugin.inits.load(Ordering::SeqCst), 1);

    // A failed plugin is never torn down
    assert!(manager.invoke_teardown().unwrap().is_empty());
    assert_eq!(plugin.teardowns.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concurrent_teardown_runs_once() {
    ensure_init();
    let plugin = Arc::new(Counting::named("urls"));
    let manager = manager_with(&plugin);
    manager.invoke_init(None, &BTreeMap::new()).unwrap();

    let m = manager.clone();
    let outcomes = race(8, move || m.invoke_teardown());

    assert!(outcomes.iter().all(|o| matches!(o, Ok(failures) if failures.is_empty())));
    assert_eq!(plugin.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(manager.phase().unwrap(), Phase::PostTeardown);
}

#[test]
fn test_teardown_waits_for_running_init() {
    ensure_init();
    let (started_tx, started_rx) = mpsc::channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let plugin = Arc::new(Counting {
        init_delay: Some(Duration::from_millis(100)),
        init_started: Some(Mutex::new(started_tx)),
        log: Some(log.clone()),
        ..Counting::named("slow")
    });
    let manager = manager_with(&plugin);

    let m = manager.clone();
    let init = thread::spawn(move || m.invoke_init(None, &BTreeMap::new()));
    started_rx.recv().unwrap();

    manager.invoke_teardown().unwrap();
    init.join().unwrap().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["init start", "init end", "teardown"]);
}

#[test]
fn test_new_connection_waits_for_running_init() {
    ensure_init();
    let (started_tx, started_rx) = mpsc::channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let plugin = Arc::new(Counting {
        init_delay: Some(Duration::from_millis(50)),
        init_started: Some(Mutex::new(started_tx)),
        log: Some(log.clone()),
        ..Counting::named("slow")
    });
    let manager = manager_with(&plugin);

    let m = manager.clone();
    let init = thread::spawn(move || m.invoke_init(None, &BTreeMap::new()));
    started_rx.recv().unwrap();

    manager.invoke_new_connection(&mut HandlerRegistry::new()).unwrap();
    init.join().unwrap().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["init start", "init end", "connect start", "connect end"]);
}

#[test]
fn test_teardown_waits_for_running_new_connection() {
    ensure_init();
    let (started_tx, started_rx) = mpsc::channel();
    let log = Arc::new(Mutex::new(Vec::new()));
    let plugin = Arc::new(Counting {
        connect_delay: Some(Duration::from_millis(100)),
        connect_started: Some(Mutex::new(started_tx)),
        log: Some(log.clone()),
        ..Counting::named("slow")
    });
    let manager = manager_with(&plugin);
    manager.invoke_init(None, &BTreeMap::new()).unwrap();

    let m = manager.clone();
    let connect = thread::spawn(move || m.invoke_new_connection(&mut HandlerRegistry::new()));
    started_rx.recv().unwrap();

    manager.invoke_teardown().unwrap();
    connect.join().unwrap().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["init start", "init end", "connect start", "connect end", "teardown"]
    );
}

#[test]
fn test_panicking_init_releases_waiters() {
    ensure_init();
    let plugin = Arc::new(Counting {
        panic_in_init: true,
        ..Counting::named("broken")
    });
    let manager = manager_with(&plugin);

    let m = manager.clone();
    let panicked = thread::spawn(move || m.invoke_init(None, &BTreeMap::new())).join();
    assert!(panicked.is_err());

    assert_eq!(
        manager.invoke_init(None, &BTreeMap::new()),
        Err(LifecycleError::Aborted("init"))
    );
    assert!(manager.invoke_teardown().unwrap().is_empty());
    assert_eq!(plugin.teardowns.load(Ordering::SeqCst), 0);
}

#[test]
fn test_connection_phases_repeat_per_connection() {
    ensure_init();
    let plugin = Arc::new(Counting::named("urls"));
    let manager = manager_with(&plugin);
    manager.invoke_init(None, &BTreeMap::new()).unwrap();

    for _ in 0..3 {
        manager.invoke_new_connection(&mut HandlerRegistry::new()).unwrap();
        manager.invoke_disconnected().unwrap();
    }
    assert_eq!(plugin.connects.load(Ordering::SeqCst), 3);

    manager.invoke_teardown().unwrap();
    let err = manager.invoke_new_connection(&mut HandlerRegistry::new()).unwrap_err();
    assert!(err.is_fatal());
}
