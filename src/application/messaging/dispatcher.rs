//! Event dispatcher - Routes typed bot events to plugin callbacks

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::Connection;
use crate::domain::entities::Event;

/// Callback subscribed to events of type `E`
pub type Callback<E> = Arc<dyn Fn(&Connection, &E) + Send + Sync>;

/// Dispatch registry shared by all plugins.
///
/// Keeps one subscription list per event type. Dispatch is serial: callbacks
/// run one after another in subscription order, on the dispatching thread.
#[derive(Default)]
pub struct EventRegistry {
    callbacks: RwLock<HashMap<TypeId, Vec<Box<dyn Any + Send + Sync>>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback` to events of type `E`
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&Connection, &E) + Send + Sync + 'static,
    {
        let callback: Callback<E> = Arc::new(callback);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(TypeId::of::<E>())
            .or_default()
            .push(Box::new(callback));
        tracing::debug!("Subscribed callback to {}", E::KIND);
    }

    /// Deliver `event` to every subscriber of its type. Returns how many ran.
    ///
    /// The subscriber list is copied before any callback runs, so callbacks may
    /// subscribe or dispatch further events themselves.
    pub fn dispatch<E: Event>(&self, conn: &Connection, event: &E) -> usize {
        let callbacks: Vec<Callback<E>> = {
            let map = self.callbacks.read().unwrap_or_else(PoisonError::into_inner);
            map.get(&TypeId::of::<E>())
                .map(|list| {
                    list.iter()
                        .filter_map(|cb| cb.downcast_ref::<Callback<E>>().cloned())
                        .collect()
                })
                .unwrap_or_default()
        };

        for callback in &callbacks {
            callback(conn, event);
        }
        callbacks.len()
    }

    /// Number of subscribers for events of type `E`
    pub fn subscribers<E: Event>(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::domain::entities::{Line, Whisper};
    use crate::domain::traits::{Outbound, Transport};
    use std::sync::Mutex;

    struct Null;

    impl Transport for Null {
        fn send(&self, _message: Outbound) -> Result<(), BotError> {
            Ok(())
        }

        fn current_nick(&self) -> String {
            "voidbot".into()
        }
    }

    fn whisper(text: &str) -> Whisper {
        Whisper {
            line: Line::new("PRIVMSG", vec!["voidbot".into(), text.into()]),
            text: text.into(),
        }
    }

    #[test]
    fn dispatches_in_subscription_order() {
        let registry = EventRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let seen = seen.clone();
            registry.subscribe(move |_conn: &Connection, w: &Whisper| {
                seen.lock().unwrap().push(format!("{}:{}", id, w.text));
            });
        }

        let conn = Connection::new(Arc::new(Null));
        assert_eq!(registry.dispatch(&conn, &whisper("hi")), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["0:hi", "1:hi", "2:hi"]);
    }

    #[test]
    fn events_without_subscribers_are_dropped() {
        let registry = EventRegistry::new();
        let conn = Connection::new(Arc::new(Null));
        assert_eq!(registry.dispatch(&conn, &whisper("anyone?")), 0);
        assert_eq!(registry.subscribers::<Whisper>(), 0);
    }
}
