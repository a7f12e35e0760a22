//! # Provider
//!
//! An in-memory provider backing the exchange engine in tests: hash-map
//! stores for records and messages, an outbox capturing transport sends, and
//! a log of emitted events.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use credence_didcomm::provider::{
    EventEmitter, ExchangeEvent, ExchangeStore, MessageKind, MessageRole, MessageStore, Result,
    Transport,
};
use credence_didcomm::record::{ExchangeRecord, Role};
use serde_json::Value;

/// In-memory implementation of the provider traits.
#[derive(Clone, Debug, Default)]
pub struct Provider {
    records: Arc<Mutex<HashMap<String, ExchangeRecord>>>,
    messages: Arc<Mutex<HashMap<(String, MessageKind), (MessageRole, Value)>>>,
    outbox: Arc<Mutex<Vec<(Value, Option<String>)>>>,
    events: Arc<Mutex<Vec<ExchangeEvent>>>,
}

impl Provider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed to the transport, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the outbox lock is poisoned.
    #[must_use]
    pub fn sent(&self) -> Vec<(Value, Option<String>)> {
        self.outbox.lock().expect("should lock").clone()
    }

    /// Events emitted by the engine, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the event lock is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<ExchangeEvent> {
        self.events.lock().expect("should lock").clone()
    }
}

impl credence_didcomm::provider::Provider for Provider {}

impl ExchangeStore for Provider {
    fn save(&self, record: &ExchangeRecord) -> impl Future<Output = Result<()>> + Send {
        let records = Arc::clone(&self.records);
        let record = record.clone();

        async move {
            let mut records = records.lock().expect("should lock");

            // at most one record per thread/role/connection triple
            let duplicate = records.values().any(|existing| {
                existing.id != record.id
                    && existing.thread_id == record.thread_id
                    && existing.role == record.role
                    && (existing.connection_id.is_none()
                        || record.connection_id.is_none()
                        || existing.connection_id == record.connection_id)
            });
            if duplicate {
                return Err(anyhow!(
                    "duplicate exchange record for thread {}",
                    record.thread_id
                ));
            }

            records.insert(record.id.clone(), record);
            Ok(())
        }
    }

    fn update(&self, record: &ExchangeRecord) -> impl Future<Output = Result<()>> + Send {
        let records = Arc::clone(&self.records);
        let record = record.clone();

        async move {
            records.lock().expect("should lock").insert(record.id.clone(), record);
            Ok(())
        }
    }

    fn find_by_id(
        &self, record_id: &str,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send {
        let records = Arc::clone(&self.records);
        let record_id = record_id.to_owned();

        async move { Ok(records.lock().expect("should lock").get(&record_id).cloned()) }
    }

    fn find_by_thread(
        &self, thread_id: &str, role: Option<Role>, connection_id: Option<&str>,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send {
        let records = Arc::clone(&self.records);
        let thread_id = thread_id.to_owned();
        let connection_id = connection_id.map(ToOwned::to_owned);

        async move {
            let records = records.lock().expect("should lock");
            let found = records
                .values()
                .find(|record| {
                    record.thread_id == thread_id
                        && role.is_none_or(|role| record.role == role)
                        && connection_id.as_ref().is_none_or(|connection| {
                            // connection-less records match any connection
                            record
                                .connection_id
                                .as_ref()
                                .is_none_or(|existing| existing == connection)
                        })
                })
                .cloned();
            Ok(found)
        }
    }

    fn find_by_binding(
        &self, kind: &str, record_id: &str,
    ) -> impl Future<Output = Result<Option<ExchangeRecord>>> + Send {
        let records = Arc::clone(&self.records);
        let kind = kind.to_owned();
        let record_id = record_id.to_owned();

        async move {
            let records = records.lock().expect("should lock");
            let found = records
                .values()
                .find(|record| {
                    record
                        .format_bindings
                        .iter()
                        .any(|binding| binding.kind == kind && binding.record_id == record_id)
                })
                .cloned();
            Ok(found)
        }
    }
}

impl MessageStore for Provider {
    fn save_message(
        &self, record_id: &str, kind: MessageKind, role: MessageRole, message: &Value,
    ) -> impl Future<Output = Result<()>> + Send {
        let messages = Arc::clone(&self.messages);
        let record_id = record_id.to_owned();
        let message = message.clone();

        async move {
            messages
                .lock()
                .expect("should lock")
                .insert((record_id, kind), (role, message));
            Ok(())
        }
    }

    fn find_message(
        &self, record_id: &str, kind: MessageKind, role: Option<MessageRole>,
    ) -> impl Future<Output = Result<Option<Value>>> + Send {
        let messages = Arc::clone(&self.messages);
        let record_id = record_id.to_owned();

        async move {
            let messages = messages.lock().expect("should lock");
            let found = messages
                .get(&(record_id, kind))
                .filter(|(stored_role, _)| role.is_none_or(|role| *stored_role == role))
                .map(|(_, message)| message.clone());
            Ok(found)
        }
    }
}

impl Transport for Provider {
    fn send(
        &self, message: Value, connection_id: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send {
        let outbox = Arc::clone(&self.outbox);
        let connection_id = connection_id.map(ToOwned::to_owned);

        async move {
            outbox.lock().expect("should lock").push((message, connection_id));
            Ok(())
        }
    }
}

impl EventEmitter for Provider {
    fn emit(&self, event: ExchangeEvent) -> impl Future<Output = ()> + Send {
        let events = Arc::clone(&self.events);

        async move {
            events.lock().expect("should lock").push(event);
        }
    }
}
