//! # Credence Exchange
//!
//! An engine for exchanging verifiable credentials between two parties over
//! an asynchronous, message-based channel. Every interaction is a sequence of
//! typed messages correlated by a thread identifier; there is no synchronous
//! call/response pairing. The engine drives a single credential exchange from
//! proposal through issuance and acknowledgement, while the payload encoding
//! (the actual credential format) varies independently behind the
//! format-service plugin boundary.
//!
//! # Design
//!
//! **State machine**
//!
//! Each exchange is one [`ExchangeRecord`] walking the states below. The
//! holder and issuer each hold their own record for the exchange and observe
//! their own local state.
//!
//! ```text
//!  Holder                                    Issuer
//!  ------                                    ------
//!  proposal-sent      --- propose --->       proposal-received
//!  offer-received     <--- offer ----        offer-sent
//!  request-sent       --- request --->       request-received
//!  credential-received <-- credential --     credential-issued
//!  done               ----- ack ----->       done
//! ```
//!
//! The holder may also negotiate an offer (back to `proposal-sent`), decline
//! it (`declined`), and either party may abandon the exchange at any point
//! with a problem report (`abandoned`). Offers and requests arriving for an
//! unknown thread bootstrap a fresh exchange, supporting out-of-band and
//! connection-less delivery orderings.
//!
//! **Operations**
//!
//! One method per protocol step, each following the same shape: resolve the
//! relevant format services, fan the step out across them through the format
//! coordinator, guard and apply the state transition, persist the record,
//! emit a state-changed event, and return the record (plus the constructed
//! message for sending operations). After each inbound data message the
//! engine consults the auto-accept policy and, when it approves, immediately
//! performs the corresponding accept operation and hands the outbound message
//! to the transport.
//!
//! **Concurrency**
//!
//! Each inbound message is handled as one atomic unit of work with no
//! suspension that yields the record to a concurrent handler. Messages for
//! different threads may be processed concurrently; messages for the same
//! thread must be serialized by the caller or by the storage provider, since
//! resolve-mutate-persist for one thread key is not intrinsically atomic.
//! State transitions are committed before any outbound send is attempted, so
//! a failed send never rolls back an exchange.
//!
//! In addition, implementors need to supply provider traits responsible for
//! externals such as record storage, message storage, transport, and event
//! publication. See [`credence_didcomm::provider`].

mod auto_accept;
mod coordinator;
mod credential;
mod format_data;
mod offer;
mod problem_report;
mod proposal;
mod request;
mod revocation;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
pub use credence_didcomm::format::{FormatOutput, FormatService};
use credence_didcomm::message::FormatSpec;
use credence_didcomm::provider::{
    EventEmitter, ExchangeEvent, ExchangeStore, Provider, Transport,
};
pub use credence_didcomm::record::{
    AutoAcceptPolicy, ExchangeRecord, ExchangeState, FormatBinding, RevocationNotification, Role,
};
pub use credence_didcomm::{message, provider, Error, Result, PROTOCOL_VERSION};
use serde::Serialize;
use serde_json::Value;

pub use crate::auto_accept::preview_attributes_equal;
pub use crate::credential::AcceptCredentialOptions;
pub use crate::format_data::FormatData;
pub use crate::offer::{
    AcceptOfferOptions, CreateOfferOptions, DeclineOfferOptions, NegotiateOfferOptions,
    OfferCredentialOptions,
};
pub use crate::problem_report::SendProblemReportOptions;
pub use crate::proposal::{
    AcceptProposalOptions, NegotiateProposalOptions, ProposeCredentialOptions,
};
pub use crate::request::AcceptRequestOptions;

/// Engine-wide configuration, passed in at construction and threaded through
/// every call. There is no ambient configuration state.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProtocolConfig {
    /// Auto-accept policy applied when a record carries no override.
    pub auto_accept: AutoAcceptPolicy,

    /// Reject requests arriving for an unknown thread instead of treating
    /// them as a fresh exchange bootstrap. Off by default: out-of-band
    /// delivery orderings legitimately deliver a request first.
    pub reject_unsolicited_requests: bool,
}

/// The credential exchange engine. One instance serves both roles: the
/// methods a party calls determine whether it acts as holder or issuer for a
/// given exchange.
pub struct Protocol<P>
where
    P: Provider,
{
    provider: P,
    formats: Vec<Arc<dyn FormatService>>,
    config: ProtocolConfig,
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Create an engine over the given provider, with a fixed registry of
    /// format services.
    #[must_use]
    pub fn new(provider: P, formats: Vec<Arc<dyn FormatService>>, config: ProtocolConfig) -> Self {
        Self {
            provider,
            formats,
            config,
        }
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Format services addressed by the caller's per-format inputs, selected
    /// by format key.
    pub(crate) fn services_for_inputs(
        &self, inputs: &HashMap<String, Value>,
    ) -> Vec<Arc<dyn FormatService>> {
        self.formats
            .iter()
            .filter(|service| inputs.contains_key(service.format_key()))
            .cloned()
            .collect()
    }

    /// Format services recognising entries of an inbound message's formats
    /// array, deduplicated by format key.
    pub(crate) fn services_for_message(
        &self, specs: &[FormatSpec],
    ) -> Vec<Arc<dyn FormatService>> {
        let mut services: Vec<Arc<dyn FormatService>> = Vec::new();

        for spec in specs {
            let Some(service) =
                self.formats.iter().find(|service| service.supports_format(&spec.format))
            else {
                continue;
            };
            if !services.iter().any(|s| s.format_key() == service.format_key()) {
                services.push(Arc::clone(service));
            }
        }

        services
    }

    /// Retrieve a record by id, faulting when it does not exist.
    pub(crate) async fn fetch_record(&self, record_id: &str) -> Result<ExchangeRecord> {
        self.provider
            .find_by_id(record_id)
            .await
            .map_err(|e| Error::ServerError(format!("issue retrieving record: {e}")))?
            .ok_or_else(|| Error::NotFound(format!("record {record_id} not found")))
    }

    /// Resolve a record by thread id, role, and optional connection.
    pub(crate) async fn find_by_thread(
        &self, thread_id: &str, role: Option<Role>, connection_id: Option<&str>,
    ) -> Result<Option<ExchangeRecord>> {
        self.provider
            .find_by_thread(thread_id, role, connection_id)
            .await
            .map_err(|e| Error::ServerError(format!("issue resolving record: {e}")))
    }

    /// Resolve a record by thread id, faulting when none exists.
    pub(crate) async fn require_by_thread(
        &self, thread_id: &str, role: Option<Role>, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        self.find_by_thread(thread_id, role, connection_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no record found for thread {thread_id}")))
    }

    /// Persist a newly created record and emit a creation event.
    pub(crate) async fn save_new(&self, record: &ExchangeRecord) -> Result<()> {
        tracing::debug!("saving record {} and emitting state change", record.id);

        self.provider
            .save(record)
            .await
            .map_err(|e| Error::ServerError(format!("issue saving record: {e}")))?;
        self.provider
            .emit(ExchangeEvent::StateChanged {
                record: record.clone(),
                previous_state: None,
            })
            .await;

        Ok(())
    }

    /// Apply a state transition: update the record, persist it, and emit a
    /// state-changed event carrying the previous state.
    pub(crate) async fn update_state(
        &self, record: &mut ExchangeRecord, state: ExchangeState,
    ) -> Result<()> {
        tracing::debug!(
            "updating record {} to state {state} (previous={})",
            record.id,
            record.state
        );

        let previous = record.state;
        record.state = state;
        record.updated_at = Utc::now();

        self.provider
            .update(record)
            .await
            .map_err(|e| Error::ServerError(format!("issue updating record: {e}")))?;
        self.provider
            .emit(ExchangeEvent::StateChanged {
                record: record.clone(),
                previous_state: Some(previous),
            })
            .await;

        Ok(())
    }

    /// Hand an outbound message to the transport.
    pub(crate) async fn deliver(
        &self, message: &impl Serialize, connection_id: Option<&str>,
    ) -> Result<()> {
        let value = coordinator::to_value(message)?;
        self.provider
            .send(value, connection_id)
            .await
            .map_err(|e| Error::ServerError(format!("issue delivering message: {e}")))
    }

    /// Hand an auto-accepted response to the transport. The transition is
    /// already committed, so a delivery failure is logged and the message
    /// left for the application to retry.
    pub(crate) async fn deliver_or_log(
        &self, message: &impl Serialize, connection_id: Option<&str>,
    ) {
        if let Err(e) = self.deliver(message, connection_id).await {
            tracing::warn!("auto-accepted response not delivered: {e}");
        }
    }
}
