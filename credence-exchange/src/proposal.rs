//! # Proposal
//!
//! Operations for the propose-credential step: a holder opens an exchange
//! with a proposal, an issuer consumes it and answers with an offer, either
//! by accepting the proposed content or by negotiating different content.

use std::collections::HashMap;

use credence_didcomm::message::{OfferCredential, ProposeCredential};
use credence_didcomm::provider::{MessageKind, MessageRole, Provider};
use credence_didcomm::record::{AutoAcceptPolicy, ExchangeRecord, ExchangeState, Role};
use credence_didcomm::{gen, Error, Result, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::coordinator::{self, MessageFields};
use crate::Protocol;

/// Options for creating a credential proposal.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProposeCredentialOptions {
    /// The connection to propose over.
    pub connection_id: String,

    /// Per-format proposal inputs, keyed by format key.
    #[serde(default)]
    pub formats: HashMap<String, Value>,

    /// Free-text note to the issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Auto-accept override for the new exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,
}

/// Options for answering a received proposal with an offer built from the
/// proposed content.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AcceptProposalOptions {
    /// The exchange record to accept the proposal of.
    pub record_id: String,

    /// Per-format offer inputs. When absent, every format present in the
    /// proposal is accepted as proposed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<HashMap<String, Value>>,

    /// Free-text note to the holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Auto-accept override for the remainder of the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,
}

/// Options for answering a received proposal with different content.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NegotiateProposalOptions {
    /// The exchange record to negotiate.
    pub record_id: String,

    /// Per-format offer inputs, keyed by format key.
    #[serde(default)]
    pub formats: HashMap<String, Value>,

    /// Free-text note to the holder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    /// Machine-readable goal code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<String>,

    /// Human-readable goal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,

    /// Auto-accept override for the remainder of the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Open a new exchange as holder by proposing a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if no format service matches the inputs or a
    /// provider callback fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn propose_credential(
        &self, options: ProposeCredentialOptions,
    ) -> Result<(ExchangeRecord, ProposeCredential)> {
        let services = self.services_for_inputs(&options.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to create proposal".into()));
        }

        let mut record =
            ExchangeRecord::new(Role::Holder, ExchangeState::ProposalSent, gen::thread_id());
        record.connection_id = Some(options.connection_id.clone());
        record.auto_accept = options.auto_accept;

        let fields = MessageFields {
            comment: options.comment.clone(),
            goal_code: options.goal_code.clone(),
            goal: options.goal.clone(),
        };
        let message = coordinator::create_proposal(
            &self.provider,
            &mut record,
            &services,
            Some(&options.formats),
            fields,
        )
        .await?;

        self.save_new(&record).await?;

        Ok((record, message))
    }

    /// Handle an inbound proposal as issuer. A proposal for an unknown
    /// thread bootstraps a new exchange; a proposal for a known thread is a
    /// renegotiation of the offer we sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the known record is in the wrong state or
    /// version, no format service matches the message, or the
    /// format/attachment pairing is broken.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_proposal(
        &self, message: ProposeCredential, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        tracing::debug!("processing credential proposal {}", message.id);

        let services = self.services_for_message(&message.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to process proposal".into()));
        }

        let existing =
            self.find_by_thread(message.thread_id(), Some(Role::Issuer), None).await?;

        let record = if let Some(mut record) = existing {
            record.assert_version(PROTOCOL_VERSION)?;
            record.assert_state(ExchangeState::OfferSent)?;

            if record.connection_id.is_none() {
                record.connection_id = connection_id.map(ToOwned::to_owned);
            }

            coordinator::process_proposal(&self.provider, &record, &services, &message).await?;
            self.update_state(&mut record, ExchangeState::ProposalReceived).await?;
            record
        } else {
            let mut record = ExchangeRecord::new(
                Role::Issuer,
                ExchangeState::ProposalReceived,
                message.thread_id(),
            );
            record.parent_thread_id = message.parent_thread_id().map(ToOwned::to_owned);
            record.connection_id = connection_id.map(ToOwned::to_owned);

            coordinator::process_proposal(&self.provider, &record, &services, &message).await?;
            self.save_new(&record).await?;
            record
        };

        // respond immediately when policy allows; a proposal can only be
        // answered over a connection
        if record.connection_id.is_some()
            && self.should_auto_respond_to_proposal(&record, &message).await
        {
            let (record, offer) = self
                .accept_proposal(AcceptProposalOptions {
                    record_id: record.id.clone(),
                    ..AcceptProposalOptions::default()
                })
                .await?;
            self.deliver_or_log(&offer, record.connection_id.as_deref()).await;
            return Ok(record);
        }

        Ok(record)
    }

    /// Answer a received proposal with an offer built from the proposed
    /// content.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `proposal-received`, has no
    /// connection, or no format service matches the input or the stored
    /// proposal.
    #[instrument(level = "debug", skip(self))]
    pub async fn accept_proposal(
        &self, options: AcceptProposalOptions,
    ) -> Result<(ExchangeRecord, OfferCredential)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::ProposalReceived)?;

        if record.connection_id.is_none() {
            return Err(Error::NoConnection(format!(
                "record {} has no connection; connection-less exchanges do not support negotiation",
                record.id
            )));
        }

        // with no explicit input, accept every format present in the proposal
        let mut services =
            options.formats.as_ref().map_or_else(Vec::new, |f| self.services_for_inputs(f));
        if services.is_empty() {
            let proposal: ProposeCredential = coordinator::require_message(
                &self.provider,
                &record.id,
                MessageKind::Proposal,
                Some(MessageRole::Receiver),
            )
            .await?;
            services = self.services_for_message(&proposal.formats);
        }
        if services.is_empty() {
            return Err(Error::NoSupportedFormats(
                "unable to accept proposal; no supported formats provided as input or in proposal message".into(),
            ));
        }

        let fields = MessageFields {
            comment: options.comment.clone(),
            goal_code: options.goal_code.clone(),
            goal: options.goal.clone(),
        };
        let message = coordinator::accept_proposal(
            &self.provider,
            &mut record,
            &services,
            options.formats.as_ref(),
            fields,
        )
        .await?;

        record.auto_accept = options.auto_accept.or(record.auto_accept);
        self.update_state(&mut record, ExchangeState::OfferSent).await?;

        Ok((record, message))
    }

    /// Answer a received proposal with different content.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `proposal-received`, has no
    /// connection, or no format service matches the inputs.
    #[instrument(level = "debug", skip(self))]
    pub async fn negotiate_proposal(
        &self, options: NegotiateProposalOptions,
    ) -> Result<(ExchangeRecord, OfferCredential)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::ProposalReceived)?;

        if record.connection_id.is_none() {
            return Err(Error::NoConnection(format!(
                "record {} has no connection; connection-less exchanges do not support negotiation",
                record.id
            )));
        }

        let services = self.services_for_inputs(&options.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to create offer".into()));
        }

        let fields = MessageFields {
            comment: options.comment.clone(),
            goal_code: options.goal_code.clone(),
            goal: options.goal.clone(),
        };
        let message = coordinator::create_offer(
            &self.provider,
            &mut record,
            &services,
            Some(&options.formats),
            fields,
        )
        .await?;

        record.auto_accept = options.auto_accept.or(record.auto_accept);
        self.update_state(&mut record, ExchangeState::OfferSent).await?;

        Ok((record, message))
    }
}
