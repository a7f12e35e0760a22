//! # Offer
//!
//! Operations for the offer-credential step: an issuer opens (or continues)
//! an exchange with an offer, a holder consumes it and answers with a
//! request, a counter-proposal, or a decline. Offers can also be created
//! without a connection for out-of-band issuance.

use std::collections::HashMap;

use credence_didcomm::message::{
    OfferCredential, ProblemReport, ProposeCredential, RequestCredential,
};
use credence_didcomm::provider::{MessageKind, MessageRole, Provider};
use credence_didcomm::record::{AutoAcceptPolicy, ExchangeRecord, ExchangeState, Role};
use credence_didcomm::{gen, Error, Result, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::coordinator::{self, MessageFields};
use crate::Protocol;

/// Options for offering a credential over a connection.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OfferCredentialOptions {
    /// The connection to offer over.
    pub connection_id: String,

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

    /// Auto-accept override for the new exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,
}

/// Options for creating a connection-less offer, e.g. for out-of-band
/// delivery.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CreateOfferOptions {
    /// Per-format offer inputs, keyed by format key.
    #[serde(default)]
    pub formats: HashMap<String, Value>,

    /// Links the new exchange to an originating parent exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_thread_id: Option<String>,

    /// Free-text note to the holder.
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

/// Options for answering a received offer with a request.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AcceptOfferOptions {
    /// The exchange record to accept the offer of.
    pub record_id: String,

    /// Per-format request inputs. When absent, every format present in the
    /// offer is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formats: Option<HashMap<String, Value>>,

    /// Free-text note to the issuer.
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

/// Options for declining a received offer.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DeclineOfferOptions {
    /// The exchange record to decline the offer of.
    pub record_id: String,

    /// Also notify the issuer with a problem report.
    #[serde(default)]
    pub send_problem_report: bool,

    /// Description for the problem report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem_report_description: Option<String>,
}

/// Options for answering a received offer with a counter-proposal.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct NegotiateOfferOptions {
    /// The exchange record to negotiate.
    pub record_id: String,

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

    /// Auto-accept override for the remainder of the exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_accept: Option<AutoAcceptPolicy>,
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Open a new exchange as issuer by offering a credential over a
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns an error if no format service matches the inputs or a
    /// provider callback fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn offer_credential(
        &self, options: OfferCredentialOptions,
    ) -> Result<(ExchangeRecord, OfferCredential)> {
        self.start_offer(
            Some(options.connection_id),
            None,
            options.formats,
            MessageFields {
                comment: options.comment,
                goal_code: options.goal_code,
                goal: options.goal,
            },
            options.auto_accept,
        )
        .await
    }

    /// Open a new connection-less exchange as issuer. The returned offer is
    /// delivered out-of-band; correlation relies solely on its thread id.
    ///
    /// # Errors
    ///
    /// Returns an error if no format service matches the inputs or a
    /// provider callback fails.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_offer(
        &self, options: CreateOfferOptions,
    ) -> Result<(ExchangeRecord, OfferCredential)> {
        self.start_offer(
            None,
            options.parent_thread_id,
            options.formats,
            MessageFields {
                comment: options.comment,
                goal_code: options.goal_code,
                goal: options.goal,
            },
            options.auto_accept,
        )
        .await
    }

    async fn start_offer(
        &self, connection_id: Option<String>, parent_thread_id: Option<String>,
        formats: HashMap<String, Value>, fields: MessageFields,
        auto_accept: Option<AutoAcceptPolicy>,
    ) -> Result<(ExchangeRecord, OfferCredential)> {
        let services = self.services_for_inputs(&formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to create offer".into()));
        }

        let mut record =
            ExchangeRecord::new(Role::Issuer, ExchangeState::OfferSent, gen::thread_id());
        record.connection_id = connection_id;
        record.parent_thread_id = parent_thread_id;
        record.auto_accept = auto_accept;

        let message = coordinator::create_offer(
            &self.provider,
            &mut record,
            &services,
            Some(&formats),
            fields,
        )
        .await?;

        self.save_new(&record).await?;

        Ok((record, message))
    }

    /// Handle an inbound offer as holder. An offer for an unknown thread
    /// bootstraps a new exchange; an offer for a known thread answers the
    /// proposal we sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the known record is in the wrong state or
    /// version, no format service matches the message, or the
    /// format/attachment pairing is broken.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_offer(
        &self, message: OfferCredential, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        tracing::debug!("processing credential offer {}", message.id);

        let services = self.services_for_message(&message.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to process offer".into()));
        }

        let existing = self
            .find_by_thread(message.thread_id(), Some(Role::Holder), connection_id)
            .await?;

        let record = if let Some(mut record) = existing {
            record.assert_version(PROTOCOL_VERSION)?;
            record.assert_state(ExchangeState::ProposalSent)?;

            coordinator::process_offer(&self.provider, &record, &services, &message).await?;
            self.update_state(&mut record, ExchangeState::OfferReceived).await?;
            record
        } else {
            tracing::debug!("no record found for offer, creating a new one");

            let mut record = ExchangeRecord::new(
                Role::Holder,
                ExchangeState::OfferReceived,
                message.thread_id(),
            );
            record.parent_thread_id = message.parent_thread_id().map(ToOwned::to_owned);
            record.connection_id = connection_id.map(ToOwned::to_owned);

            coordinator::process_offer(&self.provider, &record, &services, &message).await?;
            self.save_new(&record).await?;
            record
        };

        if self.should_auto_respond_to_offer(&record, &message).await {
            let (record, request) = self
                .accept_offer(AcceptOfferOptions {
                    record_id: record.id.clone(),
                    ..AcceptOfferOptions::default()
                })
                .await?;
            self.deliver_or_log(&request, record.connection_id.as_deref()).await;
            return Ok(record);
        }

        Ok(record)
    }

    /// Answer a received offer with a request.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `offer-received` or no
    /// format service matches the input or the stored offer.
    #[instrument(level = "debug", skip(self))]
    pub async fn accept_offer(
        &self, options: AcceptOfferOptions,
    ) -> Result<(ExchangeRecord, RequestCredential)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::OfferReceived)?;

        // with no explicit input, accept every format present in the offer
        let mut services =
            options.formats.as_ref().map_or_else(Vec::new, |f| self.services_for_inputs(f));
        if services.is_empty() {
            let offer: OfferCredential = coordinator::require_message(
                &self.provider,
                &record.id,
                MessageKind::Offer,
                Some(MessageRole::Receiver),
            )
            .await?;
            services = self.services_for_message(&offer.formats);
        }
        if services.is_empty() {
            return Err(Error::NoSupportedFormats(
                "unable to accept offer; no supported formats provided as input or in offer message".into(),
            ));
        }

        let fields = MessageFields {
            comment: options.comment.clone(),
            goal_code: options.goal_code.clone(),
            goal: options.goal.clone(),
        };
        let message = coordinator::accept_offer(
            &self.provider,
            &mut record,
            &services,
            options.formats.as_ref(),
            fields,
        )
        .await?;

        record.auto_accept = options.auto_accept.or(record.auto_accept);
        self.update_state(&mut record, ExchangeState::RequestSent).await?;

        Ok((record, message))
    }

    /// Decline a received offer, optionally notifying the issuer with a
    /// problem report. The decline is committed before the report is sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `offer-received`.
    #[instrument(level = "debug", skip(self))]
    pub async fn decline_offer(
        &self, options: DeclineOfferOptions,
    ) -> Result<(ExchangeRecord, Option<ProblemReport>)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::OfferReceived)?;

        let report = options.send_problem_report.then(|| {
            crate::problem_report::build_problem_report(
                &record,
                options
                    .problem_report_description
                    .clone()
                    .unwrap_or_else(|| "offer declined".into()),
            )
        });

        self.update_state(&mut record, ExchangeState::Declined).await?;

        if let Some(report) = &report {
            self.deliver_or_log(report, record.connection_id.as_deref()).await;
        }

        Ok((record, report))
    }

    /// Answer a received offer with a counter-proposal.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `offer-received`, has no
    /// connection, or no format service matches the inputs.
    #[instrument(level = "debug", skip(self))]
    pub async fn negotiate_offer(
        &self, options: NegotiateOfferOptions,
    ) -> Result<(ExchangeRecord, ProposeCredential)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::OfferReceived)?;

        if record.connection_id.is_none() {
            return Err(Error::NoConnection(format!(
                "record {} has no connection; connection-less exchanges do not support negotiation",
                record.id
            )));
        }

        let services = self.services_for_inputs(&options.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to create proposal".into()));
        }

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

        record.auto_accept = options.auto_accept.or(record.auto_accept);
        self.update_state(&mut record, ExchangeState::ProposalSent).await?;

        Ok((record, message))
    }
}
