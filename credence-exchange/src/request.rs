//! # Request
//!
//! Operations for the request-credential step: an issuer consumes the
//! holder's request and answers it by issuing the credential.

use std::collections::HashMap;

use credence_didcomm::message::{IssueCredential, RequestCredential};
use credence_didcomm::provider::{MessageKind, MessageRole, Provider};
use credence_didcomm::record::{AutoAcceptPolicy, ExchangeRecord, ExchangeState, Role};
use credence_didcomm::{Error, Result, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::coordinator::{self, MessageFields};
use crate::Protocol;

/// Options for answering a received request by issuing the credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AcceptRequestOptions {
    /// The exchange record to accept the request of.
    pub record_id: String,

    /// Per-format credential inputs. When absent, every format present in
    /// the request is issued.
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

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Handle an inbound request as issuer. A request for an unknown thread
    /// bootstraps a new exchange unless the engine is configured to reject
    /// unsolicited requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the known record is in the wrong state or
    /// version, the request is unsolicited and
    /// [`reject_unsolicited_requests`](crate::ProtocolConfig::reject_unsolicited_requests)
    /// is set, no format service matches the message, or the
    /// format/attachment pairing is broken.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_request(
        &self, message: RequestCredential, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        tracing::debug!("processing credential request {}", message.id);

        let services = self.services_for_message(&message.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to process request".into()));
        }

        let existing =
            self.find_by_thread(message.thread_id(), Some(Role::Issuer), None).await?;

        let record = if let Some(mut record) = existing {
            record.assert_version(PROTOCOL_VERSION)?;
            record.assert_state(ExchangeState::OfferSent)?;

            if record.connection_id.is_none() {
                record.connection_id = connection_id.map(ToOwned::to_owned);
            }

            coordinator::process_request(&self.provider, &record, &services, &message).await?;
            self.update_state(&mut record, ExchangeState::RequestReceived).await?;
            record
        } else {
            if self.config.reject_unsolicited_requests {
                return Err(Error::UnexpectedMessage(format!(
                    "request received for unknown thread {}",
                    message.thread_id()
                )));
            }

            tracing::debug!("no record found for request, creating a new one");

            let mut record = ExchangeRecord::new(
                Role::Issuer,
                ExchangeState::RequestReceived,
                message.thread_id(),
            );
            record.parent_thread_id = message.parent_thread_id().map(ToOwned::to_owned);
            record.connection_id = connection_id.map(ToOwned::to_owned);

            coordinator::process_request(&self.provider, &record, &services, &message).await?;
            self.save_new(&record).await?;
            record
        };

        if self.should_auto_respond_to_request(&record, &message).await {
            let (record, credential) = self
                .accept_request(AcceptRequestOptions {
                    record_id: record.id.clone(),
                    ..AcceptRequestOptions::default()
                })
                .await?;
            self.deliver_or_log(&credential, record.connection_id.as_deref()).await;
            return Ok(record);
        }

        Ok(record)
    }

    /// Answer a received request by issuing the credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `request-received`, the
    /// stored request cannot be found, or no format service matches the
    /// input or the stored request.
    #[instrument(level = "debug", skip(self))]
    pub async fn accept_request(
        &self, options: AcceptRequestOptions,
    ) -> Result<(ExchangeRecord, IssueCredential)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::RequestReceived)?;

        // with no explicit input, issue every format present in the request
        let mut services =
            options.formats.as_ref().map_or_else(Vec::new, |f| self.services_for_inputs(f));
        if services.is_empty() {
            let request: RequestCredential = coordinator::require_message(
                &self.provider,
                &record.id,
                MessageKind::Request,
                Some(MessageRole::Receiver),
            )
            .await?;
            services = self.services_for_message(&request.formats);
        }
        if services.is_empty() {
            return Err(Error::NoSupportedFormats(
                "unable to accept request; no supported formats provided as input or in request message".into(),
            ));
        }

        let fields = MessageFields {
            comment: options.comment.clone(),
            goal_code: options.goal_code.clone(),
            goal: options.goal.clone(),
        };
        let message = coordinator::accept_request(
            &self.provider,
            &mut record,
            &services,
            options.formats.as_ref(),
            fields,
        )
        .await?;

        record.auto_accept = options.auto_accept.or(record.auto_accept);
        self.update_state(&mut record, ExchangeState::CredentialIssued).await?;

        Ok((record, message))
    }
}
