//! # Credential
//!
//! Operations for the issue-credential and ack steps: a holder consumes the
//! issued credential and acknowledges it, and the issuer consumes the
//! acknowledgement to complete the exchange.

use credence_didcomm::message::{Ack, AckStatus, IssueCredential, Thread, ACK};
use credence_didcomm::provider::Provider;
use credence_didcomm::record::{ExchangeRecord, ExchangeState, Role};
use credence_didcomm::{gen, Error, Result, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::coordinator;
use crate::Protocol;

/// Options for acknowledging a received credential.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AcceptCredentialOptions {
    /// The exchange record to acknowledge the credential of.
    pub record_id: String,
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Handle an issued credential as holder. The credential must answer a
    /// request we sent; there is no bootstrap path for credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if no record matches the thread, the record is in
    /// the wrong state or version, the stored request cannot be found, no
    /// format service matches the message, or the format/attachment pairing
    /// is broken.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_credential(
        &self, message: IssueCredential, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        tracing::debug!("processing credential {}", message.id);

        let mut record = self
            .require_by_thread(message.thread_id(), Some(Role::Holder), connection_id)
            .await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::RequestSent)?;

        let services = self.services_for_message(&message.formats);
        if services.is_empty() {
            return Err(Error::NoSupportedFormats("unable to process credential".into()));
        }

        coordinator::process_credential(&self.provider, &mut record, &services, &message).await?;
        self.update_state(&mut record, ExchangeState::CredentialReceived).await?;

        if self.should_auto_respond_to_credential(&record, &message).await {
            let (record, ack) = self
                .accept_credential(AcceptCredentialOptions {
                    record_id: record.id.clone(),
                })
                .await?;
            self.deliver_or_log(&ack, record.connection_id.as_deref()).await;
            return Ok(record);
        }

        Ok(record)
    }

    /// Acknowledge a received credential, completing the exchange on the
    /// holder side.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not in `credential-received`.
    #[instrument(level = "debug", skip(self))]
    pub async fn accept_credential(
        &self, options: AcceptCredentialOptions,
    ) -> Result<(ExchangeRecord, Ack)> {
        let mut record = self.fetch_record(&options.record_id).await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::CredentialReceived)?;

        let message = Ack {
            id: gen::message_id(),
            type_uri: ACK.into(),
            thread: Some(Thread {
                thread_id: record.thread_id.clone(),
                parent_thread_id: record.parent_thread_id.clone(),
            }),
            status: AckStatus::Ok,
        };

        self.update_state(&mut record, ExchangeState::Done).await?;

        Ok((record, message))
    }

    /// Handle the holder's acknowledgement as issuer, completing the
    /// exchange.
    ///
    /// # Errors
    ///
    /// Returns an error if no record matches the thread or the record is in
    /// the wrong state or version.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_ack(
        &self, message: Ack, connection_id: Option<&str>,
    ) -> Result<ExchangeRecord> {
        tracing::debug!("processing credential ack {}", message.id);

        let mut record = self
            .require_by_thread(message.thread_id(), Some(Role::Issuer), connection_id)
            .await?;
        record.assert_version(PROTOCOL_VERSION)?;
        record.assert_state(ExchangeState::CredentialIssued)?;

        self.update_state(&mut record, ExchangeState::Done).await?;

        Ok(record)
    }
}
