//! # Revocation
//!
//! Out-of-band revocation notifications. A revocation message is correlated
//! by a derived `<format-kind>::<credential-id>` identifier matched against
//! the format bindings recorded at the issue step, not by the exchange
//! thread. A notification that fails to parse or correlate is logged and
//! swallowed: a malformed out-of-band message must not abort an otherwise
//! healthy exchange.

use chrono::Utc;
use credence_didcomm::message::Revoke;
use credence_didcomm::provider::{EventEmitter, ExchangeEvent, ExchangeStore, Provider};
use credence_didcomm::record::{ExchangeRecord, RevocationNotification};
use credence_didcomm::{Error, Result};
use tracing::instrument;

use crate::Protocol;

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Handle an inbound revocation notification. Returns the record the
    /// notification was correlated to, or `None` when the identifier is
    /// malformed or matches no record.
    ///
    /// # Errors
    ///
    /// Returns an error only on storage failure; correlation failures are
    /// swallowed by design.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_revocation_notification(
        &self, message: Revoke,
    ) -> Result<Option<ExchangeRecord>> {
        tracing::debug!("processing revocation notification {}", message.id);

        let Some((kind, credential_id)) = message.credential_id.split_once("::") else {
            tracing::warn!(
                "revocation notification with malformed credential id '{}', ignoring",
                message.credential_id
            );
            return Ok(None);
        };

        let record = self
            .provider
            .find_by_binding(kind, credential_id)
            .await
            .map_err(|e| Error::ServerError(format!("issue resolving record: {e}")))?;
        let Some(mut record) = record else {
            tracing::warn!(
                "no exchange found for revoked credential '{}', ignoring",
                message.credential_id
            );
            return Ok(None);
        };

        record.revocation_notification = Some(RevocationNotification {
            comment: message.comment,
            received_at: Utc::now(),
        });
        record.updated_at = Utc::now();

        self.provider
            .update(&record)
            .await
            .map_err(|e| Error::ServerError(format!("issue updating record: {e}")))?;
        self.provider
            .emit(ExchangeEvent::RevocationReceived {
                record: record.clone(),
            })
            .await;

        Ok(Some(record))
    }
}
