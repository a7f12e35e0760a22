//! # Problem Report
//!
//! Abandonment of an exchange. Sending a problem report notifies the
//! counterparty without changing local state; receiving one transitions the
//! record to `abandoned` unconditionally, regardless of its current state,
//! because abandonment must always be representable.

use credence_didcomm::message::{
    ProblemDescription, ProblemReport, Thread, ISSUANCE_ABANDONED, PROBLEM_REPORT,
};
use credence_didcomm::provider::Provider;
use credence_didcomm::record::{ExchangeRecord, ExchangeState};
use credence_didcomm::{gen, Result};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::Protocol;

/// Options for sending a problem report.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct SendProblemReportOptions {
    /// The exchange record to report on.
    pub record_id: String,

    /// Human-readable description of the problem.
    pub description: String,
}

/// Build a problem report for a record.
pub(crate) fn build_problem_report(
    record: &ExchangeRecord, description: String,
) -> ProblemReport {
    ProblemReport {
        id: gen::message_id(),
        type_uri: PROBLEM_REPORT.into(),
        thread: Some(Thread {
            thread_id: record.thread_id.clone(),
            parent_thread_id: record.parent_thread_id.clone(),
        }),
        description: ProblemDescription {
            code: ISSUANCE_ABANDONED.into(),
            en: description,
        },
    }
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Notify the counterparty that the exchange is being abandoned. Local
    /// state is unchanged; the counterparty transitions on receipt.
    ///
    /// # Errors
    ///
    /// Returns an error if the record does not exist or the transport
    /// refuses the message.
    #[instrument(level = "debug", skip(self))]
    pub async fn send_problem_report(
        &self, options: SendProblemReportOptions,
    ) -> Result<(ExchangeRecord, ProblemReport)> {
        let record = self.fetch_record(&options.record_id).await?;
        let message = build_problem_report(&record, options.description.clone());

        self.deliver(&message, record.connection_id.as_deref()).await?;

        Ok((record, message))
    }

    /// Handle an inbound problem report. The record is resolved by thread id
    /// alone, since either side may abandon, and the transition carries no
    /// state precondition: abandoning an already-abandoned exchange is not a
    /// fault.
    ///
    /// # Errors
    ///
    /// Returns an error if no record matches the thread.
    #[instrument(level = "debug", skip(self, message))]
    pub async fn process_problem_report(&self, message: ProblemReport) -> Result<ExchangeRecord> {
        tracing::debug!("processing problem report {}", message.id);

        let mut record = self.require_by_thread(message.thread_id(), None, None).await?;

        record.error_message = Some(format!(
            "{}: {}",
            message.description.code, message.description.en
        ));
        self.update_state(&mut record, ExchangeState::Abandoned).await?;

        Ok(record)
    }
}
