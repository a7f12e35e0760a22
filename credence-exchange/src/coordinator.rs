//! # Format Coordinator
//!
//! Fans a protocol step out across the format services relevant to a message
//! and assembles the results into one wire message, or dissects an inbound
//! message back into per-service attachments. The coordinator never
//! interprets attachment content; it only maintains the 1:1 pairing between
//! formats entries and attachments, so a new credential encoding needs no
//! change here.
//!
//! Every built or consumed message is persisted against its record so later
//! steps (and auto-accept evaluation) can retrieve "the offer we sent", "the
//! proposal we received", and so on.

use std::collections::HashMap;
use std::sync::Arc;

use credence_didcomm::format::FormatService;
use credence_didcomm::gen;
use credence_didcomm::message::{
    Attachment, CredentialPreview, FormatSpec, IssueCredential, OfferCredential, PleaseAck,
    ProposeCredential, RequestCredential, Thread, ISSUE_CREDENTIAL, OFFER_CREDENTIAL,
    PROPOSE_CREDENTIAL, REQUEST_CREDENTIAL,
};
use credence_didcomm::provider::{MessageKind, MessageRole, MessageStore, Provider};
use credence_didcomm::record::ExchangeRecord;
use credence_didcomm::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Free-text fields common to all data-carrying messages.
#[derive(Clone, Debug, Default)]
pub(crate) struct MessageFields {
    pub comment: Option<String>,
    pub goal_code: Option<String>,
    pub goal: Option<String>,
}

/// Serialize a message for storage or transport.
pub(crate) fn to_value<T: Serialize>(message: &T) -> Result<Value> {
    serde_json::to_value(message)
        .map_err(|e| Error::ServerError(format!("issue serializing message: {e}")))
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::ServerError(format!("issue deserializing stored message: {e}")))
}

/// Retrieve a stored message, tolerating absence.
pub(crate) async fn find_message<P: Provider, T: DeserializeOwned>(
    provider: &P, record_id: &str, kind: MessageKind, role: Option<MessageRole>,
) -> Result<Option<T>> {
    let value = provider
        .find_message(record_id, kind, role)
        .await
        .map_err(|e| Error::ServerError(format!("issue retrieving stored message: {e}")))?;
    value.map(from_value).transpose()
}

/// Retrieve a stored message the step cannot proceed without.
pub(crate) async fn require_message<P: Provider, T: DeserializeOwned>(
    provider: &P, record_id: &str, kind: MessageKind, role: Option<MessageRole>,
) -> Result<T> {
    find_message(provider, record_id, kind, role).await?.ok_or_else(|| {
        Error::NotFound(format!("no stored {kind} message for record {record_id}"))
    })
}

async fn save_message<P: Provider, T: Serialize>(
    provider: &P, record_id: &str, kind: MessageKind, role: MessageRole, message: &T,
) -> Result<()> {
    let value = to_value(message)?;
    provider
        .save_message(record_id, kind, role, &value)
        .await
        .map_err(|e| Error::ServerError(format!("issue saving message: {e}")))
}

/// Resolve the attachment belonging to a service: find the formats entry the
/// service recognises, then the attachment that entry points at. Both
/// lookups fault on failure, since a broken pairing indicates a malformed or
/// tampered message.
pub(crate) fn attachment_for_service<'a>(
    service: &dyn FormatService, formats: &[FormatSpec], attachments: &'a [Attachment],
) -> Result<&'a Attachment> {
    let spec = formats.iter().find(|f| service.supports_format(&f.format)).ok_or_else(|| {
        Error::MissingAttachment(format!(
            "no formats entry for service {}",
            service.format_key()
        ))
    })?;

    attachments.iter().find(|a| a.id == spec.attachment_id).ok_or_else(|| {
        Error::MissingAttachment(format!(
            "attachment {} not found in message",
            spec.attachment_id
        ))
    })
}

/// Non-faulting variant of [`attachment_for_service`], for call sites that
/// tolerate absence (auto-accept evaluation).
pub(crate) fn find_attachment_for_service<'a>(
    service: &dyn FormatService, formats: &[FormatSpec], attachments: &'a [Attachment],
) -> Option<&'a Attachment> {
    let spec = formats.iter().find(|f| service.supports_format(&f.format))?;
    attachments.iter().find(|a| a.id == spec.attachment_id)
}

fn thread_for(record: &ExchangeRecord) -> Option<Thread> {
    Some(Thread {
        thread_id: record.thread_id.clone(),
        parent_thread_id: record.parent_thread_id.clone(),
    })
}

fn service_err(service: &dyn FormatService, e: anyhow::Error) -> Error {
    Error::ServerError(format!("format service {}: {e}", service.format_key()))
}

/// Build a proposal message from the services' proposal payloads.
pub(crate) async fn create_proposal<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    inputs: Option<&HashMap<String, Value>>, fields: MessageFields,
) -> Result<ProposeCredential> {
    let mut formats = Vec::new();
    let mut attachments = Vec::new();
    let mut preview = None;

    for service in services {
        let input = inputs.and_then(|inputs| inputs.get(service.format_key()));
        let output = service
            .create_proposal(record, input)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;

        if let Some(attributes) = output.preview {
            preview = Some(attributes);
        }
        formats.push(output.format);
        attachments.push(output.attachment);
    }

    record.preview_attributes = preview.clone();

    // the first message of the thread carries the thread id as its own id
    let message = ProposeCredential {
        id: record.thread_id.clone(),
        type_uri: PROPOSE_CREDENTIAL.into(),
        thread: thread_for(record),
        formats,
        proposal_attachments: attachments,
        credential_preview: preview.map(CredentialPreview::new),
        comment: fields.comment,
        goal_code: fields.goal_code,
        goal: fields.goal,
    };

    save_message(provider, &record.id, MessageKind::Proposal, MessageRole::Sender, &message)
        .await?;

    Ok(message)
}

/// Consume an inbound proposal, handing each service its attachment.
pub(crate) async fn process_proposal<P: Provider>(
    provider: &P, record: &ExchangeRecord, services: &[Arc<dyn FormatService>],
    message: &ProposeCredential,
) -> Result<()> {
    for service in services {
        let attachment =
            attachment_for_service(service.as_ref(), &message.formats, &message.proposal_attachments)?;
        service
            .process_proposal(record, attachment)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;
    }

    save_message(provider, &record.id, MessageKind::Proposal, MessageRole::Receiver, message).await
}

/// Build an offer answering the stored proposal.
pub(crate) async fn accept_proposal<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    inputs: Option<&HashMap<String, Value>>, fields: MessageFields,
) -> Result<OfferCredential> {
    let proposal: ProposeCredential = require_message(
        provider,
        &record.id,
        MessageKind::Proposal,
        Some(MessageRole::Receiver),
    )
    .await?;

    let mut formats = Vec::new();
    let mut attachments = Vec::new();
    let mut preview = None;

    for service in services {
        let proposal_attachment = attachment_for_service(
            service.as_ref(),
            &proposal.formats,
            &proposal.proposal_attachments,
        )?;
        let input = inputs.and_then(|inputs| inputs.get(service.format_key()));
        let output = service
            .accept_proposal(record, proposal_attachment, input)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;

        if let Some(attributes) = output.preview {
            preview = Some(attributes);
        }
        formats.push(output.format);
        attachments.push(output.attachment);
    }

    record.preview_attributes = preview.clone();

    let message = OfferCredential {
        id: gen::message_id(),
        type_uri: OFFER_CREDENTIAL.into(),
        thread: thread_for(record),
        formats,
        offer_attachments: attachments,
        credential_preview: preview.map(CredentialPreview::new),
        comment: fields.comment,
        goal_code: fields.goal_code,
        goal: fields.goal,
    };

    save_message(provider, &record.id, MessageKind::Offer, MessageRole::Sender, &message).await?;

    Ok(message)
}

/// Build an offer from the services' offer payloads, not bound to a
/// proposal.
pub(crate) async fn create_offer<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    inputs: Option<&HashMap<String, Value>>, fields: MessageFields,
) -> Result<OfferCredential> {
    let mut formats = Vec::new();
    let mut attachments = Vec::new();
    let mut preview = None;

    for service in services {
        let input = inputs.and_then(|inputs| inputs.get(service.format_key()));
        let output = service
            .create_offer(record, input)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;

        if let Some(attributes) = output.preview {
            preview = Some(attributes);
        }
        formats.push(output.format);
        attachments.push(output.attachment);
    }

    record.preview_attributes = preview.clone();

    let message = OfferCredential {
        id: gen::message_id(),
        type_uri: OFFER_CREDENTIAL.into(),
        thread: thread_for(record),
        formats,
        offer_attachments: attachments,
        credential_preview: preview.map(CredentialPreview::new),
        comment: fields.comment,
        goal_code: fields.goal_code,
        goal: fields.goal,
    };

    save_message(provider, &record.id, MessageKind::Offer, MessageRole::Sender, &message).await?;

    Ok(message)
}

/// Consume an inbound offer, handing each service its attachment.
pub(crate) async fn process_offer<P: Provider>(
    provider: &P, record: &ExchangeRecord, services: &[Arc<dyn FormatService>],
    message: &OfferCredential,
) -> Result<()> {
    for service in services {
        let attachment =
            attachment_for_service(service.as_ref(), &message.formats, &message.offer_attachments)?;
        service
            .process_offer(record, attachment)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;
    }

    save_message(provider, &record.id, MessageKind::Offer, MessageRole::Receiver, message).await
}

/// Build a request answering the stored offer.
pub(crate) async fn accept_offer<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    inputs: Option<&HashMap<String, Value>>, fields: MessageFields,
) -> Result<RequestCredential> {
    let offer: OfferCredential =
        require_message(provider, &record.id, MessageKind::Offer, Some(MessageRole::Receiver))
            .await?;

    let mut formats = Vec::new();
    let mut attachments = Vec::new();

    for service in services {
        let offer_attachment =
            attachment_for_service(service.as_ref(), &offer.formats, &offer.offer_attachments)?;
        let input = inputs.and_then(|inputs| inputs.get(service.format_key()));
        let output = service
            .accept_offer(record, offer_attachment, input)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;

        formats.push(output.format);
        attachments.push(output.attachment);
    }

    // accepting the offer fixes the claims being negotiated
    record.preview_attributes = offer.credential_preview.map(|preview| preview.attributes);

    let message = RequestCredential {
        id: gen::message_id(),
        type_uri: REQUEST_CREDENTIAL.into(),
        thread: thread_for(record),
        formats,
        request_attachments: attachments,
        comment: fields.comment,
        goal_code: fields.goal_code,
        goal: fields.goal,
    };

    save_message(provider, &record.id, MessageKind::Request, MessageRole::Sender, &message)
        .await?;

    Ok(message)
}

/// Consume an inbound request, handing each service its attachment.
pub(crate) async fn process_request<P: Provider>(
    provider: &P, record: &ExchangeRecord, services: &[Arc<dyn FormatService>],
    message: &RequestCredential,
) -> Result<()> {
    for service in services {
        let attachment = attachment_for_service(
            service.as_ref(),
            &message.formats,
            &message.request_attachments,
        )?;
        service
            .process_request(record, attachment)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;
    }

    save_message(provider, &record.id, MessageKind::Request, MessageRole::Receiver, message).await
}

/// Build a credential answering the stored request. The offer we sent is
/// passed along when present; an exchange bootstrapped by an unsolicited
/// request has none.
pub(crate) async fn accept_request<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    inputs: Option<&HashMap<String, Value>>, fields: MessageFields,
) -> Result<IssueCredential> {
    let request: RequestCredential = require_message(
        provider,
        &record.id,
        MessageKind::Request,
        Some(MessageRole::Receiver),
    )
    .await?;
    let offer: Option<OfferCredential> =
        find_message(provider, &record.id, MessageKind::Offer, Some(MessageRole::Sender)).await?;

    let mut formats = Vec::new();
    let mut attachments = Vec::new();

    for service in services {
        let request_attachment = attachment_for_service(
            service.as_ref(),
            &request.formats,
            &request.request_attachments,
        )?;
        let offer_attachment = match &offer {
            Some(offer) => Some(attachment_for_service(
                service.as_ref(),
                &offer.formats,
                &offer.offer_attachments,
            )?),
            None => None,
        };
        let input = inputs.and_then(|inputs| inputs.get(service.format_key()));
        let output = service
            .accept_request(record, request_attachment, offer_attachment, input)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?;

        formats.push(output.format);
        attachments.push(output.attachment);
    }

    let message = IssueCredential {
        id: gen::message_id(),
        type_uri: ISSUE_CREDENTIAL.into(),
        thread: thread_for(record),
        formats,
        credential_attachments: attachments,
        please_ack: Some(PleaseAck::on_receipt()),
        comment: fields.comment,
        goal_code: fields.goal_code,
        goal: fields.goal,
    };

    save_message(provider, &record.id, MessageKind::Credential, MessageRole::Sender, &message)
        .await?;

    Ok(message)
}

/// Consume an issued credential, handing each service its attachment along
/// with the request attachment it answers, and appending any format bindings
/// the services return.
pub(crate) async fn process_credential<P: Provider>(
    provider: &P, record: &mut ExchangeRecord, services: &[Arc<dyn FormatService>],
    message: &IssueCredential,
) -> Result<()> {
    let request: RequestCredential = require_message(
        provider,
        &record.id,
        MessageKind::Request,
        Some(MessageRole::Sender),
    )
    .await?;

    for service in services {
        let credential_attachment = attachment_for_service(
            service.as_ref(),
            &message.formats,
            &message.credential_attachments,
        )?;
        let request_attachment = attachment_for_service(
            service.as_ref(),
            &request.formats,
            &request.request_attachments,
        )?;

        if let Some(binding) = service
            .process_credential(record, credential_attachment, request_attachment)
            .await
            .map_err(|e| service_err(service.as_ref(), e))?
        {
            record.format_bindings.push(binding);
        }
    }

    save_message(provider, &record.id, MessageKind::Credential, MessageRole::Receiver, message)
        .await
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use test_utils::TestFormatService;

    use super::*;

    #[test]
    fn pairing_lookup_resolves_the_declared_attachment() {
        let service = TestFormatService::new();
        let formats = vec![FormatSpec {
            attachment_id: "a-1".into(),
            format: "test/credential@v1.0".into(),
        }];
        let attachments =
            vec![Attachment::json("a-1", json!({"k": "v"})), Attachment::json("a-2", json!(2))];

        let found =
            attachment_for_service(&service, &formats, &attachments).expect("should resolve");
        assert_eq!(found.id, "a-1");
    }

    #[test]
    fn pairing_lookup_faults_on_missing_attachment() {
        let service = TestFormatService::new();
        let formats = vec![FormatSpec {
            attachment_id: "a-1".into(),
            format: "test/credential@v1.0".into(),
        }];

        let err = attachment_for_service(&service, &formats, &[]).expect_err("should fault");
        assert!(matches!(err, Error::MissingAttachment(_)));
    }

    #[test]
    fn pairing_lookup_faults_on_missing_formats_entry() {
        let service = TestFormatService::with_key("alt");
        let formats = vec![FormatSpec {
            attachment_id: "a-1".into(),
            format: "test/credential@v1.0".into(),
        }];
        let attachments = vec![Attachment::json("a-1", json!({"k": "v"}))];

        let err =
            attachment_for_service(&service, &formats, &attachments).expect_err("should fault");
        assert!(matches!(err, Error::MissingAttachment(_)));

        assert!(find_attachment_for_service(&service, &formats, &attachments).is_none());
    }
}
