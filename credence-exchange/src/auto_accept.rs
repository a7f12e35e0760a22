//! # Auto Accept
//!
//! Policy-driven automatic progression. After each inbound data-carrying
//! message the engine evaluates the policy in effect for the record (the
//! record-level override, else the engine-wide default) and, when it
//! approves, performs the corresponding accept operation itself.
//!
//! `content-approved` compares the inbound message against the counterpart
//! message previously stored for the exchange. Absence of the counterpart
//! answers false: what cannot be compared cannot be approved. Approval is
//! conjunctive across format services, and when both sides carry a claims
//! preview the previews must agree.

use std::collections::{HashMap, HashSet};

use credence_didcomm::message::{
    IssueCredential, OfferCredential, PreviewAttribute, ProposeCredential, RequestCredential,
};
use credence_didcomm::provider::{MessageKind, Provider};
use credence_didcomm::record::{AutoAcceptPolicy, ExchangeRecord};

use crate::coordinator;
use crate::Protocol;

/// Whether two claim previews agree: set-equal by (name, value, media-type)
/// with no duplicate names on either side. Order is insignificant.
#[must_use]
pub fn preview_attributes_equal(a: &[PreviewAttribute], b: &[PreviewAttribute]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut index = HashMap::with_capacity(a.len());
    for attribute in a {
        let value = (attribute.value.as_str(), attribute.media_type.as_deref());
        if index.insert(attribute.name.as_str(), value).is_some() {
            return false;
        }
    }

    let mut seen = HashSet::with_capacity(b.len());
    for attribute in b {
        if !seen.insert(attribute.name.as_str()) {
            return false;
        }
        let value = (attribute.value.as_str(), attribute.media_type.as_deref());
        if index.get(attribute.name.as_str()) != Some(&value) {
            return false;
        }
    }

    true
}

fn previews_agree(
    a: Option<&[PreviewAttribute]>, b: Option<&[PreviewAttribute]>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => preview_attributes_equal(a, b),
        _ => false,
    }
}

impl<P> Protocol<P>
where
    P: Provider,
{
    /// Whether to answer an inbound proposal with an offer immediately.
    pub(crate) async fn should_auto_respond_to_proposal(
        &self, record: &ExchangeRecord, proposal: &ProposeCredential,
    ) -> bool {
        match record.effective_auto_accept(self.config.auto_accept) {
            AutoAcceptPolicy::Always => true,
            AutoAcceptPolicy::Never => false,
            AutoAcceptPolicy::ContentApproved => {
                self.proposal_content_approved(record, proposal).await
            }
        }
    }

    async fn proposal_content_approved(
        &self, record: &ExchangeRecord, proposal: &ProposeCredential,
    ) -> bool {
        // the counterpart is the offer we last sent
        let offer: Option<OfferCredential> =
            match coordinator::find_message(&self.provider, &record.id, MessageKind::Offer, None)
                .await
            {
                Ok(offer) => offer,
                Err(e) => {
                    tracing::warn!("issue retrieving offer for auto-accept: {e}");
                    return false;
                }
            };
        let Some(offer) = offer else {
            return false;
        };

        // judge with the services of the message we sent, not the inbound one
        let services = self.services_for_message(&offer.formats);
        if services.is_empty() {
            return false;
        }

        for service in &services {
            let Some(offer_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &offer.formats,
                &offer.offer_attachments,
            ) else {
                return false;
            };
            let Some(proposal_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &proposal.formats,
                &proposal.proposal_attachments,
            ) else {
                return false;
            };

            if !service
                .should_auto_respond_to_proposal(record, proposal_attachment, offer_attachment)
                .await
            {
                return false;
            }
        }

        previews_agree(
            proposal.credential_preview.as_ref().map(|p| p.attributes.as_slice()),
            offer.credential_preview.as_ref().map(|p| p.attributes.as_slice()),
        )
    }

    /// Whether to answer an inbound offer with a request immediately.
    pub(crate) async fn should_auto_respond_to_offer(
        &self, record: &ExchangeRecord, offer: &OfferCredential,
    ) -> bool {
        match record.effective_auto_accept(self.config.auto_accept) {
            AutoAcceptPolicy::Always => true,
            AutoAcceptPolicy::Never => false,
            AutoAcceptPolicy::ContentApproved => self.offer_content_approved(record, offer).await,
        }
    }

    async fn offer_content_approved(
        &self, record: &ExchangeRecord, offer: &OfferCredential,
    ) -> bool {
        // the counterpart is the proposal we last sent
        let proposal: Option<ProposeCredential> = match coordinator::find_message(
            &self.provider,
            &record.id,
            MessageKind::Proposal,
            None,
        )
        .await
        {
            Ok(proposal) => proposal,
            Err(e) => {
                tracing::warn!("issue retrieving proposal for auto-accept: {e}");
                return false;
            }
        };
        let Some(proposal) = proposal else {
            return false;
        };

        let services = self.services_for_message(&proposal.formats);
        if services.is_empty() {
            return false;
        }

        for service in &services {
            let Some(offer_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &offer.formats,
                &offer.offer_attachments,
            ) else {
                return false;
            };
            let Some(proposal_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &proposal.formats,
                &proposal.proposal_attachments,
            ) else {
                return false;
            };

            if !service
                .should_auto_respond_to_offer(record, proposal_attachment, offer_attachment)
                .await
            {
                return false;
            }
        }

        previews_agree(
            proposal.credential_preview.as_ref().map(|p| p.attributes.as_slice()),
            offer.credential_preview.as_ref().map(|p| p.attributes.as_slice()),
        )
    }

    /// Whether to answer an inbound request by issuing immediately.
    pub(crate) async fn should_auto_respond_to_request(
        &self, record: &ExchangeRecord, request: &RequestCredential,
    ) -> bool {
        match record.effective_auto_accept(self.config.auto_accept) {
            AutoAcceptPolicy::Always => true,
            AutoAcceptPolicy::Never => false,
            AutoAcceptPolicy::ContentApproved => {
                self.request_content_approved(record, request).await
            }
        }
    }

    async fn request_content_approved(
        &self, record: &ExchangeRecord, request: &RequestCredential,
    ) -> bool {
        // the counterpart is the offer we last sent; the proposal may also
        // inform the judgement but is not required
        let (offer, proposal) = match self.stored_offer_and_proposal(record).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("issue retrieving messages for auto-accept: {e}");
                return false;
            }
        };
        let Some(offer) = offer else {
            return false;
        };

        let services = self.services_for_message(&offer.formats);
        if services.is_empty() {
            return false;
        }

        for service in &services {
            let Some(offer_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &offer.formats,
                &offer.offer_attachments,
            ) else {
                return false;
            };
            let Some(request_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &request.formats,
                &request.request_attachments,
            ) else {
                return false;
            };
            let proposal_attachment = proposal.as_ref().and_then(|proposal| {
                coordinator::find_attachment_for_service(
                    service.as_ref(),
                    &proposal.formats,
                    &proposal.proposal_attachments,
                )
            });

            if !service
                .should_auto_respond_to_request(
                    record,
                    offer_attachment,
                    request_attachment,
                    proposal_attachment,
                )
                .await
            {
                return false;
            }
        }

        true
    }

    /// Whether to acknowledge an issued credential immediately.
    pub(crate) async fn should_auto_respond_to_credential(
        &self, record: &ExchangeRecord, credential: &IssueCredential,
    ) -> bool {
        match record.effective_auto_accept(self.config.auto_accept) {
            AutoAcceptPolicy::Always => true,
            AutoAcceptPolicy::Never => false,
            AutoAcceptPolicy::ContentApproved => {
                self.credential_content_approved(record, credential).await
            }
        }
    }

    async fn credential_content_approved(
        &self, record: &ExchangeRecord, credential: &IssueCredential,
    ) -> bool {
        // the counterpart is the request we sent
        let request: Option<RequestCredential> = match coordinator::find_message(
            &self.provider,
            &record.id,
            MessageKind::Request,
            None,
        )
        .await
        {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!("issue retrieving request for auto-accept: {e}");
                return false;
            }
        };
        let Some(request) = request else {
            return false;
        };

        let (offer, proposal) = match self.stored_offer_and_proposal(record).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("issue retrieving messages for auto-accept: {e}");
                return false;
            }
        };

        let services = self.services_for_message(&request.formats);
        if services.is_empty() {
            return false;
        }

        for service in &services {
            let Some(credential_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &credential.formats,
                &credential.credential_attachments,
            ) else {
                return false;
            };
            let Some(request_attachment) = coordinator::find_attachment_for_service(
                service.as_ref(),
                &request.formats,
                &request.request_attachments,
            ) else {
                return false;
            };
            let offer_attachment = offer.as_ref().and_then(|offer| {
                coordinator::find_attachment_for_service(
                    service.as_ref(),
                    &offer.formats,
                    &offer.offer_attachments,
                )
            });
            let proposal_attachment = proposal.as_ref().and_then(|proposal| {
                coordinator::find_attachment_for_service(
                    service.as_ref(),
                    &proposal.formats,
                    &proposal.proposal_attachments,
                )
            });

            if !service
                .should_auto_respond_to_credential(
                    record,
                    credential_attachment,
                    request_attachment,
                    offer_attachment,
                    proposal_attachment,
                )
                .await
            {
                return false;
            }
        }

        true
    }

    async fn stored_offer_and_proposal(
        &self, record: &ExchangeRecord,
    ) -> credence_didcomm::Result<(Option<OfferCredential>, Option<ProposeCredential>)> {
        let offer =
            coordinator::find_message(&self.provider, &record.id, MessageKind::Offer, None)
                .await?;
        let proposal =
            coordinator::find_message(&self.provider, &record.id, MessageKind::Proposal, None)
                .await?;
        Ok((offer, proposal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attribute(name: &str, value: &str) -> PreviewAttribute {
        PreviewAttribute {
            name: name.into(),
            media_type: None,
            value: value.into(),
        }
    }

    #[test]
    fn equal_ignoring_order() {
        let a = vec![attribute("age", "99"), attribute("name", "Alice")];
        let b = vec![attribute("name", "Alice"), attribute("age", "99")];
        assert!(preview_attributes_equal(&a, &b));
    }

    #[test]
    fn duplicate_name_rejected() {
        let a = vec![attribute("x", "1")];
        let b = vec![attribute("x", "1"), attribute("x", "2")];
        assert!(!preview_attributes_equal(&a, &b));

        let c = vec![attribute("x", "1"), attribute("x", "1")];
        assert!(!preview_attributes_equal(&c, &c));
    }

    #[test]
    fn value_mismatch_rejected() {
        let a = vec![attribute("age", "99")];
        let b = vec![attribute("age", "100")];
        assert!(!preview_attributes_equal(&a, &b));
    }

    #[test]
    fn media_type_mismatch_rejected() {
        let a = vec![PreviewAttribute {
            name: "photo".into(),
            media_type: Some("image/png".into()),
            value: "aGk=".into(),
        }];
        let b = vec![PreviewAttribute {
            name: "photo".into(),
            media_type: None,
            value: "aGk=".into(),
        }];
        assert!(!preview_attributes_equal(&a, &b));
    }

    #[test]
    fn one_sided_preview_rejected() {
        let a = vec![attribute("age", "99")];
        assert!(previews_agree(None, None));
        assert!(!previews_agree(Some(&a), None));
        assert!(!previews_agree(None, Some(&a)));
    }
}
