//! Policy-driven automatic progression: always, never, and
//! content-approved evaluation after each inbound message.

mod utils;

use std::collections::HashMap;
use std::sync::Arc;

use credence_exchange::message::{
    IssueCredential, OfferCredential, RequestCredential, REQUEST_CREDENTIAL,
};
use credence_exchange::{
    AcceptProposalOptions, AutoAcceptPolicy, ExchangeState, FormatService,
    ProposeCredentialOptions, ProtocolConfig,
};
use serde_json::json;
use test_utils::TestFormatService;
use utils::{age_formats, party, party_with};

#[tokio::test]
async fn record_override_beats_engine_default() {
    test_utils::init_tracer();

    // engine default says never; the record says always
    let (holder, holder_provider) = party(ProtocolConfig {
        auto_accept: AutoAcceptPolicy::Never,
        ..ProtocolConfig::default()
    });
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            auto_accept: Some(AutoAcceptPolicy::Always),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");
    let (_, offer) = issuer
        .accept_proposal(AcceptProposalOptions {
            record_id: issuer_record.id,
            ..AcceptProposalOptions::default()
        })
        .await
        .expect("should accept proposal");

    // the offer is answered with a request without further input
    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::RequestSent);

    let sent = holder_provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0["@type"], REQUEST_CREDENTIAL);
}

#[tokio::test]
async fn content_approved_accepts_matching_offer() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig {
        auto_accept: AutoAcceptPolicy::ContentApproved,
        ..ProtocolConfig::default()
    });
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");

    // accepting without input offers exactly what was proposed, preview
    // included
    let (_, offer) = issuer
        .accept_proposal(AcceptProposalOptions {
            record_id: issuer_record.id,
            ..AcceptProposalOptions::default()
        })
        .await
        .expect("should accept proposal");
    assert!(offer.credential_preview.is_some());

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::RequestSent);
    assert_eq!(holder_provider.sent().len(), 1);
}

#[tokio::test]
async fn content_approved_accepts_when_neither_side_previews() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig {
        auto_accept: AutoAcceptPolicy::ContentApproved,
        ..ProtocolConfig::default()
    });
    let (issuer, _) = party(ProtocolConfig::default());

    // a proposal with no claim preview at all
    let (_, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: HashMap::from([("test".to_string(), json!({}))]),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");
    assert!(proposal.credential_preview.is_none());

    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");
    let (_, offer) = issuer
        .accept_proposal(AcceptProposalOptions {
            record_id: issuer_record.id,
            ..AcceptProposalOptions::default()
        })
        .await
        .expect("should accept proposal");
    assert!(offer.credential_preview.is_none());

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::RequestSent);
    assert_eq!(holder_provider.sent().len(), 1);
}

#[tokio::test]
async fn content_approved_rejects_changed_preview() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig {
        auto_accept: AutoAcceptPolicy::ContentApproved,
        ..ProtocolConfig::default()
    });
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");

    // the issuer counters with a different claim value
    let (_, offer) = issuer
        .accept_proposal(AcceptProposalOptions {
            record_id: issuer_record.id,
            formats: Some(HashMap::from([(
                "test".to_string(),
                json!({"attributes": [{"name": "age", "value": "21"}]}),
            )])),
            ..AcceptProposalOptions::default()
        })
        .await
        .expect("should accept proposal");

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    // surfaced for the application instead of answered
    assert_eq!(holder_record.state, ExchangeState::OfferReceived);
    assert!(holder_provider.sent().is_empty());
}

#[tokio::test]
async fn content_approved_requires_unanimous_services() {
    test_utils::init_tracer();

    // the holder's service vetoes automatic responses
    let (holder, holder_provider) = party_with(
        vec![Arc::new(TestFormatService::new().auto_respond(false)) as Arc<dyn FormatService>],
        ProtocolConfig {
            auto_accept: AutoAcceptPolicy::ContentApproved,
            ..ProtocolConfig::default()
        },
    );
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");
    let (_, offer) = issuer
        .accept_proposal(AcceptProposalOptions {
            record_id: issuer_record.id,
            ..AcceptProposalOptions::default()
        })
        .await
        .expect("should accept proposal");

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::OfferReceived);
    assert!(holder_provider.sent().is_empty());
}

#[tokio::test]
async fn content_approved_needs_a_counterpart() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig {
        auto_accept: AutoAcceptPolicy::ContentApproved,
        ..ProtocolConfig::default()
    });
    let (issuer, _) = party(ProtocolConfig::default());

    // an offer out of nowhere: there is no proposal to compare against
    let (_, offer) = issuer
        .offer_credential(credence_exchange::OfferCredentialOptions {
            connection_id: "conn-i".into(),
            formats: age_formats(),
            ..credence_exchange::OfferCredentialOptions::default()
        })
        .await
        .expect("should create offer");

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::OfferReceived);
    assert!(holder_provider.sent().is_empty());
}

#[tokio::test]
async fn always_runs_the_whole_exchange() {
    test_utils::init_tracer();

    let always = ProtocolConfig {
        auto_accept: AutoAcceptPolicy::Always,
        ..ProtocolConfig::default()
    };
    let (holder, holder_provider) = party(always);
    let (issuer, issuer_provider) = party(always);

    let (holder_record, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    // the proposal is answered with an offer immediately
    let issuer_record = issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");
    assert_eq!(issuer_record.state, ExchangeState::OfferSent);

    let offer: OfferCredential =
        serde_json::from_value(issuer_provider.sent()[0].0.clone()).expect("offer sent");

    // the offer is answered with a request immediately
    let holder_after_offer = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");
    assert_eq!(holder_after_offer.state, ExchangeState::RequestSent);

    let request: RequestCredential =
        serde_json::from_value(holder_provider.sent()[0].0.clone()).expect("request sent");

    // the request is answered with a credential immediately
    let issuer_after_request = issuer
        .process_request(request, Some("conn-i"))
        .await
        .expect("should process request");
    assert_eq!(issuer_after_request.state, ExchangeState::CredentialIssued);

    let credential: IssueCredential =
        serde_json::from_value(issuer_provider.sent()[1].0.clone()).expect("credential sent");

    // the credential is acknowledged immediately
    let holder_after_credential = holder
        .process_credential(credential, Some("conn-h"))
        .await
        .expect("should process credential");
    assert_eq!(holder_after_credential.state, ExchangeState::Done);

    let ack = serde_json::from_value(holder_provider.sent()[1].0.clone()).expect("ack sent");
    let issuer_done = issuer.process_ack(ack, Some("conn-i")).await.expect("should process ack");
    assert_eq!(issuer_done.state, ExchangeState::Done);

    assert_eq!(holder_record.thread_id, issuer_done.thread_id);
}

#[tokio::test]
async fn negotiation_loops_back_through_the_proposal_state() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, offer) = issuer
        .offer_credential(credence_exchange::OfferCredentialOptions {
            connection_id: "conn-i".into(),
            formats: age_formats(),
            ..credence_exchange::OfferCredentialOptions::default()
        })
        .await
        .expect("should create offer");

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    // the holder counters the offer
    let (holder_record, counter) = holder
        .negotiate_offer(credence_exchange::NegotiateOfferOptions {
            record_id: holder_record.id.clone(),
            formats: HashMap::from([(
                "test".to_string(),
                json!({"attributes": [{"name": "age", "value": "18"}]}),
            )]),
            ..credence_exchange::NegotiateOfferOptions::default()
        })
        .await
        .expect("should negotiate offer");

    assert_eq!(holder_record.state, ExchangeState::ProposalSent);

    // the issuer folds the counter-proposal into the existing exchange
    let issuer_record = issuer
        .process_proposal(counter, Some("conn-i"))
        .await
        .expect("should process counter-proposal");
    assert_eq!(issuer_record.state, ExchangeState::ProposalReceived);
    assert_eq!(issuer_record.thread_id, holder_record.thread_id);
}
