//! Cold-start delivery orderings: offers and requests arriving with no prior
//! record, connection-less exchanges, and the strict-ordering switch.

mod utils;

use credence_exchange::{
    AcceptOfferOptions, CreateOfferOptions, Error, ExchangeState, NegotiateOfferOptions,
    ProtocolConfig, Role,
};
use utils::{age_formats, party};

#[tokio::test]
async fn connection_less_offer_bootstraps_an_exchange() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    // an offer for out-of-band delivery, linked to a parent exchange
    let (issuer_record, offer) = issuer
        .create_offer(CreateOfferOptions {
            formats: age_formats(),
            parent_thread_id: Some("oob-1".into()),
            ..CreateOfferOptions::default()
        })
        .await
        .expect("should create offer");

    assert_eq!(issuer_record.state, ExchangeState::OfferSent);
    assert!(issuer_record.connection_id.is_none());
    assert_eq!(issuer_record.parent_thread_id.as_deref(), Some("oob-1"));
    assert_eq!(offer.parent_thread_id(), Some("oob-1"));

    // no prior record, no connection: correlation is the thread id alone
    let holder_record = holder.process_offer(offer, None).await.expect("should process offer");

    assert_eq!(holder_record.state, ExchangeState::OfferReceived);
    assert_eq!(holder_record.role, Role::Holder);
    assert!(holder_record.connection_id.is_none());
    assert_eq!(holder_record.thread_id, issuer_record.thread_id);

    // the offer can still be accepted without a connection
    let (holder_record, _request) = holder
        .accept_offer(AcceptOfferOptions {
            record_id: holder_record.id.clone(),
            ..AcceptOfferOptions::default()
        })
        .await
        .expect("should accept offer");
    assert_eq!(holder_record.state, ExchangeState::RequestSent);
}

#[tokio::test]
async fn negotiation_requires_a_connection() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, offer) = issuer
        .create_offer(CreateOfferOptions {
            formats: age_formats(),
            ..CreateOfferOptions::default()
        })
        .await
        .expect("should create offer");

    let holder_record = holder.process_offer(offer, None).await.expect("should process offer");

    let err = holder
        .negotiate_offer(NegotiateOfferOptions {
            record_id: holder_record.id.clone(),
            formats: age_formats(),
            ..NegotiateOfferOptions::default()
        })
        .await
        .expect_err("should fault");

    assert!(matches!(err, Error::NoConnection(_)));
}

#[tokio::test]
async fn unsolicited_request_bootstraps_by_default() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    // the holder answers an offer the issuer has no record of (e.g. it was
    // handed over out-of-band by another agent of the same issuer)
    let (_, offer) = issuer
        .create_offer(CreateOfferOptions {
            formats: age_formats(),
            ..CreateOfferOptions::default()
        })
        .await
        .expect("should create offer");
    let holder_record = holder.process_offer(offer, None).await.expect("should process offer");
    let (_, request) = holder
        .accept_offer(AcceptOfferOptions {
            record_id: holder_record.id.clone(),
            ..AcceptOfferOptions::default()
        })
        .await
        .expect("should accept offer");

    let (blank_issuer, _) = party(ProtocolConfig::default());
    let record = blank_issuer
        .process_request(request, Some("conn-i"))
        .await
        .expect("should process request");

    assert_eq!(record.state, ExchangeState::RequestReceived);
    assert_eq!(record.role, Role::Issuer);
    assert_eq!(record.thread_id, holder_record.thread_id);
}

#[tokio::test]
async fn strict_ordering_rejects_unsolicited_requests() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, offer) = issuer
        .create_offer(CreateOfferOptions {
            formats: age_formats(),
            ..CreateOfferOptions::default()
        })
        .await
        .expect("should create offer");
    let holder_record = holder.process_offer(offer, None).await.expect("should process offer");
    let (_, request) = holder
        .accept_offer(AcceptOfferOptions {
            record_id: holder_record.id.clone(),
            ..AcceptOfferOptions::default()
        })
        .await
        .expect("should accept offer");

    let (strict_issuer, _) = party(ProtocolConfig {
        reject_unsolicited_requests: true,
        ..ProtocolConfig::default()
    });

    let err = strict_issuer
        .process_request(request, Some("conn-i"))
        .await
        .expect_err("should fault");

    assert!(matches!(err, Error::UnexpectedMessage(_)));
}
