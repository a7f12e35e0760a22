//! Revocation notifications correlated by derived credential identifiers.

mod utils;

use std::collections::HashMap;

use credence_exchange::message::{Revoke, REVOKE};
use credence_exchange::provider::ExchangeEvent;
use credence_exchange::{
    AcceptOfferOptions, AcceptRequestOptions, CreateOfferOptions, ProtocolConfig,
};
use serde_json::json;
use utils::{age_formats, party};

fn revoke(credential_id: &str) -> Revoke {
    Revoke {
        id: "r-1".into(),
        type_uri: REVOKE.into(),
        thread: None,
        credential_id: credential_id.into(),
        comment: Some("credential no longer valid".into()),
    }
}

#[tokio::test]
async fn notification_lands_on_the_bound_record() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    // run the exchange through issuance so the holder holds a binding
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
    let issuer_record =
        issuer.process_request(request, None).await.expect("should process request");
    let (_, credential) = issuer
        .accept_request(AcceptRequestOptions {
            record_id: issuer_record.id.clone(),
            formats: Some(HashMap::from([(
                "test".to_string(),
                json!({"credential_id": "cred-9"}),
            )])),
            ..AcceptRequestOptions::default()
        })
        .await
        .expect("should accept request");
    let holder_record = holder
        .process_credential(credential, None)
        .await
        .expect("should process credential");

    assert_eq!(holder_record.format_bindings[0].record_id, "cred-9");

    // the notification correlates through the binding, not the thread
    let revoked = holder
        .process_revocation_notification(revoke("test::cred-9"))
        .await
        .expect("should process notification")
        .expect("should correlate");

    assert_eq!(revoked.id, holder_record.id);
    let notification = revoked.revocation_notification.expect("notification recorded");
    assert_eq!(
        notification.comment.as_deref(),
        Some("credential no longer valid")
    );

    assert!(holder_provider
        .events()
        .iter()
        .any(|event| matches!(event, ExchangeEvent::RevocationReceived { .. })));
}

#[tokio::test]
async fn malformed_identifiers_are_swallowed() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());

    // no separator: not a fault, just ignored
    let outcome = holder
        .process_revocation_notification(revoke("not-a-derived-id"))
        .await
        .expect("should not fault");
    assert!(outcome.is_none());

    // well-formed but unknown: also ignored
    let outcome = holder
        .process_revocation_notification(revoke("test::unknown"))
        .await
        .expect("should not fault");
    assert!(outcome.is_none());
}
