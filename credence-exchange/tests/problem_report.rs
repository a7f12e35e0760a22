//! Abandonment: sending problem reports and handling inbound ones.

mod utils;

use credence_exchange::message::PROBLEM_REPORT;
use credence_exchange::{
    DeclineOfferOptions, ExchangeState, OfferCredentialOptions, ProposeCredentialOptions,
    ProtocolConfig, SendProblemReportOptions,
};
use utils::{age_formats, party};

#[tokio::test]
async fn report_abandons_the_exchange_on_receipt() {
    test_utils::init_tracer();

    let (holder, _) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    let (holder_record, proposal) = holder
        .propose_credential(ProposeCredentialOptions {
            connection_id: "conn-h".into(),
            formats: age_formats(),
            ..ProposeCredentialOptions::default()
        })
        .await
        .expect("should create proposal");

    issuer
        .process_proposal(proposal, Some("conn-i"))
        .await
        .expect("should process proposal");

    // the holder walks away
    let (holder_record, report) = holder
        .send_problem_report(SendProblemReportOptions {
            record_id: holder_record.id.clone(),
            description: "no longer needed".into(),
        })
        .await
        .expect("report should be sent");

    // sending does not move the sender's state
    assert_eq!(holder_record.state, ExchangeState::ProposalSent);
    assert_eq!(report.type_uri, PROBLEM_REPORT);

    // receiving always abandons, whatever the current state
    let issuer_record = issuer
        .process_problem_report(report.clone())
        .await
        .expect("should process report");

    assert_eq!(issuer_record.state, ExchangeState::Abandoned);
    assert_eq!(
        issuer_record.error_message.as_deref(),
        Some("issuance-abandoned: no longer needed")
    );

    // abandonment is idempotent
    let again = issuer
        .process_problem_report(report)
        .await
        .expect("second report should not fault");
    assert_eq!(again.state, ExchangeState::Abandoned);
}

#[tokio::test]
async fn decline_can_carry_a_report() {
    test_utils::init_tracer();

    let (holder, holder_provider) = party(ProtocolConfig::default());
    let (issuer, _) = party(ProtocolConfig::default());

    let (_, offer) = issuer
        .offer_credential(OfferCredentialOptions {
            connection_id: "conn-i".into(),
            formats: age_formats(),
            ..OfferCredentialOptions::default()
        })
        .await
        .expect("should create offer");

    let holder_record = holder
        .process_offer(offer, Some("conn-h"))
        .await
        .expect("should process offer");

    let (holder_record, report) = holder
        .decline_offer(DeclineOfferOptions {
            record_id: holder_record.id.clone(),
            send_problem_report: true,
            problem_report_description: Some("wrong credential".into()),
        })
        .await
        .expect("should decline offer");

    assert_eq!(holder_record.state, ExchangeState::Declined);
    let report = report.expect("report built");
    assert_eq!(report.description.en, "wrong credential");

    let sent = holder_provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0["@type"], PROBLEM_REPORT);
}
