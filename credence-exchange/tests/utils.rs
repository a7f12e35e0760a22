#![allow(dead_code)]

//! Shared set-up for the exchange engine tests.

use std::collections::HashMap;
use std::sync::Arc;

use credence_exchange::{FormatService, Protocol, ProtocolConfig};
use serde_json::{json, Value};
use test_utils::{Provider, TestFormatService};

/// A protocol instance over a fresh in-memory provider with the default test
/// format service.
pub fn party(config: ProtocolConfig) -> (Protocol<Provider>, Provider) {
    party_with(
        vec![Arc::new(TestFormatService::new()) as Arc<dyn FormatService>],
        config,
    )
}

/// A protocol instance over a fresh in-memory provider with the given format
/// services.
pub fn party_with(
    services: Vec<Arc<dyn FormatService>>, config: ProtocolConfig,
) -> (Protocol<Provider>, Provider) {
    let provider = Provider::new();
    let protocol = Protocol::new(provider.clone(), services, config);
    (protocol, provider)
}

/// Proposal inputs previewing a single `age` claim.
pub fn age_formats() -> HashMap<String, Value> {
    HashMap::from([(
        "test".to_string(),
        json!({"attributes": [{"name": "age", "value": "99"}]}),
    )])
}
