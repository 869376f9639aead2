#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use trustgate_config::load_config_from_str;
use trustgate_sts::token::{SamlAssertion, SamlVersion};
use trustgate_sts::{
    EngineBuilder, InvocationContext, Principal, SecurityTokenService, StsEvent, StsEventListener,
};

pub const SECRET: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Deployment with one trusted signing key. `extra` is appended as TOML.
pub fn config_toml(extra: &str) -> String {
    format!(
        r#"
[[keystore.entries]]
alias = "sts"
secret = "{SECRET}"

{extra}
"#
    )
}

pub fn sts(extra: &str) -> SecurityTokenService {
    builder(extra).build()
}

pub fn builder(extra: &str) -> EngineBuilder {
    let config = load_config_from_str(&config_toml(extra)).expect("test config");
    EngineBuilder::from_config(&config).expect("engine from config")
}

/// An STS that records every published event.
pub fn recorded_sts(extra: &str) -> (SecurityTokenService, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let sts = builder(extra)
        .event_listener(Arc::clone(&listener) as Arc<dyn StsEventListener>)
        .build();
    (sts, listener)
}

pub fn caller(name: &str) -> InvocationContext {
    InvocationContext::new().with_principal(Principal::new(name))
}

/// A bearer SAML 2.0 assertion signed with the STS key.
pub fn signed_assertion(
    sts: &SecurityTokenService,
    issuer: &str,
    subject: &str,
    attributes: &[(&str, &str)],
) -> SamlAssertion {
    let mut builder = SamlAssertion::builder(SamlVersion::V2_0, issuer, subject);
    for (name, value) in attributes {
        builder = builder.attribute(*name, vec![(*value).to_string()]);
    }
    let mut assertion = builder.build();
    assertion
        .sign(sts.config().properties.crypto.as_ref(), "sts")
        .expect("sign assertion");
    assertion
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<StsEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<StsEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StsEventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &StsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
