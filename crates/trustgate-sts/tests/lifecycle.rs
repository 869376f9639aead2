mod common;

use common::{caller, recorded_sts, signed_assertion, sts};
use time::{Duration, OffsetDateTime};
use trustgate_sts::constants::token_types;
use trustgate_sts::context::ProofCredential;
use trustgate_sts::token::SecurityContextToken;
use trustgate_sts::{
    FaultCode, InvocationContext, PresentedToken, RequestSecurityToken, RequestType,
    SecurityTokenService, StsError,
};

/// Issues an SCT and returns it with a context proving its secret.
fn security_context(sts: &SecurityTokenService) -> (SecurityContextToken, InvocationContext) {
    let request = RequestSecurityToken::issue().with_token_type(token_types::SCT);
    let response = sts.handle(&request, &caller("alice")).unwrap();
    let secret = response.proof_secret().unwrap().unwrap();
    let sct = response
        .requested_security_token
        .as_ref()
        .and_then(|t| t.as_sct())
        .cloned()
        .unwrap();
    let context = caller("alice").with_proof_credential(ProofCredential::SymmetricKey(secret));
    (sct, context)
}

fn expire(sts: &SecurityTokenService, id: &str) {
    let store = &sts.config().store;
    let mut cached = store.get(id).unwrap();
    cached.expires = Some(OffsetDateTime::now_utc() - Duration::minutes(1));
    store.update(cached).unwrap();
}

#[test]
fn validate_known_security_context() {
    let sts = sts("");
    let (sct, context) = security_context(&sts);

    let request = RequestSecurityToken::validate(PresentedToken::SecurityContext(sct));
    let response = sts.handle(&request, &context).unwrap();

    assert!(response.is_valid());
    assert_eq!(response.token_type.as_deref(), Some(token_types::STATUS));
    assert!(response.requested_security_token.is_none());
}

#[test]
fn validate_unknown_security_context_is_invalid_not_error() {
    let sts = sts("");
    let sct = SecurityContextToken::with_identifier("urn:uuid:unknown");

    let request = RequestSecurityToken::validate(PresentedToken::SecurityContext(sct));
    let response = sts.handle(&request, &caller("alice")).unwrap();

    assert!(!response.is_valid());
    assert!(response.status.unwrap().reason.is_some());
}

#[test]
fn validate_tampered_assertion_is_invalid() {
    let sts = sts("");
    let mut assertion = signed_assertion(&sts, "trustgate", "alice", &[]);
    assertion.subject.name_id = "mallory".to_string();

    let request = RequestSecurityToken::validate(PresentedToken::Saml(assertion));
    let response = sts.handle(&request, &caller("alice")).unwrap();

    assert!(!response.is_valid());
}

#[test]
fn validate_can_exchange_for_another_token_type() {
    let sts = sts("");
    let assertion = signed_assertion(&sts, "trustgate", "alice", &[]);

    let request = RequestSecurityToken::validate(PresentedToken::Saml(assertion))
        .with_token_type(token_types::JWT);
    let response = sts.handle(&request, &caller("frontend")).unwrap();

    assert!(response.is_valid());
    assert_eq!(response.token_type.as_deref(), Some(token_types::JWT));
    let jwt = response
        .requested_security_token
        .as_ref()
        .and_then(|t| t.as_jwt())
        .expect("issued JWT");

    let back = RequestSecurityToken::validate(PresentedToken::Jwt(jwt.to_string()));
    assert!(sts.handle(&back, &caller("frontend")).unwrap().is_valid());
}

#[test]
fn exchange_of_invalid_token_issues_nothing() {
    let sts = sts("");
    let unsigned = trustgate_sts::token::SamlAssertion::builder(
        trustgate_sts::token::SamlVersion::V2_0,
        "trustgate",
        "alice",
    )
    .build();

    let request = RequestSecurityToken::validate(PresentedToken::Saml(unsigned))
        .with_token_type(token_types::JWT);
    let response = sts.handle(&request, &caller("frontend")).unwrap();

    assert!(!response.is_valid());
    assert!(response.requested_security_token.is_none());
}

#[test]
fn renew_live_security_context() {
    let sts = sts("");
    let (sct, context) = security_context(&sts);
    let before = sts.config().store.get(&sct.identifier).unwrap().expires.unwrap();

    std::thread::sleep(std::time::Duration::from_millis(10));
    let request = RequestSecurityToken::renew(PresentedToken::SecurityContext(sct.clone()));
    let response = sts.handle(&request, &context).unwrap();

    let renewed = response
        .requested_security_token
        .as_ref()
        .and_then(|t| t.as_sct())
        .unwrap();
    assert_eq!(renewed.identifier, sct.identifier);
    let lifetime = response.lifetime.unwrap();
    assert!(lifetime.expires > before);
    let cached = sts.config().store.get(&sct.identifier).unwrap();
    assert_eq!(cached.expires, Some(lifetime.expires));
}

#[test]
fn renew_expired_token_is_refused_by_default() {
    let sts = sts("");
    let (sct, context) = security_context(&sts);
    expire(&sts, &sct.identifier);

    let request = RequestSecurityToken::renew(PresentedToken::SecurityContext(sct));
    let err = sts.handle(&request, &context).unwrap_err();

    assert!(matches!(err, StsError::RenewalNotAllowed { .. }));
    assert_eq!(err.fault_code(), FaultCode::RequestFailed);
}

#[test]
fn renew_expired_token_when_allowed() {
    let sts = sts(
        r#"
[renewal]
allow_renewal_after_expiry = true
"#,
    );
    let (sct, context) = security_context(&sts);
    expire(&sts, &sct.identifier);

    let request = RequestSecurityToken::renew(PresentedToken::SecurityContext(sct));
    let response = sts.handle(&request, &context).unwrap();

    assert!(response.lifetime.unwrap().expires > OffsetDateTime::now_utc());
}

#[test]
fn renew_requires_proof_of_possession() {
    let sts = sts("");
    let (sct, _) = security_context(&sts);

    let request = RequestSecurityToken::renew(PresentedToken::SecurityContext(sct));
    let err = sts.handle(&request, &caller("alice")).unwrap_err();

    assert_eq!(err.fault_code(), FaultCode::RequestFailed);
}

#[test]
fn cancel_twice_fails() {
    let (sts, events) = recorded_sts("");
    let (sct, context) = security_context(&sts);
    let request = RequestSecurityToken::cancel(PresentedToken::SecurityContext(sct.clone()));

    let response = sts.handle(&request, &context).unwrap();
    assert!(response.requested_token_cancelled);
    assert!(sts.config().store.get(&sct.identifier).is_none());

    let err = sts.handle(&request, &context).unwrap_err();
    assert_eq!(err.fault_code(), FaultCode::RequestFailed);
    assert!(sts.config().store.get(&sct.identifier).is_none());

    let cancels: Vec<_> = events
        .events()
        .into_iter()
        .filter(|e| e.operation == RequestType::Cancel)
        .collect();
    assert_eq!(cancels.len(), 2);
    assert!(cancels[0].is_success());
    assert!(!cancels[1].is_success());
}

#[test]
fn cancelled_context_no_longer_validates() {
    let sts = sts("");
    let (sct, context) = security_context(&sts);
    sts.handle(
        &RequestSecurityToken::cancel(PresentedToken::SecurityContext(sct.clone())),
        &context,
    )
    .unwrap();

    let response = sts
        .handle(
            &RequestSecurityToken::validate(PresentedToken::SecurityContext(sct)),
            &context,
        )
        .unwrap();

    assert!(!response.is_valid());
}

#[test]
fn missing_target_is_invalid_request() {
    let sts = sts("");
    let request = RequestSecurityToken {
        request_type: Some(RequestType::Cancel.uri().to_string()),
        ..RequestSecurityToken::default()
    };

    let err = sts.handle(&request, &caller("alice")).unwrap_err();

    assert_eq!(err.fault_code(), FaultCode::InvalidRequest);
}
