mod common;

use common::{caller, signed_assertion, sts};
use trustgate_sts::claims::Claim;
use trustgate_sts::constants::{claims, token_types};
use trustgate_sts::token::SamlAssertion;
use trustgate_sts::{
    FaultCode, InvocationContext, PresentedToken, RequestSecurityToken, RequestSecurityTokenResponse,
    SecurityTokenService,
};

const REALMS: &str = r#"
[realms.a]
issuer = "issuer-a"

[realms.b]
issuer = "issuer-b"

[realms.c]
issuer = "issuer-c"

[realm_parser.segments]
a = "a"
b = "b"
c = "c"
"#;

fn in_realm(realm: &str) -> InvocationContext {
    caller("frontend").with_request_url(format!("https://sts.example.com/{realm}/sts"))
}

fn exchange(sts: &SecurityTokenService, realm: &str) -> Result<RequestSecurityTokenResponse, trustgate_sts::StsError> {
    let token = signed_assertion(sts, "issuer-a", "alice", &[(claims::EMAIL, "alice@a.org")]);
    let request = RequestSecurityToken::issue()
        .with_token_type(token_types::SAML_2_0)
        .with_on_behalf_of(PresentedToken::Saml(token))
        .with_claim(Claim::required(claims::EMAIL));
    sts.handle(&request, &in_realm(realm))
}

fn issued(response: &RequestSecurityTokenResponse) -> &SamlAssertion {
    response
        .requested_security_token
        .as_ref()
        .and_then(|t| t.as_saml())
        .expect("issued assertion")
}

#[test]
fn federate_claims_maps_claim_values_and_keeps_subject() {
    let sts = sts(&format!(
        r#"{REALMS}
[[relationships]]
source_realm = "a"
target_realm = "b"
type = "FederateClaims"
claims_mapper = {{ kind = "uppercase" }}
"#
    ));

    let response = exchange(&sts, "b").unwrap();

    let assertion = issued(&response);
    assert_eq!(assertion.subject.name_id, "alice");
    assert_eq!(assertion.issuer, "issuer-b");
    assert_eq!(assertion.attribute_values(claims::EMAIL), vec!["ALICE@A.ORG"]);
}

#[test]
fn federate_identity_maps_subject_and_keeps_claim_values() {
    let sts = sts(&format!(
        r#"{REALMS}
[[relationships]]
source_realm = "a"
target_realm = "b"
type = "FederateIdentity"
identity_mapper = {{ kind = "uppercase" }}

[[claims.static]]
principal = "ALICE"
claim_type = "{}"
values = ["alice@b.org"]
"#,
        claims::EMAIL
    ));

    let response = exchange(&sts, "b").unwrap();

    let assertion = issued(&response);
    assert_eq!(assertion.subject.name_id, "ALICE");
    assert_eq!(assertion.attribute_values(claims::EMAIL), vec!["alice@b.org"]);
}

#[test]
fn same_realm_needs_no_relationship() {
    let sts = sts(REALMS);
    let token = signed_assertion(&sts, "issuer-a", "alice", &[]);
    let request = RequestSecurityToken::issue()
        .with_token_type(token_types::SAML_2_0)
        .with_on_behalf_of(PresentedToken::Saml(token));

    let response = sts.handle(&request, &in_realm("a")).unwrap();

    let assertion = issued(&response);
    assert_eq!(assertion.subject.name_id, "alice");
    assert_eq!(assertion.issuer, "issuer-a");
}

#[test]
fn unrelated_realms_fail() {
    let sts = sts(&format!(
        r#"{REALMS}
[[relationships]]
source_realm = "a"
target_realm = "b"
type = "FederateIdentity"
identity_mapper = {{ kind = "uppercase" }}
"#
    ));

    let err = exchange(&sts, "c").unwrap_err();

    assert_eq!(err.fault_code(), FaultCode::RequestFailed);
}

const JWT_DELEGATION: &str = r#"
[delegation]
handlers = ["saml", "jwt"]
"#;

fn realm_jwt(sts: &SecurityTokenService, realm: &str) -> String {
    let request = RequestSecurityToken::issue().with_token_type(token_types::JWT);
    let context = caller("alice").with_request_url(format!("https://sts.example.com/{realm}/sts"));
    let response = sts.handle(&request, &context).unwrap();
    response
        .requested_security_token
        .as_ref()
        .and_then(|t| t.as_jwt())
        .expect("issued JWT")
        .to_string()
}

fn jwt_exchange(
    sts: &SecurityTokenService,
    jwt: String,
    realm: &str,
) -> Result<RequestSecurityTokenResponse, trustgate_sts::StsError> {
    let request = RequestSecurityToken::issue()
        .with_token_type(token_types::SAML_2_0)
        .with_on_behalf_of(PresentedToken::Jwt(jwt));
    sts.handle(&request, &in_realm(realm))
}

#[test]
fn realm_jwt_cannot_cross_unrelated_realms() {
    let sts = sts(&format!(
        r#"{REALMS}
{JWT_DELEGATION}
[[relationships]]
source_realm = "a"
target_realm = "b"
type = "FederateIdentity"
identity_mapper = {{ kind = "uppercase" }}
"#
    ));
    let jwt = realm_jwt(&sts, "a");

    let err = jwt_exchange(&sts, jwt, "c").unwrap_err();

    assert_eq!(err.fault_code(), FaultCode::RequestFailed);
}

#[test]
fn realm_jwt_federates_identity_into_related_realm() {
    let sts = sts(&format!(
        r#"{REALMS}
{JWT_DELEGATION}
[[relationships]]
source_realm = "a"
target_realm = "b"
type = "FederateIdentity"
identity_mapper = {{ kind = "uppercase" }}
"#
    ));
    let jwt = realm_jwt(&sts, "a");

    let response = jwt_exchange(&sts, jwt, "b").unwrap();

    let assertion = issued(&response);
    assert_eq!(assertion.subject.name_id, "ALICE");
    assert_eq!(assertion.issuer, "issuer-b");
}
