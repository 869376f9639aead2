//! Protocol identifiers.

pub const WST_NS: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512";

pub mod request_types {
    pub const ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Issue";
    pub const VALIDATE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Validate";
    pub const RENEW: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Renew";
    pub const CANCEL: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Cancel";
    pub const BATCH_ISSUE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/BatchIssue";
}

pub mod token_types {
    pub const SAML_1_1: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV1.1";
    pub const SAML_2_0: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLV2.0";
    pub const SAML_1_NS: &str = "urn:oasis:names:tc:SAML:1.0:assertion";
    pub const SAML_2_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
    pub const JWT: &str = "urn:ietf:params:oauth:token-type:jwt";
    pub const SCT: &str = "http://docs.oasis-open.org/ws-sx/ws-secureconversation/200512/sct";
    pub const SCT_2005_02: &str = "http://schemas.xmlsoap.org/ws/2005/02/sc/sct";
    pub const USERNAME_TOKEN: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#UsernameToken";
    pub const X509_V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    /// Requested by a Validate that only wants a status.
    pub const STATUS: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/RSTR/Status";

    #[must_use]
    pub fn is_saml1(token_type: &str) -> bool {
        token_type == SAML_1_1 || token_type == SAML_1_NS
    }

    #[must_use]
    pub fn is_saml2(token_type: &str) -> bool {
        token_type == SAML_2_0 || token_type == SAML_2_NS
    }

    #[must_use]
    pub fn is_saml(token_type: &str) -> bool {
        is_saml1(token_type) || is_saml2(token_type)
    }

    #[must_use]
    pub fn is_sct(token_type: &str) -> bool {
        token_type == SCT || token_type == SCT_2005_02
    }

    /// Expands the short names accepted in configuration files.
    #[must_use]
    pub fn resolve_alias(value: &str) -> &str {
        match value {
            "saml1.1" | "saml1" => SAML_1_1,
            "saml2.0" | "saml2" => SAML_2_0,
            "jwt" => JWT,
            "sct" => SCT,
            other => other,
        }
    }
}

pub mod key_types {
    pub const BEARER: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Bearer";
    pub const PUBLIC_KEY: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/PublicKey";
    pub const SYMMETRIC_KEY: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/SymmetricKey";
    /// WS-Trust 1.4 bearer identifier.
    pub const BEARER_200802: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200802/Bearer";
}

pub mod confirmation {
    pub const SAML1_BEARER: &str = "urn:oasis:names:tc:SAML:1.0:cm:bearer";
    pub const SAML1_HOLDER_OF_KEY: &str = "urn:oasis:names:tc:SAML:1.0:cm:holder-of-key";
    pub const SAML1_SENDER_VOUCHES: &str = "urn:oasis:names:tc:SAML:1.0:cm:sender-vouches";
    pub const SAML2_BEARER: &str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";
    pub const SAML2_HOLDER_OF_KEY: &str = "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key";
    pub const SAML2_SENDER_VOUCHES: &str = "urn:oasis:names:tc:SAML:2.0:cm:sender-vouches";
}

pub mod binary_secrets {
    pub const NONCE: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/Nonce";
    pub const SYMMETRIC_KEY: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/SymmetricKey";
    pub const COMPUTED_KEY_PSHA1: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/CK/PSHA1";
}

pub mod algorithms {
    pub const AES128_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes128-gcm";
    pub const AES256_GCM: &str = "http://www.w3.org/2009/xmlenc11#aes256-gcm";
    pub const RSA_OAEP_MGF1P: &str = "http://www.w3.org/2001/04/xmlenc#rsa-oaep-mgf1p";
    pub const KW_AES256: &str = "http://www.w3.org/2001/04/xmlenc#kw-aes256";
    pub const HMAC_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#hmac-sha256";
}

pub mod references {
    pub const SAML1_KEY_IDENTIFIER: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLAssertionID";
    pub const SAML2_KEY_IDENTIFIER: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.1#SAMLID";
    pub const TOKEN_TYPE_ATTRIBUTE: &str =
        "http://docs.oasis-open.org/wss/oasis-wss-wssecurity-secext-1.1.xsd#TokenType";
}

pub mod status {
    pub const VALID: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/valid";
    pub const INVALID: &str = "http://docs.oasis-open.org/ws-sx/ws-trust/200512/status/invalid";
}

pub mod claims {
    pub const IDENTITY_DIALECT: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity";
    pub const GIVEN_NAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/givenname";
    pub const SURNAME: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/surname";
    pub const EMAIL: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress";
    pub const ROLE: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/role";
}

#[cfg(test)]
mod tests {
    use super::token_types::*;

    #[test]
    fn test_token_type_predicates() {
        assert!(is_saml1(SAML_1_1));
        assert!(is_saml1(SAML_1_NS));
        assert!(is_saml2(SAML_2_0));
        assert!(!is_saml(JWT));
        assert!(is_sct(SCT_2005_02));
    }

    #[test]
    fn test_alias_resolution() {
        assert_eq!(resolve_alias("saml2.0"), SAML_2_0);
        assert_eq!(resolve_alias("jwt"), JWT);
        assert_eq!(resolve_alias("urn:custom"), "urn:custom");
    }
}
