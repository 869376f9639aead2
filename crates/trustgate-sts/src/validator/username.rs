use std::collections::HashMap;
use std::sync::Arc;

use trustgate_config::UserSettings;

use super::{TokenValidator, TokenValidatorParameters, TokenValidatorResponse};
use crate::context::Principal;
use crate::error::StsResult;
use crate::token::username::UsernameTokenRealmCodec;
use crate::token::{PresentedToken, TokenState};

#[derive(Debug, Clone)]
struct Credential {
    password: String,
    realm: Option<String>,
}

/// Validates UsernameTokens against a fixed credential table.
#[derive(Default)]
pub struct UsernameTokenValidator {
    users: HashMap<String, Credential>,
    realm_codec: Option<Arc<dyn UsernameTokenRealmCodec>>,
}

impl UsernameTokenValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(
            username.into(),
            Credential {
                password: password.into(),
                realm: None,
            },
        );
        self
    }

    #[must_use]
    pub fn with_realm_user(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        realm: impl Into<String>,
    ) -> Self {
        self.users.insert(
            username.into(),
            Credential {
                password: password.into(),
                realm: Some(realm.into()),
            },
        );
        self
    }

    /// Realm codec consulted for users without a configured realm.
    #[must_use]
    pub fn with_realm_codec(mut self, codec: Arc<dyn UsernameTokenRealmCodec>) -> Self {
        self.realm_codec = Some(codec);
        self
    }

    #[must_use]
    pub fn from_settings(users: &[UserSettings]) -> Self {
        users.iter().fold(Self::new(), |validator, user| match &user.realm {
            Some(realm) => validator.with_realm_user(&user.username, &user.password, realm),
            None => validator.with_user(&user.username, &user.password),
        })
    }
}

impl TokenValidator for UsernameTokenValidator {
    fn name(&self) -> &str {
        "username"
    }

    fn can_handle_token(&self, token: &PresentedToken, _realm: Option<&str>) -> bool {
        matches!(token, PresentedToken::UsernameToken(_))
    }

    fn validate_token(&self, parameters: &TokenValidatorParameters<'_>) -> StsResult<TokenValidatorResponse> {
        let PresentedToken::UsernameToken(token) = parameters.presented() else {
            return Ok(TokenValidatorResponse::invalid("not a UsernameToken"));
        };
        let Some(credential) = self.users.get(&token.username) else {
            return Ok(TokenValidatorResponse::invalid(format!(
                "unknown user {}",
                token.username
            )));
        };
        if !token.verify_password(&credential.password) {
            return Ok(TokenValidatorResponse::invalid(format!(
                "wrong password for {}",
                token.username
            )));
        }

        let realm = credential
            .realm
            .clone()
            .or_else(|| self.realm_codec.as_ref().and_then(|c| c.realm_for(token)));
        Ok(TokenValidatorResponse {
            state: TokenState::Valid,
            principal: Some(Principal::new(&token.username)),
            realm,
            ..TokenValidatorResponse::default()
        })
    }
}
