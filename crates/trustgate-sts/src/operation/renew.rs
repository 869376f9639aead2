use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::common::{self, OperationTrace};
use crate::context::InvocationContext;
use crate::engine::EngineConfig;
use crate::error::{StsError, StsResult};
use crate::renewer::{TokenRenewer, TokenRenewerParameters};
use crate::request::{RequestRequirements, RequestSecurityToken, RequestType};
use crate::response::RequestSecurityTokenResponse;
use crate::token::TokenState;

/// Renews tokens the STS issued earlier.
#[derive(Debug, Clone)]
pub struct RenewOperation {
    config: Arc<EngineConfig>,
}

impl RenewOperation {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(operation = "renew"))]
    pub fn renew(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let mut trace = OperationTrace::start(RequestType::Renew);
        let result = self.process(request, context, &mut trace);
        trace.finish(&self.config, &result);
        result
    }

    fn process(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
        trace: &mut OperationTrace,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let config = self.config.as_ref();
        let RequestRequirements {
            token: mut requirements,
            key,
        } = common::parse_request(config, request, RequestType::Renew)?;
        let realm = common::parse_realm(config, context)?;
        trace.realm = realm.clone();
        trace.applies_to = requirements.applies_to.clone();

        let mut target = requirements
            .renew_target
            .take()
            .ok_or_else(|| StsError::invalid_request("Renew request has no RenewTarget"))?;
        let token_type = target.token().token_type();
        trace.token_type = Some(token_type.to_string());

        let validation = common::validate_received(config, context, &mut target, realm.as_deref())?;
        trace.principal = target.principal().map(|p| p.name().to_string());

        let renewer: &dyn TokenRenewer = config
            .renewers
            .find(|r| r.can_handle_token(&target, realm.as_deref()))
            .ok_or_else(|| {
                warn!(kind = ?target.kind(), "No renewer for presented token");
                StsError::request_failed(format!("no renewer for a {:?} token", target.kind()))
            })?
            .as_ref();

        match validation.state {
            TokenState::Valid => {}
            TokenState::Expired if renewer.allow_renewal_after_expiry() => {
                debug!(renewer = renewer.name(), "Renewing an expired token");
            }
            TokenState::Expired => {
                return Err(StsError::renewal_not_allowed(
                    "the token has expired and the renewer does not renew expired tokens",
                ));
            }
            state => {
                return Err(StsError::request_failed(format!(
                    "the renew target is not valid ({state:?}){}",
                    validation
                        .reason
                        .as_deref()
                        .map(|r| format!(": {r}"))
                        .unwrap_or_default()
                )));
            }
        }

        let renewed = renewer.renew_token(&TokenRenewerParameters {
            properties: &config.properties,
            store: config.store.as_ref(),
            context,
            token_requirements: &requirements,
            key_requirements: &key,
            token: &target,
            realm: realm.as_deref(),
        })?;
        debug!(
            renewer = renewer.name(),
            token_id = %renewed.token_id,
            expires = %renewed.lifetime.expires,
            "Token renewed"
        );

        let mut response = RequestSecurityTokenResponse::new(requirements.context.clone());
        common::attach_token(
            config,
            &mut response,
            token_type,
            renewed.token.clone(),
            &renewed.token_id,
            renewed.attached_id(),
        );
        if config.properties.include_lifetime {
            response.lifetime = Some(renewed.lifetime);
        }
        Ok(response)
    }
}
