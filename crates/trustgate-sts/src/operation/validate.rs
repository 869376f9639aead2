use std::sync::Arc;

use tracing::{debug, instrument};

use super::common::{self, OperationTrace, Subject};
use crate::claims::ClaimsManager;
use crate::constants::token_types;
use crate::context::InvocationContext;
use crate::engine::EngineConfig;
use crate::error::{StsError, StsResult};
use crate::provider::TokenProviderParameters;
use crate::request::{RequestRequirements, RequestSecurityToken, RequestType};
use crate::response::{RequestSecurityTokenResponse, Status, StatusCode};

/// Validates presented tokens, optionally exchanging a valid one for a token
/// of another type.
#[derive(Debug, Clone)]
pub struct ValidateOperation {
    config: Arc<EngineConfig>,
}

impl ValidateOperation {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// A bad token is reported through the response status, never as an
    /// error.
    #[instrument(skip_all, fields(operation = "validate"))]
    pub fn validate(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let mut trace = OperationTrace::start(RequestType::Validate);
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
        } = common::parse_request(config, request, RequestType::Validate)?;
        let realm = common::parse_realm(config, context)?;
        trace.realm = realm.clone();
        trace.applies_to = requirements.applies_to.clone();

        let mut target = requirements
            .validate_target
            .take()
            .ok_or_else(|| StsError::invalid_request("Validate request has no ValidateTarget"))?;
        let validation = common::validate_received(config, context, &mut target, realm.as_deref())?;
        trace.principal = target.principal().map(|p| p.name().to_string());

        let status = if validation.is_valid() {
            Status::new(StatusCode::Valid, None)
        } else {
            Status::new(StatusCode::Invalid, validation.reason.clone())
        };
        let mut response = RequestSecurityTokenResponse::new(requirements.context.clone());

        let transform_to = requirements
            .token_type
            .clone()
            .filter(|t| t != token_types::STATUS && !target.token().is_of_type(t));
        let Some(token_type) = transform_to else {
            trace.token_type = Some(token_types::STATUS.to_string());
            response.token_type = Some(token_types::STATUS.to_string());
            response.status = Some(status);
            return Ok(response);
        };
        trace.token_type = Some(token_type.clone());

        if !validation.is_valid() {
            debug!(token_type = %token_type, state = ?validation.state, "Invalid token, nothing issued");
            response.token_type = Some(token_type);
            response.status = Some(status);
            return Ok(response);
        }

        let applies_to = requirements.applies_to.clone();
        let service = common::find_service(config, applies_to.as_deref())?;
        let key_type = common::resolve_key_type(key.key_type, service)?;
        let subject = Subject::from_token(&target);
        let requested_claims = ClaimsManager::merge(
            requirements.primary_claims.as_ref(),
            requirements.secondary_claims.as_ref(),
        );
        let identity = common::resolve_identity(
            config,
            &subject,
            realm.as_deref(),
            requested_claims.as_ref(),
            applies_to.as_deref(),
            &token_type,
        )?;
        requirements.validate_target = Some(target);

        let provider = common::select_provider(config, &token_type, realm.as_deref())?;
        let encryption = common::encryption_for(config, service, realm.as_deref());
        let parameters = TokenProviderParameters {
            properties: &config.properties,
            store: config.store.as_ref(),
            context,
            token_requirements: &requirements,
            key_requirements: &key,
            token_type: token_type.clone(),
            key_type,
            principal: identity.principal,
            roles: subject.roles,
            realm,
            applies_to: applies_to.clone(),
            claims: identity.claims,
            encryption: encryption.clone(),
        };
        let provided = provider.create_token(&parameters)?;
        debug!(
            provider = provider.name(),
            token_id = %provided.token_id,
            token_type = %token_type,
            "Validated token transformed"
        );

        let token = common::encrypt_token(config, provided.token.clone(), service, &encryption, &key)?;
        let mut response = common::issued_response(
            config,
            requirements.context.clone(),
            &token_type,
            applies_to.as_deref(),
            token,
            &provided,
        );
        response.status = Some(status);
        Ok(response)
    }
}
