use std::sync::Arc;

use tracing::{debug, instrument};

use super::common::{self, OperationTrace, Subject};
use crate::claims::ClaimsManager;
use crate::context::InvocationContext;
use crate::engine::EngineConfig;
use crate::error::{StsError, StsResult};
use crate::provider::TokenProviderParameters;
use crate::request::{RequestRequirements, RequestSecurityToken, RequestType};
use crate::response::RequestSecurityTokenResponse;

/// Issues new tokens.
#[derive(Debug, Clone)]
pub struct IssueOperation {
    config: Arc<EngineConfig>,
}

impl IssueOperation {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    #[instrument(skip_all, fields(operation = "issue"))]
    pub fn issue(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let mut trace = OperationTrace::start(RequestType::Issue);
        let result = self.process(request, context, &mut trace);
        trace.finish(&self.config, &result);
        result
    }

    /// Issues every request on its own. A failed request does not affect
    /// its siblings; results keep the request order.
    pub fn issue_batch(
        &self,
        requests: &[RequestSecurityToken],
        context: &InvocationContext,
    ) -> Vec<StsResult<RequestSecurityTokenResponse>> {
        debug!(requests = requests.len(), "Batch issue");
        requests.iter().map(|r| self.issue(r, context)).collect()
    }

    fn process(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
        trace: &mut OperationTrace,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let config = self.config.as_ref();
        if request.on_behalf_of.is_some() && request.act_as.is_some() {
            return Err(StsError::invalid_request(
                "OnBehalfOf and ActAs cannot both be present",
            ));
        }
        let RequestRequirements {
            token: mut requirements,
            key,
        } = common::parse_request(config, request, RequestType::Issue)?;
        let applies_to = requirements.applies_to.clone();
        trace.applies_to = applies_to.clone();

        let service = common::find_service(config, applies_to.as_deref())?;
        let realm = common::parse_realm(config, context)?;
        trace.realm = realm.clone();

        let token_type = common::resolve_token_type(
            config,
            requirements.token_type.as_deref(),
            service,
            realm.as_deref(),
        )?;
        trace.token_type = Some(token_type.clone());
        let key_type = common::resolve_key_type(key.key_type, service)?;

        let delegated = match requirements.on_behalf_of.as_mut() {
            Some(token) => Some(token),
            None => requirements.act_as.as_mut(),
        };
        let subject = match delegated {
            Some(token) => {
                common::authorize_delegation(
                    config,
                    context,
                    token,
                    key_type,
                    applies_to.as_deref(),
                    realm.as_deref(),
                )?;
                Subject::from_token(token)
            }
            None => Subject::from_context(config, context),
        };
        trace.principal = subject.principal_name();

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
        if let Some(delegated) = requirements.delegated_token() {
            common::check_audience(delegated, applies_to.as_deref())?;
        }

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
            "Token issued"
        );

        let token = common::encrypt_token(config, provided.token.clone(), service, &encryption, &key)?;
        Ok(common::issued_response(
            config,
            requirements.context.clone(),
            &token_type,
            applies_to.as_deref(),
            token,
            &provided,
        ))
    }
}
