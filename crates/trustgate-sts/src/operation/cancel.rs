use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::common::{self, OperationTrace};
use crate::canceller::TokenCancellerParameters;
use crate::context::InvocationContext;
use crate::engine::EngineConfig;
use crate::error::{StsError, StsResult};
use crate::request::{RequestSecurityToken, RequestType};
use crate::response::RequestSecurityTokenResponse;

/// Cancels cache-backed tokens.
#[derive(Debug, Clone)]
pub struct CancelOperation {
    config: Arc<EngineConfig>,
}

impl CancelOperation {
    #[must_use]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Cancelling is not idempotent: a token already cancelled is no longer
    /// in the store and the second call fails.
    #[instrument(skip_all, fields(operation = "cancel"))]
    pub fn cancel(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
    ) -> StsResult<RequestSecurityTokenResponse> {
        let mut trace = OperationTrace::start(RequestType::Cancel);
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
        let requirements = common::parse_request(config, request, RequestType::Cancel)?.token;
        trace.realm = common::parse_realm(config, context)?;

        let target = requirements
            .cancel_target
            .as_ref()
            .ok_or_else(|| StsError::invalid_request("Cancel request has no CancelTarget"))?;
        trace.token_type = Some(target.token().token_type().to_string());

        let canceller = config
            .cancellers
            .find(|c| c.can_handle_token(target))
            .ok_or_else(|| {
                warn!(kind = ?target.kind(), "No canceller for presented token");
                StsError::request_failed(format!("no canceller for a {:?} token", target.kind()))
            })?;
        let cancelled = canceller.cancel_token(&TokenCancellerParameters {
            properties: &config.properties,
            store: config.store.as_ref(),
            context,
            token: target,
        })?;
        debug!(canceller = canceller.name(), token_id = %cancelled.token_id, "Token cancelled");

        let mut response = RequestSecurityTokenResponse::new(requirements.context.clone());
        response.requested_token_cancelled = true;
        Ok(response)
    }
}
