//! The security token service entry point.

use std::sync::Arc;

use tracing::{debug, info};
use trustgate_config::StsConfig;

use crate::context::InvocationContext;
use crate::engine::{EngineBuilder, EngineConfig};
use crate::error::{StsError, StsResult};
use crate::operation::{CancelOperation, IssueOperation, RenewOperation, ValidateOperation};
use crate::request::{RequestSecurityToken, RequestType};
use crate::response::{RequestSecurityTokenResponse, RequestSecurityTokenResponseCollection};
use crate::store::spawn_expiry_sweeper;

/// Routes requests to the four operations over one frozen [`EngineConfig`].
///
/// Cloning is cheap; clones share the config and the token store.
#[derive(Debug, Clone)]
pub struct SecurityTokenService {
    config: Arc<EngineConfig>,
    issue: IssueOperation,
    validate: ValidateOperation,
    renew: RenewOperation,
    cancel: CancelOperation,
}

impl SecurityTokenService {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        info!(
            providers = config.providers.len(),
            validators = config.validators.len(),
            renewers = config.renewers.len(),
            cancellers = config.cancellers.len(),
            services = config.services.len(),
            "Security token service ready"
        );
        Self {
            issue: IssueOperation::new(Arc::clone(&config)),
            validate: ValidateOperation::new(Arc::clone(&config)),
            renew: RenewOperation::new(Arc::clone(&config)),
            cancel: CancelOperation::new(Arc::clone(&config)),
            config,
        }
    }

    pub fn from_config(config: &StsConfig) -> StsResult<Self> {
        Ok(EngineBuilder::from_config(config)?.build())
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn issue_operation(&self) -> &IssueOperation {
        &self.issue
    }

    #[must_use]
    pub fn validate_operation(&self) -> &ValidateOperation {
        &self.validate
    }

    #[must_use]
    pub fn renew_operation(&self) -> &RenewOperation {
        &self.renew
    }

    #[must_use]
    pub fn cancel_operation(&self) -> &CancelOperation {
        &self.cancel
    }

    /// Dispatches on the request's RequestType. Without one the operation is
    /// inferred from the target element present, defaulting to Issue.
    pub fn handle(
        &self,
        request: &RequestSecurityToken,
        context: &InvocationContext,
    ) -> StsResult<RequestSecurityTokenResponse> {
        match Self::request_type(request)? {
            RequestType::Issue => self.issue.issue(request, context),
            RequestType::Validate => self.validate.validate(request, context),
            RequestType::Renew => self.renew.renew(request, context),
            RequestType::Cancel => self.cancel.cancel(request, context),
        }
    }

    /// Handles each request on its own and collects the outcomes, faults
    /// included, in request order.
    pub fn handle_batch(
        &self,
        requests: &[RequestSecurityToken],
        context: &InvocationContext,
    ) -> RequestSecurityTokenResponseCollection {
        debug!(requests = requests.len(), "Batch request");
        requests.iter().map(|r| self.handle(r, context)).collect()
    }

    /// Starts the store sweeper when one is configured. Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        let sweeper = self.config.sweeper?;
        info!(
            interval_ms = sweeper.interval.as_millis() as u64,
            retention_secs = sweeper.retention.whole_seconds(),
            "Starting token store sweeper"
        );
        Some(spawn_expiry_sweeper(
            Arc::clone(&self.config.store),
            sweeper.interval,
            sweeper.retention,
        ))
    }

    fn request_type(request: &RequestSecurityToken) -> StsResult<RequestType> {
        if let Some(uri) = request.request_type.as_deref() {
            return RequestType::from_uri(uri)
                .ok_or_else(|| StsError::invalid_request(format!("unknown RequestType {uri}")));
        }
        let inferred = if request.validate_target.is_some() {
            RequestType::Validate
        } else if request.renew_target.is_some() {
            RequestType::Renew
        } else if request.cancel_target.is_some() {
            RequestType::Cancel
        } else {
            RequestType::Issue
        };
        Ok(inferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::request_types;
    use crate::crypto::SymmetricKeyStore;
    use crate::engine::SweeperSettings;
    use crate::properties::StsProperties;
    use crate::token::{PresentedToken, SecurityContextToken};

    fn sct() -> PresentedToken {
        PresentedToken::SecurityContext(SecurityContextToken::with_identifier("urn:uuid:1"))
    }

    #[test]
    fn test_request_type_inference() {
        let mut request = RequestSecurityToken::cancel(sct());
        request.request_type = None;
        assert_eq!(
            SecurityTokenService::request_type(&request).unwrap(),
            RequestType::Cancel
        );

        let request = RequestSecurityToken::default();
        assert_eq!(
            SecurityTokenService::request_type(&request).unwrap(),
            RequestType::Issue
        );

        let request = RequestSecurityToken {
            request_type: Some(request_types::BATCH_ISSUE.to_string()),
            ..RequestSecurityToken::default()
        };
        assert_eq!(
            SecurityTokenService::request_type(&request).unwrap(),
            RequestType::Issue
        );
    }

    #[test]
    fn test_unknown_request_type_is_invalid_request() {
        let request = RequestSecurityToken {
            request_type: Some("urn:bogus".to_string()),
            ..RequestSecurityToken::default()
        };
        let err = SecurityTokenService::request_type(&request).unwrap_err();
        assert_eq!(err.fault_code(), crate::error::FaultCode::InvalidRequest);
    }

    #[test]
    fn test_sweeper_not_configured() {
        let properties = StsProperties::new("issuer", Arc::new(SymmetricKeyStore::new()));
        let sts = EngineBuilder::new(properties).build();
        assert!(sts.config().sweeper.is_none());
        assert!(sts.spawn_sweeper().is_none());
    }

    #[test]
    fn test_configured_sweeper_spawns() {
        let properties = StsProperties::new("issuer", Arc::new(SymmetricKeyStore::new()));
        let sts = EngineBuilder::new(properties)
            .sweeper(SweeperSettings {
                interval: std::time::Duration::from_millis(10),
                retention: time::Duration::ZERO,
            })
            .build();

        tokio_test::block_on(async {
            let handle = sts.spawn_sweeper().expect("sweeper configured");
            handle.abort();
            assert!(handle.await.unwrap_err().is_cancelled());
        });
    }
}
