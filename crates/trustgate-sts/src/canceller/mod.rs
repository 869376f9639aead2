//! Token cancellers. Cancelling removes the token from the store for good;
//! cancelling twice fails.

mod sct;

pub use sct::SctTokenCanceller;

use crate::context::InvocationContext;
use crate::error::StsResult;
use crate::properties::StsProperties;
use crate::store::TokenStore;
use crate::token::ReceivedToken;

pub struct TokenCancellerParameters<'a> {
    pub properties: &'a StsProperties,
    pub store: &'a dyn TokenStore,
    pub context: &'a InvocationContext,
    pub token: &'a ReceivedToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenCancellerResponse {
    pub token_id: String,
}

pub trait TokenCanceller: Send + Sync {
    fn name(&self) -> &str;

    fn can_handle_token(&self, token: &ReceivedToken) -> bool;

    fn cancel_token(&self, parameters: &TokenCancellerParameters<'_>) -> StsResult<TokenCancellerResponse>;
}
