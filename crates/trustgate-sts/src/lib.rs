//! # trustgate-sts
//!
//! WS-Trust security token service operation engine.
//!
//! This crate provides:
//! - The Issue, Validate, Renew and Cancel operations
//! - Pluggable token providers, validators, renewers and cancellers
//! - Cross-realm identity and claims federation
//! - OnBehalfOf / ActAs delegation authorization
//! - The token lifecycle store
//!
//! ## Overview
//!
//! A [`SecurityTokenService`] is wired once at startup, either from a
//! [`trustgate_config::StsConfig`] or through an [`EngineBuilder`], and is
//! then shared read-only by every request. Each operation parses the
//! request into typed requirements, resolves realm and delegation, picks a
//! plugin from the matching registry and assembles the response.
//!
//! ## Modules
//!
//! - [`operation`] - The four WS-Trust operations
//! - [`provider`] - Token creation (SAML, JWT, SecurityContextToken)
//! - [`validator`] - Token validation (SAML, JWT, SCT, UsernameToken, X.509)
//! - [`renewer`] / [`canceller`] - Token lifecycle
//! - [`claims`] - Requested claims and claims handlers
//! - [`federation`] - Realms, relationships and identity mapping
//! - [`delegation`] - Delegation handlers
//! - [`store`] - Token store and expiry sweeper
//! - [`events`] - Operation events

pub mod canceller;
pub mod claims;
pub mod constants;
pub mod context;
pub mod crypto;
pub mod delegation;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod events;
pub mod federation;
pub mod lifetime;
pub mod operation;
pub mod properties;
pub mod provider;
pub mod registry;
pub mod renewer;
pub mod request;
pub mod response;
pub mod service;
pub mod store;
pub mod sts;
pub mod token;
pub mod validator;

pub use context::{InvocationContext, Principal, ProofCredential};
pub use engine::{EngineBuilder, EngineConfig, SweeperSettings};
pub use error::{ErrorCategory, FaultCode, StsError, StsResult};
pub use events::{EventPublisher, LoggingEventListener, Outcome, StsEvent, StsEventListener};
pub use lifetime::Lifetime;
pub use properties::StsProperties;
pub use registry::PluginRegistry;
pub use request::{KeyType, RequestSecurityToken, RequestType};
pub use response::{
    BatchItem, RequestSecurityTokenResponse, RequestSecurityTokenResponseCollection, Status,
    StatusCode,
};
pub use service::{ServiceDescriptor, ServiceRegistry};
pub use store::{CachedToken, InMemoryTokenStore, TokenStore};
pub use sts::SecurityTokenService;
pub use token::{PresentedToken, ReceivedToken, TokenElement, TokenState};
