pub mod check;
pub mod exchange;

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use trustgate_sts::encoding;
use trustgate_sts::{InvocationContext, Principal, ProofCredential, RequestSecurityToken};

use crate::cli::CallerArgs;

/// A JSON input document: one request, or an array run as a batch.
#[derive(Debug)]
pub enum Document {
    Single(Box<RequestSecurityToken>),
    Batch(Vec<RequestSecurityToken>),
}

impl Document {
    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).context("input is not valid JSON")?;
        if value.is_array() {
            let requests = serde_json::from_value(value)
                .context("input is not an array of RequestSecurityToken documents")?;
            Ok(Self::Batch(requests))
        } else {
            let request = serde_json::from_value(value)
                .context("input is not a RequestSecurityToken document")?;
            Ok(Self::Single(Box::new(request)))
        }
    }
}

/// Reads the document at `path`, or stdin when absent.
pub fn read_document(path: Option<&Path>) -> Result<Document> {
    let json = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("cannot read stdin")?;
            buffer
        }
    };
    Document::parse(&json)
}

pub fn caller_context(args: &CallerArgs) -> Result<InvocationContext> {
    let mut context = InvocationContext::new();
    if let Some(name) = &args.principal {
        context = context.with_principal(Principal::new(name));
    }
    for role in &args.roles {
        context = context.with_role(role);
    }
    if let Some(url) = &args.request_url {
        context = context.with_request_url(url);
    }
    if let Some(secret) = &args.proof_secret {
        let secret = encoding::decode(secret).context("--proof-secret is not base64")?;
        context = context.with_proof_credential(ProofCredential::SymmetricKey(secret));
    }
    Ok(context)
}
