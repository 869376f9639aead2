use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use trustgate_sts::claims::Claim;
use trustgate_sts::{
    BatchItem, InvocationContext, RequestSecurityToken, RequestSecurityTokenResponse,
    SecurityTokenService,
};

use super::{Document, caller_context, read_document};
use crate::cli::{CallerArgs, HandleArgs, IssueArgs};
use crate::observability::apply_logging_level;
use crate::output::{print_json, print_success};

/// Pipe control line that changes the log level, e.g. `:log debug`.
const LOG_COMMAND: &str = ":log ";

pub fn issue(sts: &SecurityTokenService, args: &IssueArgs) -> Result<()> {
    let context = caller_context(&args.caller)?;
    let request = issue_request(args);
    let response = respond(sts.handle(&request, &context))?;
    print_success(&format!(
        "Issued {}",
        response.token_type.as_deref().unwrap_or("token")
    ));
    Ok(())
}

fn issue_request(args: &IssueArgs) -> RequestSecurityToken {
    let mut request = RequestSecurityToken::issue();
    if let Some(token_type) = &args.token_type {
        request = request.with_token_type(token_type);
    }
    if let Some(address) = &args.applies_to {
        request = request.with_applies_to(address);
    }
    for claim_type in &args.claims {
        request = request.with_claim(Claim::required(claim_type));
    }
    request
}

pub fn handle(sts: &SecurityTokenService, args: &HandleArgs) -> Result<()> {
    let context = caller_context(&args.caller)?;
    match read_document(args.file.as_deref())? {
        Document::Single(request) => {
            respond(sts.handle(&request, &context))?;
        }
        Document::Batch(requests) => {
            let collection = sts.handle_batch(&requests, &context);
            print_json(&collection)?;
            let faults = collection.iter().filter(|item| item.is_fault()).count();
            if faults > 0 {
                bail!("{faults} of {} requests failed", collection.len());
            }
        }
    }
    Ok(())
}

/// Prints the response, or the fault as JSON and fails.
fn respond(
    result: trustgate_sts::StsResult<RequestSecurityTokenResponse>,
) -> Result<RequestSecurityTokenResponse> {
    match result {
        Ok(response) => {
            print_json(&response)?;
            Ok(response)
        }
        Err(e) => {
            let message = format!("{}: {e}", e.fault_code().qname());
            print_json(&BatchItem::from_result(Err(e)))?;
            bail!(message)
        }
    }
}

/// Runs one JSON request per stdin line until EOF. A failing line produces a
/// fault line and does not stop the loop.
pub async fn pipe(sts: &SecurityTokenService, args: &CallerArgs) -> Result<()> {
    let context = caller_context(args)?;
    let sweeper = sts.spawn_sweeper();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut handled = 0usize;
    while let Some(line) = lines.next_line().await.context("cannot read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(level) = line.strip_prefix(LOG_COMMAND) {
            apply_logging_level(level.trim());
            tracing::info!(level = level.trim(), "Log level changed");
            continue;
        }
        println!("{}", pipe_line(sts, &context, line)?);
        handled += 1;
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    tracing::info!(requests = handled, "Input closed");
    Ok(())
}

/// One compact JSON result line for one input line.
fn pipe_line(sts: &SecurityTokenService, context: &InvocationContext, line: &str) -> Result<String> {
    let item = match serde_json::from_str::<RequestSecurityToken>(line) {
        Ok(request) => BatchItem::from_result(sts.handle(&request, context)),
        Err(e) => BatchItem::Fault {
            code: trustgate_sts::FaultCode::InvalidRequest.qname(),
            reason: format!("input is not a RequestSecurityToken document: {e}"),
        },
    };
    serde_json::to_string(&item).context("cannot render response")
}
