use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "trustgate")]
#[command(about = "trustgate: run WS-Trust requests against a configured security token service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./trustgate.toml when present)
    #[arg(short, long, global = true, env = "TRUSTGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level, overrides `logging.level` (RUST_LOG still wins)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration, then build the engine
    Check,
    /// Issue a token for the caller
    Issue(IssueArgs),
    /// Execute a RequestSecurityToken JSON document (an array runs as a batch)
    Handle(HandleArgs),
    /// Execute one RequestSecurityToken JSON document per stdin line until EOF
    Pipe(CallerArgs),
}

/// Who is calling, as a transport binding would report it.
#[derive(clap::Args, Clone, Debug, Default)]
pub struct CallerArgs {
    /// Authenticated caller name
    #[arg(short, long)]
    pub principal: Option<String>,
    /// Caller role (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,
    /// Request URL the call arrived on, used for realm selection
    #[arg(long)]
    pub request_url: Option<String>,
    /// Base64 symmetric key the caller proves possession of
    #[arg(long)]
    pub proof_secret: Option<String>,
}

#[derive(clap::Args)]
pub struct IssueArgs {
    /// Token type URI or alias (saml1.1, saml2.0, jwt, sct)
    #[arg(short, long)]
    pub token_type: Option<String>,
    /// Relying party address
    #[arg(short, long)]
    pub applies_to: Option<String>,
    /// Required claim type (repeatable)
    #[arg(long = "claim")]
    pub claims: Vec<String>,
    #[command(flatten)]
    pub caller: CallerArgs,
}

#[derive(clap::Args)]
pub struct HandleArgs {
    /// Path to the JSON document (reads from stdin if omitted)
    pub file: Option<PathBuf>,
    #[command(flatten)]
    pub caller: CallerArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issue_with_caller() {
        let cli = Cli::try_parse_from([
            "trustgate",
            "issue",
            "--token-type",
            "jwt",
            "--claim",
            "email",
            "--claim",
            "role",
            "--principal",
            "alice",
            "--role",
            "admin",
        ])
        .unwrap();

        let Commands::Issue(args) = cli.command else {
            panic!("expected issue");
        };
        assert_eq!(args.token_type.as_deref(), Some("jwt"));
        assert_eq!(args.claims, vec!["email", "role"]);
        assert_eq!(args.caller.principal.as_deref(), Some("alice"));
        assert_eq!(args.caller.roles, vec!["admin"]);
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["trustgate", "check", "--config", "sts.toml"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
        assert_eq!(cli.config, Some(PathBuf::from("sts.toml")));
    }
}
