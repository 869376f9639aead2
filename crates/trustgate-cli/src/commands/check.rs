use anyhow::{Context, Result};
use trustgate_config::StsConfig;
use trustgate_sts::SecurityTokenService;

use crate::output::{print_field, print_success};

/// Builds the engine from `config` and prints what got wired.
pub fn check(config: &StsConfig) -> Result<SecurityTokenService> {
    let sts = SecurityTokenService::from_config(config).context("cannot build engine")?;
    let engine = sts.config();

    print_field("Issuer", &engine.properties.issuer);
    print_field("Providers", names(engine.providers.iter().map(|p| p.name())));
    print_field("Validators", names(engine.validators.iter().map(|v| v.name())));
    print_field("Renewers", names(engine.renewers.iter().map(|r| r.name())));
    print_field("Cancellers", names(engine.cancellers.iter().map(|c| c.name())));
    print_field(
        "Delegation",
        names(engine.delegation_handlers.iter().map(|d| d.name())),
    );
    print_field("Services", engine.services.len());
    print_field("Realms", engine.properties.realms.len());
    match engine.sweeper {
        Some(sweeper) => print_field("Sweeper", format!("every {:?}", sweeper.interval)),
        None => print_field("Sweeper", "disabled"),
    }
    print_success("Configuration is valid");
    Ok(sts)
}

fn names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_builds_default_engine() {
        let config = trustgate_config::load_config_from_str(
            r#"
[[keystore.entries]]
alias = "sts"
secret = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f"
"#,
        )
        .unwrap();

        let sts = check(&config).unwrap();

        assert!(sts.config().providers.len() >= 3);
        assert!(sts.config().sweeper.is_none());
    }
}
