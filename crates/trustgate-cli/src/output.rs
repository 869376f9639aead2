use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("cannot render response")?;
    println!("{rendered}");
    Ok(())
}

pub fn print_success(msg: &str) {
    eprintln!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_field(name: &str, value: impl std::fmt::Display) {
    eprintln!("{}: {}", name.cyan(), value);
}
