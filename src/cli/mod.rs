//! Rule-management subcommands.
//!
//! These run as short-lived processes against the same persisted file a
//! running server watches, so every command opens the file-backed store,
//! mutates it, and exits; the server notices through its reload poll.

pub mod banner;

use crate::store::{Failure, FileRuleStore, Rule, RuleStore};
use anyhow::bail;
use clap::Subcommand;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// Add a new failure injection rule
    Add {
        /// URL prefix the rule matches against
        #[arg(long)]
        target: String,
        /// Failure type: latency, error, flaky or timeout
        #[arg(long = "failure-type")]
        failure_type: String,
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
        #[arg(long, default_value_t = 0)]
        error_code: u16,
        #[arg(long, default_value_t = 0.0)]
        probability: f64,
        /// Grouping tag, e.g. api or database
        #[arg(long)]
        category: Option<String>,
    },
    /// List all failure injection rules
    #[command(alias = "ls")]
    List,
    /// Delete a rule by id or list number
    #[command(alias = "rm")]
    Delete { rule: String },
    /// Enable a rule by id or list number
    Enable { rule: String },
    /// Disable a rule by id or list number
    Disable { rule: String },
    /// Write the rule set to a JSON file
    Export { file: PathBuf },
    /// Load rules from a JSON file, assigning fresh ids
    Import { file: PathBuf },
}

pub fn run(command: RulesCommand, rules_file: PathBuf) -> Result<(), anyhow::Error> {
    let store = FileRuleStore::new(Some(rules_file));
    match command {
        RulesCommand::Add {
            target,
            failure_type,
            latency_ms,
            error_code,
            probability,
            category,
        } => add_rule(
            &store,
            target,
            failure_type,
            latency_ms,
            error_code,
            probability,
            category,
        ),
        RulesCommand::List => list_rules(&store),
        RulesCommand::Delete { rule } => {
            let rule = resolve_rule(&store, &rule)?;
            store.delete(&rule.id);
            println!("Deleted rule {} ({})", rule.id, rule.target);
            Ok(())
        }
        RulesCommand::Enable { rule } => toggle_rule(&store, &rule, true),
        RulesCommand::Disable { rule } => toggle_rule(&store, &rule, false),
        RulesCommand::Export { file } => export_rules(&store, &file),
        RulesCommand::Import { file } => import_rules(&store, &file),
    }
}

fn add_rule(
    store: &FileRuleStore,
    target: String,
    failure_type: String,
    latency_ms: u64,
    error_code: u16,
    probability: f64,
    category: Option<String>,
) -> Result<(), anyhow::Error> {
    if target.is_empty() {
        bail!("--target must not be empty");
    }
    match failure_type.as_str() {
        "latency" | "timeout" => {}
        "error" => {
            if !(100..=599).contains(&error_code) {
                bail!("--error-code {error_code} outside [100, 599]");
            }
        }
        "flaky" => {
            if !(0.0..=1.0).contains(&probability) {
                bail!("--probability {probability} outside [0, 1]");
            }
        }
        other => bail!("unknown failure type {other:?}; expected latency, error, flaky or timeout"),
    }

    let rule = Rule {
        id: Uuid::new_v4().to_string(),
        target,
        enabled: true,
        category: category.or_else(|| Some("api".to_string())),
        failure: Failure {
            kind: failure_type,
            latency_ms,
            error_code,
            probability,
        },
    };
    store.add(rule.clone());
    println!("Added rule {} ({} -> {})", rule.id, rule.target, rule.failure.kind);
    Ok(())
}

fn list_rules(store: &FileRuleStore) -> Result<(), anyhow::Error> {
    let rules = store.get_all();
    if rules.is_empty() {
        println!("No rules configured.");
        return Ok(());
    }
    println!(
        "{:<4} {:<38} {:<8} {:<9} {:<10} TARGET",
        "#", "ID", "ENABLED", "CATEGORY", "FAILURE"
    );
    for (i, rule) in rules.iter().enumerate() {
        println!(
            "{:<4} {:<38} {:<8} {:<9} {:<10} {}",
            i + 1,
            rule.id,
            rule.enabled,
            rule.category.as_deref().unwrap_or("-"),
            rule.failure.kind,
            rule.target
        );
    }
    Ok(())
}

fn toggle_rule(store: &FileRuleStore, selector: &str, enabled: bool) -> Result<(), anyhow::Error> {
    let mut rule = resolve_rule(store, selector)?;
    rule.enabled = enabled;
    store.update(rule.clone());
    println!(
        "{} rule {} ({})",
        if enabled { "Enabled" } else { "Disabled" },
        rule.id,
        rule.target
    );
    Ok(())
}

/// Accept either a rule id or a 1-based number from `rules list`.
fn resolve_rule(store: &FileRuleStore, selector: &str) -> Result<Rule, anyhow::Error> {
    let rules = store.get_all();
    if let Ok(number) = selector.parse::<usize>() {
        if number >= 1 && number <= rules.len() {
            return Ok(rules[number - 1].clone());
        }
        bail!("rule number {number} out of range (1..={})", rules.len());
    }
    match rules.into_iter().find(|r| r.id == selector) {
        Some(rule) => Ok(rule),
        None => bail!("no rule with id {selector:?}"),
    }
}

fn export_rules(store: &FileRuleStore, file: &PathBuf) -> Result<(), anyhow::Error> {
    let rules = store.get_all();
    fs::write(file, serde_json::to_vec_pretty(&rules)?)?;
    println!("Exported {} rules to {}", rules.len(), file.display());
    Ok(())
}

fn import_rules(store: &FileRuleStore, file: &PathBuf) -> Result<(), anyhow::Error> {
    let data = fs::read(file)?;
    let rules: Vec<Rule> = serde_json::from_slice(&data)?;
    let count = rules.len();
    for mut rule in rules {
        rule.id = Uuid::new_v4().to_string();
        store.add(rule);
    }
    println!("Imported {count} rules from {}", file.display());
    Ok(())
}
