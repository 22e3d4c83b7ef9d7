// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Operator CLI for inspecting and dry-running tool-warden policies
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use tool_warden::config::Config;
use tool_warden::engine::evaluator::PolicyEvaluator;
use tool_warden::loader::{merge, PolicyLoader};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Policy file to load (repeatable); overrides discovery
    #[arg(long = "policy", global = true)]
    policies: Vec<PathBuf>,

    /// Directory scanned for policy files when no --policy is given
    #[arg(long, global = true)]
    policy_dir: Option<PathBuf>,

    /// Environment whose overrides are applied
    #[arg(long = "env", global = true)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every source, report failures and the merged fingerprint
    Check,
    /// Print the effective policy as JSON
    Show,
    /// Evaluate the effective policy against one invocation
    Evaluate {
        #[arg(long)]
        tool: String,
        /// Tool parameters as a JSON document
        #[arg(long, default_value = "{}")]
        params: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        eprintln!(
            "Warning: Failed to load config from env, using defaults: {}",
            e
        );
        Config::default()
    });

    if !cli.policies.is_empty() {
        config.policy_paths = cli.policies.clone();
    }
    if let Some(dir) = &cli.policy_dir {
        config.policy_dir = dir.clone();
    }
    if let Some(env) = &cli.environment {
        config.environment = Some(env.clone());
    }

    init_tracing(&config);
    debug!(?config, "Configuration resolved");

    let loader = PolicyLoader::new();
    match cli.command {
        Command::Check => check(&config, &loader),
        Command::Show => {
            let sources = config.policy_sources()?;
            let Some(policy) = loader.load_effective(&sources, config.environment.as_deref())
            else {
                bail!("no policy could be loaded from {} source(s)", sources.len());
            };
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
        Command::Evaluate { tool, params } => {
            let params: Value =
                serde_json::from_str(&params).context("--params must be a JSON document")?;
            let sources = config.policy_sources()?;
            let Some(policy) = loader.load_effective(&sources, config.environment.as_deref())
            else {
                bail!("no policy could be loaded from {} source(s)", sources.len());
            };
            let evaluation = PolicyEvaluator::evaluate(&policy, &tool, &params);
            let report = json!({
                "tool": tool,
                "enforcementMode": policy.enforcement_mode(),
                "blocked": evaluation.is_blocked(),
                "blockingRules": evaluation.blocking_rule_ids(),
                "matched": evaluation.matched,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn check(config: &Config, loader: &PolicyLoader) -> anyhow::Result<()> {
    let sources = config.policy_sources()?;
    if sources.is_empty() {
        bail!(
            "no policy sources found (directory {})",
            config.policy_dir.display()
        );
    }

    let report = loader.load_all(&sources, config.environment.as_deref());
    for (path, policy) in &report.loaded {
        println!("ok      {} ({} rules)", path.display(), policy.rules.len());
    }
    for failure in &report.failures {
        println!("FAILED  {}", failure);
    }

    let policies = report.policies();
    if !policies.is_empty() {
        let effective = merge(&policies)?;
        println!(
            "effective policy: {} rules, fingerprint {}",
            effective.rules.len(),
            effective.fingerprint()
        );
    }
    if !report.failures.is_empty() {
        bail!("{} policy source(s) failed to load", report.failures.len());
    }
    Ok(())
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("tool_warden=info,warn"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
