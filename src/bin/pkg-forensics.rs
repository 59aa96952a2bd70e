//! CLI tool for auditing PyPI packages before installation

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use pkg_forensics::{
    audit_package, canonical_name, determine_risk, AuditConfig, AuditError, AuditVerdict,
    NodeStatus, Outcome, RiskLevel, TrustStore,
};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "pkg-forensics")]
#[command(about = "Forensic pre-install audit of PyPI packages and their dependency trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to custom configuration file (TOML)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a package before installing it
    Check {
        /// Package name as published on the registry
        package: String,

        /// Also audit the dependency tree
        #[arg(short = 'r', long)]
        recursive: bool,

        /// Maximum dependency depth for recursive audits
        #[arg(long)]
        max_depth: Option<usize>,

        /// Print the full verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a package to the trust store and re-sign it
    Trust {
        /// Package name to trust
        package: String,
    },

    /// Re-sign the trust store after a manual edit
    Sign,

    /// Check the trust store against its signature
    Verify,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = match AuditConfig::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} Failed to load config: {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };

    let store = TrustStore::new(config.storage.trust_store_path());
    if let Err(e) = store.ensure_exists() {
        eprintln!("{} Cannot initialise trust store: {}", "Error:".red().bold(), e);
        process::exit(1);
    }

    let code = match cli.command {
        Commands::Check {
            package,
            recursive,
            max_depth,
            json,
        } => {
            let depth = max_depth.unwrap_or(config.traversal.max_depth);
            run_check(&package, recursive, depth, json, &config).await
        }
        Commands::Trust { package } => run_trust(&store, &package),
        Commands::Sign => match store.sign() {
            Ok(digest) => {
                println!("{} Trust store signed ({})", "Success:".green().bold(), digest);
                0
            }
            Err(e) => {
                eprintln!("{} Failed to sign trust store: {}", "Error:".red().bold(), e);
                1
            }
        },
        Commands::Verify => match store.verify() {
            Ok(true) => {
                println!("{} Trust store signature is valid", "Success:".green().bold());
                0
            }
            Ok(false) => {
                report_breach(store.path());
                1
            }
            Err(e) => {
                eprintln!("{} Failed to verify trust store: {}", "Error:".red().bold(), e);
                1
            }
        },
    };

    process::exit(code);
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_check(
    package: &str,
    recursive: bool,
    max_depth: usize,
    json: bool,
    config: &AuditConfig,
) -> i32 {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Auditing {}...", package));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = audit_package(package, recursive, max_depth, config).await;

    spinner.finish_and_clear();

    let verdict = match result {
        Ok(verdict) => verdict,
        Err(AuditError::IntegrityBreach { path }) => {
            report_breach(&path);
            return 1;
        }
        Err(e) => {
            eprintln!("{} Audit failed: {}", "Error:".red().bold(), e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&verdict) {
            Ok(content) => println!("{}", content),
            Err(e) => {
                eprintln!("{} Failed to serialize verdict: {}", "Error:".red().bold(), e);
                return 1;
            }
        }
    } else {
        display_verdict(&verdict, config.pass_threshold);
    }

    if verdict.passed {
        0
    } else {
        1
    }
}

fn run_trust(store: &TrustStore, package: &str) -> i32 {
    // Never re-sign over a tampered store.
    match store.verify() {
        Ok(true) => {}
        Ok(false) => {
            report_breach(store.path());
            return 1;
        }
        Err(e) => {
            eprintln!("{} Failed to verify trust store: {}", "Error:".red().bold(), e);
            return 1;
        }
    }

    let name = canonical_name(package);
    let result = store.add(&name).and_then(|added| {
        if added {
            store.sign()?;
        }
        Ok(added)
    });

    match result {
        Ok(true) => {
            info!("Trusted {}", name);
            println!("{} {} added to the trust store", "Success:".green().bold(), name.cyan());
            0
        }
        Ok(false) => {
            println!("{} is already trusted", name.cyan());
            0
        }
        Err(e) => {
            eprintln!("{} Failed to update trust store: {}", "Error:".red().bold(), e);
            1
        }
    }
}

fn report_breach(path: &std::path::Path) {
    eprintln!(
        "{} Trust store {} does not match its signature.",
        "INTEGRITY BREACH:".red().bold(),
        path.display()
    );
    eprintln!("  Review the file, then run `pkg-forensics sign` to accept its contents.");
}

fn display_verdict(verdict: &AuditVerdict, pass_threshold: u8) {
    let tree = &verdict.tree;
    println!("\n{}", "=== Forensic Audit ===".bold());
    println!("Package: {}", tree.root.cyan());

    match tree.root_node().map(|n| &n.status) {
        Some(NodeStatus::Trusted { .. }) => {
            println!("{} {} is in the trust store", "Trusted:".green().bold(), tree.root);
        }
        Some(NodeStatus::FetchFailed { reason }) => {
            println!(
                "{} could not audit {} ({}); allowing install",
                "Warning:".yellow().bold(),
                tree.root,
                reason
            );
        }
        _ => {}
    }

    if let Some(score) = verdict.score {
        let level = determine_risk(score, pass_threshold);
        let label = format!("{} ({})", score, level);
        let label = match level {
            RiskLevel::Safe => label.green(),
            RiskLevel::Suspicious => label.yellow(),
            RiskLevel::Dangerous => label.red(),
        };
        println!("Score: {}", label);

        for finding in &verdict.findings {
            let outcome = match finding.outcome {
                Outcome::Pass => finding.outcome.to_string().green(),
                Outcome::Fail => finding.outcome.to_string().red(),
            };
            let evidence = serde_json::to_string(&finding.evidence).unwrap_or_default();
            println!("  [{}] {:<14} {}", outcome, finding.kind.to_string(), evidence.dimmed());
        }
    }

    if tree.nodes.len() > 1 {
        let summary = &tree.summary;
        println!();
        println!(
            "Dependency tree: {} packages ({} audited, {} cached, {} trusted, {} unresolved)",
            summary.total_nodes, summary.audited, summary.cached, summary.trusted, summary.fetch_failed
        );
        for node in tree.failing() {
            if let Some(result) = node.result() {
                println!(
                    "  {} {} {} (depth {}): score {}",
                    "●".red(),
                    result.package,
                    result.version,
                    node.depth,
                    result.score
                );
            }
        }
    }

    println!();
    if verdict.passed {
        println!("{} Safe to install", "Success:".green().bold());
    } else {
        println!(
            "{} {} package(s) scored below {}",
            "Failed:".red().bold(),
            tree.summary.failing,
            pass_threshold
        );
    }
}
