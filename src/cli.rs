use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{
    AgreementStore, InMemoryAgreementStore, InMemoryAuditStore, JsonLinesAuditStore, Notification,
    NotificationDispatcher, StoreError,
};
use crate::agreements::AgreementManager;
use crate::audit::AuditLogger;
use crate::clock::system_clock;
use crate::compliance::{export_report, ComplianceAnalyzer, ExportFormat, ReportOptions};
use crate::configuration::ComplianceConfig;
use crate::models::BusinessAssociateAgreement;

/// Carelog - compliance and audit administration
#[derive(Parser)]
#[command(name = "carelog")]
#[command(about = "Compliance and audit administration for the patient portal")]
#[command(long_about = "Carelog - audit trail reporting, field encryption and agreement expiry checks\n\nEncryption secrets are read from the environment variables named in the config file.")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a compliance report from the audit trail
    Report {
        /// Window start (RFC 3339 or YYYY-MM-DD); defaults to 30 days ago
        #[arg(long)]
        from: Option<String>,
        /// Window end (RFC 3339 or YYYY-MM-DD); defaults to now
        #[arg(long)]
        to: Option<String>,
        /// json, yaml, text or markdown
        #[arg(long, default_value = "text")]
        format: String,
        /// Only include entries for this actor
        #[arg(long)]
        actor: Option<String>,
        /// Skip suspicious-pattern detection
        #[arg(long)]
        no_patterns: bool,
        /// Audit trail file, overriding the configured one
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Encrypt a value with the active key
    Encrypt { plaintext: String },
    /// Decrypt a value produced by `encrypt`
    Decrypt { ciphertext: String },
    /// Send notices for agreements nearing expiration
    CheckExpirations {
        /// JSON file holding an array of agreements
        agreements: PathBuf,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the config file for errors
    Validate,
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => ComplianceConfig::default_path()?,
    };

    match cli.command {
        Commands::Report { from, to, format, actor, no_patterns, log } => {
            let config = ComplianceConfig::load_or_default(&config_path)?;
            let options = ReportOptions {
                actor_id: actor,
                detect_patterns: !no_patterns,
            };
            generate_report(&config, from.as_deref(), to.as_deref(), &format, options, log).await
        }
        Commands::Encrypt { plaintext } => encrypt(&config_path, &plaintext),
        Commands::Decrypt { ciphertext } => decrypt(&config_path, &ciphertext),
        Commands::CheckExpirations { agreements } => check_expirations(&config_path, &agreements).await,
        Commands::Config { action } => config_command(&config_path, action),
    }
}

/// Accept RFC 3339 timestamps or bare dates (midnight UTC)
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid timestamp '{}': expected RFC 3339 or YYYY-MM-DD", value))?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| anyhow!("Invalid date '{}'", value))
}

async fn generate_report(
    config: &ComplianceConfig,
    from: Option<&str>,
    to: Option<&str>,
    format: &str,
    options: ReportOptions,
    log: Option<PathBuf>,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let end = match to {
        Some(value) => parse_timestamp(value)?,
        None => Utc::now(),
    };
    let start = match from {
        Some(value) => parse_timestamp(value)?,
        None => end - Duration::days(30),
    };

    let log_path = log
        .or_else(|| config.audit_log_path.clone())
        .ok_or_else(|| anyhow!("No audit trail given; pass --log or set audit_log_path in the config"))?;
    if !log_path.exists() {
        bail!("Audit trail not found: {}", log_path.display());
    }

    let analyzer = ComplianceAnalyzer::new(Arc::new(JsonLinesAuditStore::new(log_path)), system_clock())
        .with_thresholds(config.patterns.clone())
        .with_report_config(config.report.clone());
    let report = analyzer
        .generate_report(start, end, options)
        .await
        .context("Failed to generate compliance report")?;

    println!("{}", export_report(&report, format)?);
    Ok(())
}

fn encrypt(config_path: &Path, plaintext: &str) -> Result<()> {
    let config = ComplianceConfig::load_or_default(config_path)?;
    let keys = config.encryption.key_manager()?;
    println!("{}", keys.encrypt(plaintext).context("Encryption failed")?);
    Ok(())
}

fn decrypt(config_path: &Path, ciphertext: &str) -> Result<()> {
    let config = ComplianceConfig::load_or_default(config_path)?;
    let keys = config.encryption.key_manager()?;
    let value: serde_json::Value = keys.decrypt(ciphertext.trim()).context("Decryption failed")?;
    match value {
        serde_json::Value::String(text) => println!("{}", text),
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}

/// Prints notices instead of delivering them
struct ConsoleNotifier;

#[async_trait]
impl NotificationDispatcher for ConsoleNotifier {
    async fn dispatch(&self, notification: &Notification) -> std::result::Result<(), StoreError> {
        match notification {
            Notification::AgreementExpiration { associate_id, agreement_id, expiration_date } => {
                println!(
                    "📅 Agreement {} with {} expires {}",
                    agreement_id,
                    associate_id,
                    expiration_date.format("%Y-%m-%d")
                );
            }
        }
        Ok(())
    }
}

async fn check_expirations(config_path: &Path, agreements_path: &Path) -> Result<()> {
    let config = ComplianceConfig::load_or_default(config_path)?;
    let content = std::fs::read_to_string(agreements_path)
        .with_context(|| format!("Failed to read agreements file: {}", agreements_path.display()))?;
    let agreements: Vec<BusinessAssociateAgreement> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse agreements file: {}", agreements_path.display()))?;

    let store = InMemoryAgreementStore::new();
    for agreement in &agreements {
        store.insert(agreement).await?;
    }

    let keys = Arc::new(config.encryption.key_manager()?);
    let clock = system_clock();
    let audit = Arc::new(
        AuditLogger::new(Arc::new(InMemoryAuditStore::new()), keys, clock.clone(), config.system_id.clone())
            .with_retention(config.retention),
    );
    let manager = AgreementManager::new(Arc::new(store), Arc::new(ConsoleNotifier), audit, clock)
        .with_config(config.agreements.clone());

    let expiring = manager.check_expirations().await?;
    if expiring.is_empty() {
        println!(
            "✅ No agreements expire in the next {} days",
            config.agreements.expiration_notice_days
        );
    } else {
        println!("⚠️  {} agreement(s) nearing expiration", expiring.len());
    }
    Ok(())
}

fn config_command(config_path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = ComplianceConfig::load_or_default(config_path)?;
            print!("{}", toml::to_string_pretty(&config).context("Failed to render configuration")?);
        }
        ConfigAction::Path => println!("{}", config_path.display()),
        ConfigAction::Init { force } => {
            if config_path.exists() && !force {
                bail!("Config file already exists: {} (use --force to overwrite)", config_path.display());
            }
            ComplianceConfig::default().save(config_path)?;
            println!("✅ Wrote default configuration to {}", config_path.display());
        }
        ConfigAction::Validate => {
            ComplianceConfig::load(config_path)?;
            println!("✅ Configuration is valid: {}", config_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(
            parse_timestamp("2024-05-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_timestamp("2024-05-01T08:30:00-05:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0).unwrap()
        );
        assert!(parse_timestamp("May 1st").is_err());
    }

    #[test]
    fn test_cli_parses_report_command() {
        let cli = Cli::try_parse_from([
            "carelog", "report", "--from", "2024-01-01", "--format", "json", "--no-patterns",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { from, format, no_patterns, .. } => {
                assert_eq!(from.as_deref(), Some("2024-01-01"));
                assert_eq!(format, "json");
                assert!(no_patterns);
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn test_cli_parses_config_init() {
        let cli = Cli::try_parse_from(["carelog", "--config", "/tmp/c.toml", "config", "init", "--force"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
        assert!(matches!(cli.command, Commands::Config { action: ConfigAction::Init { force: true } }));
    }
}
