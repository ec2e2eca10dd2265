use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use dairy_waste_guard::{
    config::{self, AppConfig},
    models::{DeliveryReport, InventoryBatch, InventoryRow},
    services::{
        insights::{self, GeminiClient, Insight},
        report::{self, DEFAULT_REPORT_FILE},
        waste_guard::{AlertRecord, AlertSession, UploadOutcome, WasteGuardService},
    },
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(
    name = "waste-guard",
    about = "Screen dairy inventory files for stock close to expiry",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Assess an inventory CSV and optionally alert
    Assess(AssessArgs),
    /// Ask the AI service a question about an inventory CSV
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct AssessArgs {
    #[arg(help = "Inventory CSV file")]
    file: PathBuf,
    #[arg(
        long,
        num_args = 0..=1,
        default_missing_value = DEFAULT_REPORT_FILE,
        help = "Write the risky-subset report (default file name expiry_report.csv)"
    )]
    report: Option<PathBuf>,
    #[arg(
        long,
        help = "Send an alert through every configured channel when items are at risk"
    )]
    notify: bool,
    #[arg(
        long,
        value_parser = parse_as_of,
        help = "Evaluate as of this date (YYYY-MM-DD) or RFC 3339 time instead of now"
    )]
    as_of: Option<DateTime<Utc>>,
    #[arg(long, default_value_t = 10, help = "Number of rows to preview")]
    preview: usize,
}

#[derive(Args, Debug)]
struct AskArgs {
    #[arg(help = "Inventory CSV file")]
    file: PathBuf,
    #[arg(long, help = "Question about the inventory")]
    question: String,
}

#[derive(Debug, Serialize)]
struct PreviewRow<'a> {
    product: Option<&'a str>,
    quantity: Option<u64>,
    days_remaining: i64,
    price: Option<String>,
}

impl<'a> From<&'a InventoryRow> for PreviewRow<'a> {
    fn from(row: &'a InventoryRow) -> Self {
        Self {
            product: row.product.as_deref(),
            quantity: row.quantity,
            days_remaining: row.days_remaining,
            price: row.price.map(|p| p.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct AssessSummary<'a> {
    batch_id: Uuid,
    total_items: usize,
    risky_count: usize,
    risk_score: u8,
    preview: Vec<PreviewRow<'a>>,
    warnings: Vec<String>,
    risky_items: &'a [InventoryRow],
    deliveries: &'a [DeliveryReport],
    last_alert: Option<&'a AlertRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("invalid configuration")?;
    init_cli_tracing(cfg.log_level());

    match cli.command {
        Commands::Assess(args) => handle_assess(&cfg, args, cli.json).await,
        Commands::Ask(args) => handle_ask(&cfg, args, cli.json).await,
    }
}

/// Logs go to stderr so `--json` output stays machine readable
fn init_cli_tracing(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("dairy_waste_guard={},waste_guard={}", level, level));
    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_as_of(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| format!("'{}' is neither YYYY-MM-DD nor an RFC 3339 time", value))
}

fn open_inventory(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("cannot read inventory file '{}'", path.display()))
}

async fn handle_assess(cfg: &AppConfig, args: AssessArgs, json: bool) -> Result<()> {
    let service = WasteGuardService::from_config(cfg)?;
    let file = open_inventory(&args.file)?;
    let now = args.as_of.unwrap_or_else(Utc::now);
    debug!(as_of = %now, channels = ?service.channel_names(), "assessing inventory file");

    let mut session = AlertSession::new();
    let outcome = service
        .process_upload_at(file, args.notify, &mut session, now)
        .await
        .with_context(|| format!("cannot parse inventory file '{}'", args.file.display()))?;

    let report_path = match &args.report {
        Some(path) => {
            report::save_risky_report(path, &outcome.batch, &outcome.assessment)
                .with_context(|| format!("cannot write report '{}'", path.display()))?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let summary = summarize(&outcome, &session, args.preview, report_path);
    if json {
        print_json(&summary)?;
    } else {
        render_summary(&summary);
        if args.notify && !outcome.assessment.has_risk() {
            println!("No items near expiry; no alert sent.");
        }
    }
    Ok(())
}

fn summarize<'a>(
    outcome: &'a UploadOutcome,
    session: &'a AlertSession,
    preview: usize,
    report_path: Option<String>,
) -> AssessSummary<'a> {
    AssessSummary {
        batch_id: outcome.batch.id,
        total_items: outcome.assessment.total_count,
        risky_count: outcome.assessment.risky_count(),
        risk_score: outcome.assessment.risk_score,
        preview: outcome
            .batch
            .iter()
            .take(preview)
            .map(PreviewRow::from)
            .collect(),
        warnings: outcome
            .batch
            .warnings
            .iter()
            .map(|w| w.to_string())
            .collect(),
        risky_items: &outcome.assessment.risky_rows,
        deliveries: &outcome.deliveries,
        last_alert: session.last_alert(),
        report_path,
    }
}

async fn handle_ask(cfg: &AppConfig, args: AskArgs, json: bool) -> Result<()> {
    let file = open_inventory(&args.file)?;
    let service = WasteGuardService::from_config(cfg)?;
    let batch: InventoryBatch = service
        .evaluate(file)
        .with_context(|| format!("cannot parse inventory file '{}'", args.file.display()))?
        .batch;

    let Some(client) = GeminiClient::from_config(&cfg.ai)? else {
        eprintln!("AI insights are not configured; set GEMINI_API_KEY or APP__AI__API_KEY.");
        return Ok(());
    };

    match insights::ask_question(&client, &args.question, &batch).await {
        Ok(insight) if json => print_json(&insight)?,
        Ok(insight) => render_insight(&insight),
        Err(e) => eprintln!("AI request failed: {}", e),
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_summary(summary: &AssessSummary<'_>) {
    println!(
        "Batch {} • {} item(s) • {} near expiry • risk score {}",
        summary.batch_id, summary.total_items, summary.risky_count, summary.risk_score
    );

    if !summary.preview.is_empty() {
        println!("Preview:");
        for row in &summary.preview {
            render_preview_row(row);
        }
    }

    for warning in &summary.warnings {
        println!("warning: {}", warning);
    }

    if summary.risky_items.is_empty() {
        println!("No items within the risk window.");
    } else {
        println!("Items near expiry:");
        for row in summary.risky_items {
            render_preview_row(&PreviewRow::from(row));
        }
    }

    if let Some(alert) = summary.last_alert {
        println!("{}", last_alert_line(alert));
        for delivery in &alert.deliveries {
            render_delivery(delivery);
        }
    }

    if let Some(path) = &summary.report_path {
        println!("Report written to {}", path);
    }
}

fn render_preview_row(row: &PreviewRow<'_>) {
    println!(
        "  • {} • qty {} • {} day(s) left • price {}",
        row.product.unwrap_or("<no-product>"),
        row.quantity.map(|q| q.to_string()).unwrap_or_else(|| "-".into()),
        row.days_remaining,
        row.price.as_deref().unwrap_or("-"),
    );
}

fn last_alert_line(alert: &AlertRecord) -> String {
    let outcome = if alert.any_delivered() {
        "delivered"
    } else {
        "not delivered"
    };
    format!(
        "Last alert: {} ({})",
        alert.time.to_rfc3339_opts(SecondsFormat::Secs, true),
        outcome
    )
}

fn render_delivery(delivery: &DeliveryReport) {
    let state = if delivery.delivered { "sent" } else { "failed" };
    println!("- Alert via {} {}: {}", delivery.channel, state, delivery.detail);
}

fn render_insight(insight: &Insight) {
    match &insight.report {
        Some(report) => {
            println!("Summary: {}", report.summary);
            if let Some(score) = report.risk_score {
                println!("Model risk score: {}", score);
            }
            if let Some(action) = &report.recommended_action {
                println!("Recommended action: {}", action);
            }
            for field in &report.key_fields {
                println!("  • {} = {} ({})", field.field_name, field.value, field.reason);
            }
        }
        None => match &insight.json {
            Some(value) => println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_else(|_| insight.raw.clone())
            ),
            None => println!("{}", insight.raw),
        },
    }
}
