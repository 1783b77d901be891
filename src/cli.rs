//! Command line surface

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::account::{cache_scope, effective_budget, AccountService, LocalAccount};
use crate::cache::ClassificationCache;
use crate::categories::CategorySet;
use crate::classify::FastEmbedModel;
use crate::config::Settings;
use crate::error::{FolioError, Result};
use crate::extract::DocumentParser;
use crate::mover::{apply_plan, FsMover};
use crate::orchestrator::{OrganizePlan, Orchestrator, OrchestratorOptions, RunRequest};
use crate::progress::ProgressEvent;
use crate::remote::{HttpRemoteClassifier, RemoteGateway, RetryPolicy};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Sort documents into category folders by content")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show where each file would go, without moving anything
    Preview(RunArgs),

    /// Classify files and move them into category folders
    Organize(RunArgs),

    /// Ask the remote service for a category description
    Describe(DescribeArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Folder whose files should be organized
    pub folder: PathBuf,

    /// Use the remote classifier while credits last
    #[arg(long)]
    pub remote: bool,

    /// Cap on remote classifications for this run (defaults to all credits)
    #[arg(long)]
    pub budget: Option<u32>,

    /// JSON file mapping category names to descriptions
    #[arg(long)]
    pub categories: Option<PathBuf>,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DescribeArgs {
    /// Category name
    pub name: String,
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load();
    crate::init_tracing();
    let settings = settings?;

    match cli.command {
        Commands::Preview(args) => {
            let plan = preview(&settings, &args).await?;
            print_plan(&plan, args.json)
        }
        Commands::Organize(args) => {
            let plan = preview(&settings, &args).await?;
            print_plan(&plan, args.json)?;

            let report = apply_plan(&args.folder, &plan, &FsMover, &print_progress);
            eprintln!(
                "Moved {} files ({} left in place, {} failed)",
                report.moved, report.skipped, report.failed
            );
            Ok(())
        }
        Commands::Describe(args) => {
            let gateway = remote_gateway(&settings)?.ok_or_else(|| {
                FolioError::Config("FOLIO_REMOTE_URL and FOLIO_REMOTE_KEY must be set".to_string())
            })?;
            let description = gateway.describe_category(&args.name).await?;
            println!("{}", description);
            Ok(())
        }
    }
}

fn remote_gateway(settings: &Settings) -> Result<Option<RemoteGateway>> {
    let Some(client) = HttpRemoteClassifier::from_settings(settings)? else {
        return Ok(None);
    };
    Ok(Some(RemoteGateway::new(
        Arc::new(client),
        RetryPolicy::from_settings(settings),
        settings.default_confidence,
    )))
}

fn load_categories(path: Option<&Path>) -> Result<CategorySet> {
    match path {
        Some(path) => {
            let mut set = CategorySet::load_json(path)?;
            set.ensure_essentials();
            Ok(set)
        }
        None => Ok(CategorySet::defaults()),
    }
}

async fn preview(settings: &Settings, args: &RunArgs) -> Result<OrganizePlan> {
    let categories = load_categories(args.categories.as_deref())?;

    let account = LocalAccount::new(settings.credits);
    let scope = cache_scope(account.identity().await.as_deref());
    let credits = account.remaining_credits().await?;
    let (remote_enabled, budget) = effective_budget(args.remote, credits);
    let budget = args.budget.map_or(budget, |cap| cap.min(budget));

    if args.remote && !remote_enabled {
        tracing::warn!("No credits left, classifying locally");
    }

    // Fail before touching any file if the model cannot load
    let model = Arc::new(FastEmbedModel::new()?);

    let mut orchestrator = Orchestrator::new(
        model,
        Arc::new(document_parser(settings)),
        ClassificationCache::new(&settings.data_dir),
    )
    .with_options(OrchestratorOptions::from_settings(settings));
    if let Some(gateway) = remote_gateway(settings)? {
        orchestrator = orchestrator.with_remote(gateway);
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(event);
        }
    });

    let mut request = RunRequest::new(&args.folder, &categories, &scope);
    if remote_enabled && budget > 0 {
        request = request.with_remote(budget);
    }
    let result = orchestrator.run(request, &tx).await;

    drop(tx);
    join_printer(printer).await;

    let plan = result?;
    if plan.remote_calls_used > 0 {
        account.debit(plan.remote_calls_used).await?;
    }
    Ok(plan)
}

/// Parser with tesseract OCR when it can be loaded
#[cfg(feature = "ocr")]
fn document_parser(settings: &Settings) -> DocumentParser {
    let ocr = crate::extract::LeptessOcr::from_settings(settings);
    match ocr.ensure_available() {
        Ok(()) => {
            tracing::info!("[Cli] OCR enabled ({})", ocr.language());
            DocumentParser::with_ocr(Arc::new(ocr))
        }
        Err(e) => {
            tracing::warn!("[Cli] OCR unavailable, images will be unprocessable: {}", e);
            DocumentParser::new()
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn document_parser(_settings: &Settings) -> DocumentParser {
    tracing::debug!("[Cli] Built without the ocr feature");
    DocumentParser::new()
}

/// Wait for the progress printer; `false` if it panicked or was cancelled
async fn join_printer(printer: tokio::task::JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("[Cli] Progress printer stopped early: {}", e);
            false
        }
    }
}

fn print_progress(event: ProgressEvent) {
    eprintln!(
        "[{}/{}] {}",
        event.current,
        event.total,
        event.current_file.unwrap_or_default()
    );
}

fn print_plan(plan: &OrganizePlan, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(plan)?);
        return Ok(());
    }

    for record in &plan.records {
        println!(
            "{:>4}  {:<40}  {:<24}  {}{}",
            record.sequence_index,
            record.filename,
            record.category,
            record.method,
            if record.extension_redirect { " (by extension)" } else { "" }
        );
    }

    println!();
    for (category, files) in &plan.grouping {
        println!("{} ({})", category, files.len());
    }
    println!("Remote classifications used: {}", plan.remote_calls_used);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_printer_reports_a_panicked_printer() {
        let finished = tokio::spawn(async {});
        assert!(join_printer(finished).await);

        let panicked = tokio::spawn(async { panic!("printer died") });
        assert!(!join_printer(panicked).await);
    }

    #[cfg(not(feature = "ocr"))]
    #[test]
    fn test_parser_without_ocr_feature() {
        let parser = document_parser(&Settings::default());
        assert!(!parser.is_supported("png"));
        assert!(parser.is_supported("pptx"));
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn test_parser_falls_back_when_ocr_cannot_load() {
        let settings = Settings {
            ocr_language: "zz-not-a-language".to_string(),
            ..Settings::default()
        };
        assert!(!document_parser(&settings).is_supported("png"));
    }
}
