//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tessera_core::{
    BatchId, BatchReport, ComponentId, DescriptorTable, DescriptorView, Document, Manager,
    Scanner, TesseraError,
};
use tokio::task::LocalSet;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum HTML input size (16 MB).
const MAX_INPUT_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TesseraError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TesseraError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TesseraError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, TesseraError> {
    let canonical = path.canonicalize().map_err(|e| {
        TesseraError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TesseraError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TesseraError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TesseraError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TesseraError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TesseraError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Read and parse an HTML file.
fn load_document(path: &Path) -> Result<Document, TesseraError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_INPUT_FILE_SIZE)?;
    let html = std::fs::read_to_string(&validated)
        .map_err(|e| TesseraError::IoError(format!("Read file: {}", e)))?;
    Ok(Document::parse_html(&html))
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Flags of the `run` command.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Where to write the resulting document.
    pub output: Option<PathBuf>,
    /// Prune components detached during the run.
    pub prune: bool,
    /// Print JSON instead of text.
    pub json_mode: bool,
    /// Print per-component details.
    pub verbose: bool,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// The initial batch; nested batches are awaited by the components that started them.
    pub report: BatchReport,
    /// Every tracked component after the run.
    pub descriptors: Vec<DescriptorView>,
    /// Components dropped by `--prune`.
    pub pruned: Vec<ComponentId>,
    /// The resulting document.
    #[serde(skip)]
    pub html: String,
}

/// Scan `document` and drive every lifecycle to completion.
///
/// Batches run as local tasks, so the whole run happens inside its own
/// `LocalSet`.
pub async fn run_document(
    config: &AppConfig,
    document: Document,
    prune: bool,
) -> Result<RunOutcome, TesseraError> {
    let registry = config.registry()?;
    let scheduler = config.scheduler.clone();

    let outcome = LocalSet::new()
        .run_until(async move {
            let manager = Manager::new(document, registry, scheduler);
            let root = manager.document().borrow().root();

            let report = manager.scan(root).await;
            let pruned = if prune { manager.prune() } else { Vec::new() };
            let html = manager.document().borrow().to_html(root);

            RunOutcome {
                report: (*report).clone(),
                descriptors: manager.descriptors(),
                pruned,
                html,
            }
        })
        .await;
    Ok(outcome)
}

/// Run every component lifecycle over an HTML file.
pub async fn cmd_run(
    config: &AppConfig,
    input: &Path,
    options: &RunOptions,
) -> Result<(), TesseraError> {
    tracing::info!("Running components over {:?}", input);

    let document = load_document(input)?;
    let outcome = run_document(config, document, options.prune).await?;

    if let Some(output) = &options.output {
        let target = validate_output_path(output)?;
        std::fs::write(&target, &outcome.html)
            .map_err(|e| TesseraError::IoError(format!("Write file: {}", e)))?;
        tracing::info!("Wrote resulting document to {:?}", target);
    }

    if options.json_mode {
        print_json(&outcome);
        return Ok(());
    }

    let report = &outcome.report;
    println!("Tessera Run");
    println!("===========");
    println!("Input:      {}", input.display());
    println!("Batch:      {}", report.batch.0);
    println!("Discovered: {}", report.discovered.len());
    println!("Entered:    {}", report.entered.len());
    println!("Tracked:    {}", outcome.descriptors.len());
    if options.prune {
        println!("Pruned:     {}", outcome.pruned.len());
    }
    println!("Errors:     {}", report.errors.len());

    for error in &report.errors {
        println!("  - {}", error);
    }

    if options.verbose {
        println!();
        print_descriptors(&outcome.descriptors);
    }

    Ok(())
}

fn print_descriptors(descriptors: &[DescriptorView]) {
    println!("Components:");
    for view in descriptors {
        let state = match (view.failed, view.entered) {
            (Some(phase), _) => format!("failed in {phase}"),
            (None, true) => "entered".to_string(),
            (None, false) if view.init_done => "initialized".to_string(),
            (None, false) if view.ready_done => "ready".to_string(),
            (None, false) => "discovered".to_string(),
        };
        let indent = "  ".repeat(view.depth.saturating_add(1));
        println!(
            "{}{} {} (node {}, batch {}) {}",
            indent, view.id, view.name, view.node, view.batch.0, state
        );
    }
}

// =============================================================================
// DISCOVER COMMAND
// =============================================================================

/// Result of a dry scan.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoverOutcome {
    /// Components a scan would create.
    pub descriptors: Vec<DescriptorView>,
    /// Scan errors.
    pub errors: Vec<TesseraError>,
}

/// Scan without running any phase.
pub fn discover_document(
    config: &AppConfig,
    document: &Document,
) -> Result<DiscoverOutcome, TesseraError> {
    let registry = config.registry()?;
    let mut table = DescriptorTable::new(config.scheduler.id_prefix.clone());
    let discovery = Scanner::new(
        document,
        document.root(),
        &registry,
        &mut table,
        &config.scheduler,
        BatchId::default(),
    )
    .into_discovery();

    Ok(DiscoverOutcome {
        descriptors: discovery
            .descriptors
            .iter()
            .filter_map(|&key| table.view(key))
            .collect(),
        errors: discovery.errors,
    })
}

/// List the components an HTML file would create.
pub fn cmd_discover(config: &AppConfig, input: &Path, json_mode: bool) -> Result<(), TesseraError> {
    let document = load_document(input)?;
    let outcome = discover_document(config, &document)?;

    if json_mode {
        print_json(&outcome);
        return Ok(());
    }

    println!("Tessera Discovery");
    println!("=================");
    println!("Input:  {}", input.display());
    println!("Found:  {}", outcome.descriptors.len());
    println!("Errors: {}", outcome.errors.len());
    for error in &outcome.errors {
        println!("  - {}", error);
    }
    println!();
    print_descriptors(&outcome.descriptors);

    Ok(())
}

// =============================================================================
// COMPONENTS COMMAND
// =============================================================================

/// List the registry.
pub fn cmd_components(config: &AppConfig, json_mode: bool) -> Result<(), TesseraError> {
    let entries = config.entries();

    if json_mode {
        print_json(&serde_json::json!({
            "scheduler": config.scheduler,
            "components": entries,
        }));
        return Ok(());
    }

    println!("Tessera Components");
    println!("==================");
    println!("Marker attribute: {}", config.scheduler.component_attribute);
    println!("Config attribute: {}", config.scheduler.config_attribute);
    match config.scheduler.phase_timeout_ms {
        Some(ms) => println!("Phase timeout:    {} ms", ms),
        None => println!("Phase timeout:    none"),
    }
    println!();
    for entry in &entries {
        println!(
            "  {:<16} {:<10} {} directive(s)",
            entry.name,
            entry.kind.name(),
            entry.config.len()
        );
    }

    Ok(())
}
