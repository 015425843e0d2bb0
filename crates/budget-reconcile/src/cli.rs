use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;

use crate::change_log::ChangeKind;
use crate::config::ReconcileOptions;
use crate::output::write_output_atomically;
use crate::workbook::{output_file_name, ReconcileReport, WorkbookAssembler};

/// Exit status when an input workbook is missing.
pub const EXIT_MISSING_INPUT: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "budget-reconcile",
    about = "Merge committed values and monthly payments from an update workbook into a budget workbook."
)]
pub struct Args {
    /// Budget workbook to update.
    pub base: PathBuf,

    /// Workbook exported with the latest committed values and payments.
    pub update: PathBuf,

    /// Output path (default: `<base>_atualizada.<ext>` next to the base workbook).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// JSON file with `ReconcileOptions`. Missing fields keep their defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Sheet to reconcile (default: the workbook's active tab). Overrides the config file.
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Report format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Reconcile and report without writing the output workbook.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
struct JsonCounts {
    committed: usize,
    payments: usize,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    base: String,
    update: String,
    output: Option<String>,
    dry_run: bool,
    sheet: &'a str,
    log_sheet: &'a str,
    log_sheet_created: bool,
    counts: JsonCounts,
    report: &'a ReconcileReport,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let code = run_with_args(args)?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Run one reconciliation. Returns the process exit status.
pub fn run_with_args(args: Args) -> Result<i32> {
    let missing: Vec<&Path> = [args.base.as_path(), args.update.as_path()]
        .into_iter()
        .filter(|p| !p.is_file())
        .collect();
    if !missing.is_empty() {
        for path in &missing {
            eprintln!("missing input workbook: {}", path.display());
        }
        eprintln!("Both the base workbook and the update workbook are required; nothing was written.");
        return Ok(EXIT_MISSING_INPUT);
    }

    let mut options = match &args.config {
        Some(path) => ReconcileOptions::from_json_path(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => ReconcileOptions::default(),
    };
    if let Some(sheet) = &args.sheet {
        options.primary_sheet = Some(sheet.clone());
    }
    let assembler = WorkbookAssembler::new(options)?;

    let base = std::fs::read(&args.base)
        .with_context(|| format!("read base workbook {}", args.base.display()))?;
    let update = std::fs::read(&args.update)
        .with_context(|| format!("read update workbook {}", args.update.display()))?;

    if args.format == OutputFormat::Text {
        eprintln!("Processing workbooks; this can take a while for large exports...");
    }
    let result = assembler
        .reconcile(&base, &update)
        .with_context(|| format!("reconcile {}", args.base.display()))?;

    let output_path = if args.dry_run {
        None
    } else {
        let path = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&args.base));
        write_output_atomically(&path, &result.bytes)
            .with_context(|| format!("write {}", path.display()))?;
        Some(path)
    };

    let report = &result.report;
    match args.format {
        OutputFormat::Text => print_text_report(&args, report, output_path.as_deref()),
        OutputFormat::Json => {
            let json_report = JsonReport {
                base: args.base.to_string_lossy().into_owned(),
                update: args.update.to_string_lossy().into_owned(),
                output: output_path
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned()),
                dry_run: args.dry_run,
                sheet: &report.primary_sheet,
                log_sheet: &report.log_sheet,
                log_sheet_created: report.log_sheet_created,
                counts: JsonCounts {
                    committed: report.committed_changes,
                    payments: report.payment_changes,
                },
                report,
            };

            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer(&mut handle, &json_report)?;
            handle.write_all(b"\n")?;
        }
    }

    Ok(0)
}

fn default_output_path(base: &Path) -> PathBuf {
    let name = output_file_name(&base.to_string_lossy());
    base.with_file_name(name)
}

fn print_text_report(args: &Args, report: &ReconcileReport, output: Option<&Path>) {
    println!("Budget reconciliation report");
    println!("  base:      {}", args.base.display());
    println!("  update:    {}", args.update.display());
    println!("  sheet:     {}", report.primary_sheet);
    println!(
        "  log sheet: {}{}",
        report.log_sheet,
        if report.log_sheet_created { " (created)" } else { "" }
    );
    println!();

    let stats = &report.stats;
    println!(
        "Update rows: read={} subtotal={} blank={}",
        stats.rows_read, stats.subtotal_rows, stats.blank_rows
    );
    println!(
        "Skipped: empty-key={} empty-value={} malformed-date={} invalid-amount={}",
        stats.empty_keys, stats.empty_committed_values, stats.malformed_dates, stats.invalid_amounts
    );
    for collision in &report.collisions {
        println!(
            "Key collision: {} <- {}",
            collision.key,
            collision.identifiers.join(", ")
        );
    }
    println!();

    if report.entries.is_empty() {
        println!("No changes.");
    } else {
        println!(
            "Summary: committed={} payments={}",
            report.committed_changes, report.payment_changes
        );
        for entry in &report.entries {
            let field = match entry.kind {
                ChangeKind::Empenho => entry.field.clone(),
                ChangeKind::Pagamento => format!("{} ({})", entry.field, entry.cell),
            };
            println!(
                "  {} {} {}: {} -> {}",
                entry.kind,
                entry.key,
                field,
                entry.old_value.display_text(),
                entry.new_value.display_text()
            );
        }
    }
    println!();

    match output {
        Some(path) => eprintln!("Workbook updated successfully: {}", path.display()),
        None => eprintln!("Dry run; no workbook written."),
    }
}
