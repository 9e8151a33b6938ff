use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mdm_inventory::cli_style::{
    get_styles, print_empty_list, print_error, print_key_value, print_section_header,
    print_success, print_warning, TableBuilder,
};
use mdm_inventory::config::{AppConfig, CliConfig, FileConfig};
use mdm_inventory::inventory::{ContentEdit, ItemKind, RunRecord};
use mdm_inventory::inventory_store::{InventoryStore, ItemFilter};
use mdm_inventory::report::{export_content, write_report, InventoryReport, ReportFormat};
use mdm_inventory::session::Session;
use mdm_inventory::sync::InventoryOptions;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(
    name = "inventory-sync",
    version,
    about = "Inventory device-management configuration objects",
    styles = get_styles()
)]
struct CliArgs {
    /// Directory holding the inventory files.
    #[clap(long, global = true, value_parser = parse_path)]
    pub storage_root: Option<PathBuf>,

    /// Path to a TOML config file. Its values override command-line flags.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory (tenant) id for the client-credentials grant.
    #[clap(long, global = true)]
    pub tenant_id: Option<String>,

    /// Application (client) id for the client-credentials grant.
    #[clap(long, global = true)]
    pub client_id: Option<String>,

    /// Client secret for the client-credentials grant.
    #[clap(long, global = true, env = "INVENTORY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Pre-issued bearer token, used instead of client credentials.
    #[clap(long, global = true)]
    pub access_token: Option<String>,

    /// API root URL.
    #[clap(long, global = true)]
    pub graph_url: Option<String>,

    /// Timeout in seconds for each API request.
    #[clap(long, global = true, default_value_t = 100)]
    pub request_timeout_sec: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Application,
    Script,
    Remediation,
    All,
}

impl KindArg {
    fn kinds(self) -> Vec<ItemKind> {
        match self {
            KindArg::Application => vec![ItemKind::Application],
            KindArg::Script => vec![ItemKind::Script],
            KindArg::Remediation => vec![ItemKind::Remediation],
            KindArg::All => ItemKind::ALL.to_vec(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch objects from the API and store them.
    Inventory {
        #[clap(value_enum)]
        kind: KindArg,
        /// Clear the stored collection before writing.
        #[clap(long)]
        force: bool,
        /// Fetch each script's source.
        #[clap(long)]
        include_content: bool,
        /// Fetch each object's assignments.
        #[clap(long)]
        include_assignments: bool,
    },
    /// List stored objects of one kind.
    List {
        #[clap(value_enum)]
        kind: ItemKind,
        #[clap(long)]
        name_contains: Option<String>,
        /// Only objects with script content.
        #[clap(long)]
        with_content: bool,
    },
    /// Show one stored object with its assignments and content.
    Show {
        #[clap(value_enum)]
        kind: ItemKind,
        id: String,
    },
    /// Manage script content.
    Content {
        #[command(subcommand)]
        action: ContentCommand,
    },
    /// Delete an object together with its assignments and content history.
    Delete {
        #[clap(value_enum)]
        kind: ItemKind,
        id: String,
    },
    /// Remove every stored object of one kind.
    Clear {
        #[clap(value_enum)]
        kind: ItemKind,
    },
    /// List inventory runs, newest first.
    Runs {
        #[clap(long, value_enum)]
        kind: Option<ItemKind>,
        #[clap(long, default_value_t = 20)]
        limit: usize,
        /// Mark runs left running by a crashed process as failed first.
        #[clap(long)]
        reap_stale: bool,
    },
    /// Print store totals.
    Summary,
    /// Write an inventory report.
    Report {
        #[clap(long, value_enum, default_value = "table")]
        format: ReportFormat,
        /// Write here instead of the store's reports directory.
        #[clap(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ContentCommand {
    /// Add a new content version from a file.
    Add {
        #[clap(value_enum)]
        kind: ItemKind,
        id: String,
        /// File holding the script source.
        #[clap(long)]
        file: PathBuf,
        /// Author recorded in the history. Defaults to the current user.
        #[clap(long)]
        added_by: Option<String>,
        #[clap(long)]
        comment: Option<String>,
        /// Defaults to the next sequence number.
        #[clap(long)]
        version: Option<String>,
    },
    /// Show the content history of an object, newest first.
    History {
        #[clap(value_enum)]
        kind: ItemKind,
        id: String,
    },
    /// Write stored content to the source-code directory.
    Export {
        #[clap(long, value_enum)]
        kind: Option<ItemKind>,
    },
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn format_time(time: chrono::DateTime<chrono::Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn print_run(run: &RunRecord) {
    print_section_header(&format!("{} inventory", run.run_type));
    print_key_value("Run", &run.id);
    print_key_value("Status", run.status.as_str());
    print_key_value("Processed", &run.items_processed.to_string());
    print_key_value("Errors", &run.error_count.to_string());
    if let Some(duration) = run.duration() {
        print_key_value("Duration", &format!("{}ms", duration.num_milliseconds()));
    }
    for message in &run.error_messages {
        print_warning(message);
    }
}

fn run_inventory(
    config: AppConfig,
    kind: KindArg,
    force: bool,
    include_content: bool,
    include_assignments: bool,
) -> Result<()> {
    let mut session = Session::connect(config)?;
    let defaults = InventoryOptions::from(&session.config().sync);
    let options = InventoryOptions {
        force,
        include_content: include_content || defaults.include_content,
        include_assignments: include_assignments || defaults.include_assignments,
    };

    let result = {
        let orchestrator = session.orchestrator(options)?;
        kind.kinds().into_iter().try_for_each(|kind| {
            let run = orchestrator.run(kind)?;
            print_run(&run);
            Ok::<(), anyhow::Error>(())
        })
    };
    session.disconnect();
    result
}

fn run_content(session: &Session, action: ContentCommand) -> Result<()> {
    let store = session.store();
    match action {
        ContentCommand::Add {
            kind,
            id,
            file,
            added_by,
            comment,
            version,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let entry = store.add_content(
                kind,
                &id,
                ContentEdit {
                    content,
                    added_by: added_by.unwrap_or_else(current_user),
                    comment,
                    version,
                },
            )?;
            print_success(&format!(
                "Added version {} to {} {}",
                entry.version, kind, id
            ));
        }
        ContentCommand::History { kind, id } => {
            let history = store.content_history(kind, &id)?;
            if history.is_empty() {
                print_empty_list("No content history");
                return Ok(());
            }
            let mut table =
                TableBuilder::new(vec!["Version", "Added by", "Added at", "Size", "Comment"]);
            for entry in history {
                table.add_row(vec![
                    entry.version,
                    entry.added_by,
                    format_time(entry.added_at),
                    format!("{} B", entry.content.len()),
                    entry.comment.unwrap_or_default(),
                ]);
            }
            table.print();
        }
        ContentCommand::Export { kind } => {
            let kinds: Vec<ItemKind> = match kind {
                Some(kind) => vec![kind],
                None => ItemKind::ALL
                    .into_iter()
                    .filter(|k| k.carries_content())
                    .collect(),
            };
            for kind in kinds {
                let written = export_content(store, kind, &store.source_code_dir())?;
                print_success(&format!("Exported {} {} file(s)", written.len(), kind));
            }
        }
    }
    Ok(())
}

fn run_command(config: AppConfig, command: Command) -> Result<()> {
    match command {
        Command::Inventory {
            kind,
            force,
            include_content,
            include_assignments,
        } => run_inventory(config, kind, force, include_content, include_assignments),
        other => run_offline(&Session::open(config)?, other),
    }
}

/// Commands that only touch the local store.
fn run_offline(session: &Session, command: Command) -> Result<()> {
    let store = session.store();

    match command {
        Command::Inventory { .. } => bail!("inventory needs a connected session"),
        Command::List {
            kind,
            name_contains,
            with_content,
        } => {
            let filter = ItemFilter {
                name_contains,
                has_content: with_content.then_some(true),
                ..Default::default()
            };
            let records = store.list(kind, &filter)?;
            if records.is_empty() {
                print_empty_list(&format!("No {} records", kind));
                return Ok(());
            }
            let mut table = TableBuilder::new(vec!["Id", "Name", "Content", "Last updated"]);
            for record in records {
                table.add_row(vec![
                    record.id,
                    record.display_name,
                    if record.has_content { "yes" } else { "no" }.to_string(),
                    record.last_updated.map(format_time).unwrap_or_default(),
                ]);
            }
            table.print();
        }
        Command::Show { kind, id } => {
            let record = store.get(kind, &id)?;
            print_section_header(&format!("{} {}", kind, record.display_name));
            print_key_value("Id", &record.id);
            print_key_value("Last seen", &format_time(record.last_seen_at));
            if let Some(updated) = record.last_updated {
                print_key_value("Last updated", &format_time(updated));
            }
            if let Some(run_id) = &record.run_id {
                print_key_value("Run", run_id);
            }
            for (key, value) in &record.metadata {
                let value = match value.as_str() {
                    Some(s) => s.to_string(),
                    None => value.to_string(),
                };
                print_key_value(key, &value);
            }

            let assignments = store.list_assignments(kind, &id)?;
            print_section_header("Assignments");
            if assignments.is_empty() {
                print_empty_list("Not assigned");
            }
            for assignment in assignments {
                let label = match &assignment.intent {
                    Some(intent) => format!("{} ({})", assignment.target_label(), intent),
                    None => assignment.target_label(),
                };
                print_key_value(assignment.target_kind.as_str(), &label);
            }

            if let Some(content) = &record.content {
                print_section_header("Content");
                println!("{}", content);
            }
        }
        Command::Content { action } => run_content(session, action)?,
        Command::Delete { kind, id } => {
            store.delete(kind, &id)?;
            print_success(&format!("Deleted {} {}", kind, id));
        }
        Command::Clear { kind } => {
            let removed = store.clear_collection(kind)?;
            print_success(&format!("Removed {} {} record(s)", removed, kind));
        }
        Command::Runs {
            kind,
            limit,
            reap_stale,
        } => {
            if reap_stale {
                let marked = store.mark_stale_runs_failed()?;
                print_success(&format!("Marked {} stale run(s) as failed", marked));
            }
            let runs = store.list_runs(kind, limit)?;
            if runs.is_empty() {
                print_empty_list("No runs recorded");
                return Ok(());
            }
            let mut table = TableBuilder::new(vec![
                "Id", "Kind", "Status", "Started", "Duration", "Processed", "Errors",
            ]);
            for run in runs {
                table.add_row(vec![
                    run.id.clone(),
                    run.run_type.to_string(),
                    run.status.as_str().to_string(),
                    format_time(run.started_at),
                    run.duration()
                        .map(|d| format!("{}ms", d.num_milliseconds()))
                        .unwrap_or_default(),
                    run.items_processed.to_string(),
                    run.error_count.to_string(),
                ]);
            }
            table.print();
        }
        Command::Summary => {
            let summary = store.summary()?;
            let metadata = store.metadata()?;
            print_section_header("Inventory summary");
            print_key_value("Storage root", &store.root().display().to_string());
            print_key_value("Last modified", &format_time(metadata.last_modified));
            for (kind, counts) in &summary.collections {
                print_key_value(
                    &kind.to_string(),
                    &format!(
                        "{} record(s), {} with content, {} assignment(s), {} history entries",
                        counts.records,
                        counts.with_content,
                        counts.assignments,
                        counts.history_entries
                    ),
                );
            }
            print_key_value("Runs", &summary.runs.to_string());
            if let Some(run) = &summary.last_run {
                print_key_value(
                    "Last run",
                    &format!(
                        "{} {} at {}",
                        run.run_type,
                        run.status.as_str(),
                        format_time(run.started_at)
                    ),
                );
            }
            if summary.orphaned_assignments > 0 || summary.orphaned_history_entries > 0 {
                print_warning(&format!(
                    "{} orphaned assignment(s) and {} orphaned history entries; re-inventory the cleared kinds to re-attach them",
                    summary.orphaned_assignments, summary.orphaned_history_entries
                ));
            }
        }
        Command::Report { format, output } => {
            let report = InventoryReport::build(store)?;
            let path = match output {
                Some(path) => {
                    std::fs::write(&path, report.render(format)?)
                        .with_context(|| format!("Failed to write report {:?}", path))?;
                    path
                }
                None => write_report(&report, format, &store.reports_dir())?,
            };
            print_success(&format!("Report written to {}", path.display()));
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        storage_root: cli_args.storage_root,
        tenant_id: cli_args.tenant_id,
        client_id: cli_args.client_id,
        client_secret: cli_args.client_secret,
        access_token: cli_args.access_token,
        graph_base_url: cli_args.graph_url,
        request_timeout_sec: cli_args.request_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    run_command(config, cli_args.command)
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}
