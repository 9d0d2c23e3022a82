//! codemap CLI - repository indexing, incremental re-indexing, impact
//! analysis, and safe multi-file changeset application.

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Identical input yields byte-for-byte identical output

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use codemap_core::config;
use codemap_core::incremental;
use codemap_core::model::Id;
use codemap_core::snapshot_store::{JsonSnapshotStore, PersistedSnapshot, SnapshotStore};
use codemap_core::vcs::{GitVcs, VcsCollaborator};
use codemap_core::{changeset, graph, impact, orchestrator};

#[derive(Parser)]
#[command(name = "codemap")]
#[command(about = "Repository indexer, impact analyzer, and changeset applier")]
#[command(version = env!("CODEMAP_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fresh snapshot of a project (full or incremental)
    Index {
        /// Path to the project root
        path: PathBuf,

        /// Base snapshot id to carry forward unchanged files from
        #[arg(long)]
        base: Option<String>,

        /// Commit SHA to record against the snapshot
        #[arg(long)]
        commit: Option<String>,

        /// Branch name to record against the snapshot
        #[arg(long)]
        branch: Option<String>,

        /// Path to config file (default: auto-discover)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compute what changed between a fresh scan and a base snapshot
    Diff {
        /// Path to the project root
        path: PathBuf,

        /// Base snapshot id (or path to its persisted JSON file)
        #[arg(long)]
        base: String,
    },
    /// Analyze the blast radius of a set of changed symbols or files
    Impact {
        /// Path to the project root (the snapshot store lives under .codemap/)
        path: PathBuf,

        /// Snapshot id to analyze against
        #[arg(long)]
        snapshot: String,

        /// Changed symbol ids
        #[arg(long = "symbols", value_delimiter = ',')]
        symbols: Vec<String>,

        /// Changed file paths (relative to the project root); every symbol
        /// defined in these files seeds the impact analysis
        #[arg(long = "files", value_delimiter = ',')]
        files: Vec<String>,
    },
    /// Propose, apply, roll back, commit or delete a multi-file changeset
    Changeset {
        #[command(subcommand)]
        action: ChangesetAction,
    },
    /// Show or validate the resolved configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ChangesetAction {
    /// Propose a changeset from a JSON patch list (written as a new changeset id)
    Create {
        /// Path to the project root
        path: PathBuf,

        /// Snapshot id the changeset is proposed against
        #[arg(long)]
        snapshot: String,

        /// Short title for the changeset
        #[arg(long)]
        title: String,

        /// Rationale for the changeset
        #[arg(long)]
        rationale: Option<String>,

        /// JSON file with a `[{"file_path": "...", "new_content": "..."}]` list
        #[arg(long)]
        patches: PathBuf,

        /// Where to write the created changeset as JSON
        #[arg(long)]
        out: PathBuf,
    },
    /// Apply a proposed changeset's patches to disk
    Apply {
        /// Path to the project root
        path: PathBuf,

        /// Path to the changeset JSON file (read and rewritten in place)
        changeset: PathBuf,
    },
    /// Roll back an applied changeset's patches
    Rollback {
        /// Path to the project root
        path: PathBuf,

        /// Path to the changeset JSON file (read and rewritten in place)
        changeset: PathBuf,
    },
    /// Stage the changeset's files and record a commit via git
    Commit {
        /// Path to the project root (must be a git working tree)
        path: PathBuf,

        /// Path to the changeset JSON file (read and rewritten in place)
        changeset: PathBuf,

        /// Commit message
        #[arg(long)]
        message: String,

        /// Commit author, in "Name <email>" form
        #[arg(long)]
        author: Option<String>,
    },
    /// Delete a non-applied changeset
    Delete {
        /// Path to the changeset JSON file
        changeset: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to the project root (default: current directory)
        path: Option<PathBuf>,

        /// Path to config file (default: auto-discover from project root)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a config file without indexing anything
    Validate {
        /// Path to the project root (default: current directory)
        path: Option<PathBuf>,

        /// Path to config file (default: auto-discover from project root)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    install_tracing(cli.verbose);

    match cli.command {
        Commands::Index {
            path,
            base,
            commit,
            branch,
            config: config_path,
        } => run_index(&path, base, commit, branch, config_path.as_deref()),
        Commands::Diff { path, base } => run_diff(&path, &base),
        Commands::Impact {
            path,
            snapshot,
            symbols,
            files,
        } => run_impact(&path, &snapshot, symbols, files),
        Commands::Changeset { action } => run_changeset(action),
        Commands::Config { action } => run_config(action),
    }
}

fn install_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn normalize_path(path: &Path) -> anyhow::Result<PathBuf> {
    if path.is_relative() {
        Ok(std::env::current_dir()?.join(path))
    } else {
        Ok(path.to_path_buf())
    }
}

fn run_index(
    path: &Path,
    base: Option<String>,
    commit: Option<String>,
    branch: Option<String>,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let root = normalize_path(path)?;
    if !root.exists() {
        anyhow::bail!("path does not exist: {}", root.display());
    }

    let resolved = config::load_and_resolve(&root, config_path)
        .context("failed to load configuration")?;
    if let Some(ref p) = resolved.config_path {
        eprintln!("using config: {}", p.display());
    }

    let store = JsonSnapshotStore::new(&root);
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    let project = store
        .create_project(&project_name, Some(root.to_string_lossy().into_owned()))
        .context("failed to create project")?;

    if let Some(base_id) = &base {
        store
            .hydrate(base_id)
            .context("failed to load base snapshot for incremental indexing")?;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    spinner.set_message("indexing...");

    let snapshot_id = orchestrator::index_project(&store, project.id, &root, commit, branch, base.as_ref())
        .context("indexing failed")?;
    store
        .checkpoint(&snapshot_id)
        .context("failed to checkpoint snapshot to disk")?;

    spinner.finish_and_clear();

    let snapshot = store
        .get_snapshot(&snapshot_id)?
        .ok_or_else(|| anyhow::anyhow!("snapshot vanished after indexing"))?;
    println!("snapshot {}", snapshot.id);
    println!("  state:   {:?}", snapshot.state);
    println!("  files:   {}", snapshot.file_count);
    println!("  symbols: {}", snapshot.symbol_count);
    println!("  lines:   {}", snapshot.total_lines);
    println!("  path:    {}", store.snapshot_path(&snapshot.id).display());

    Ok(())
}

fn run_diff(path: &Path, base: &str) -> anyhow::Result<()> {
    let root = normalize_path(path)?;
    let store = JsonSnapshotStore::new(&root);

    let base_id: Id = base.to_string();
    // The base snapshot was checkpointed by an earlier process invocation;
    // pull it back into the live store so `compute_diff` can see its files.
    store.hydrate(&base_id).context("failed to load base snapshot")?;

    let scan_options = codemap_core::scanner::ScanOptions::default();
    let scanned_files = codemap_core::scanner::scan(&root, &scan_options)
        .context("failed to scan project")?;

    let diff = incremental::compute_diff(&store, scanned_files, Some(&base_id))
        .context("failed to compute incremental diff")?;

    println!("added:     {}", diff.added.len());
    for file in &diff.added {
        println!("  + {}", file.relpath);
    }
    println!("modified:  {}", diff.modified.len());
    for file in &diff.modified {
        println!("  ~ {}", file.relpath);
    }
    println!("deleted:   {}", diff.deleted_paths.len());
    for p in &diff.deleted_paths {
        println!("  - {p}");
    }
    println!("unchanged: {}", diff.unchanged_count);

    Ok(())
}

fn run_impact(path: &Path, snapshot_id: &str, symbols: Vec<String>, files: Vec<String>) -> anyhow::Result<()> {
    let root = normalize_path(path)?;
    let store = JsonSnapshotStore::new(&root);

    let snapshot_id: Id = snapshot_id.to_string();
    let persisted: PersistedSnapshot = store
        .load(&snapshot_id)
        .context("failed to load snapshot")?;

    let mut changed: Vec<Id> = symbols;
    if !files.is_empty() {
        let file_ids: Vec<&Id> = persisted
            .files
            .iter()
            .filter(|f| files.iter().any(|p| p == &f.path))
            .map(|f| &f.id)
            .collect();
        changed.extend(
            persisted
                .symbols
                .iter()
                .filter(|s| file_ids.contains(&&s.file_id))
                .map(|s| s.id.clone()),
        );
    }

    if changed.is_empty() {
        anyhow::bail!("no changed symbols or files specified; pass --symbols or --files");
    }

    let reference_graph = graph::ReferenceGraph::build(persisted.references);
    let report = impact::analyze_impact(&reference_graph, &changed, &persisted.symbols);

    println!("risk: {:?} - {}", report.risk_level, report.risk_explanation);
    println!("impacted symbols: {}", report.impacted_symbols.len());
    for impacted in &report.impacted_symbols {
        let name = persisted
            .symbols
            .iter()
            .find(|s| s.id == impacted.symbol_id)
            .map(|s| s.name.as_str())
            .unwrap_or("<unknown>");
        println!(
            "  {:?} (distance {}) {}",
            impacted.impact_type, impacted.distance, name
        );
    }
    println!("impacted files: {}", report.impacted_files.len());
    for impacted_file in impact::impacted_file_records(&report.impacted_files, &persisted.files) {
        println!("  {}", impacted_file.path);
    }

    Ok(())
}

fn run_changeset(action: ChangesetAction) -> anyhow::Result<()> {
    match action {
        ChangesetAction::Create {
            path,
            snapshot,
            title,
            rationale,
            patches,
            out,
        } => {
            let root = normalize_path(&path)?;
            let raw = std::fs::read_to_string(&patches)
                .with_context(|| format!("failed to read patch list: {}", patches.display()))?;

            #[derive(serde::Deserialize)]
            struct RawPatch {
                file_path: String,
                new_content: String,
            }
            let raw_patches: Vec<RawPatch> =
                serde_json::from_str(&raw).context("failed to parse patch list as JSON")?;
            let new_patches = raw_patches
                .into_iter()
                .map(|p| changeset::NewPatch {
                    file_path: p.file_path,
                    new_content: p.new_content,
                })
                .collect();

            let created = changeset::create(&root, snapshot, title, rationale, new_patches);
            write_changeset(&out, &created)?;
            println!("created changeset {} ({} patches)", created.id, created.patches.len());
        }
        ChangesetAction::Apply { path, changeset: changeset_path } => {
            let root = normalize_path(&path)?;
            let mut cs = read_changeset(&changeset_path)?;
            changeset::apply(&root, &mut cs).context("failed to apply changeset")?;
            write_changeset(&changeset_path, &cs)?;
            println!("applied changeset {}", cs.id);
        }
        ChangesetAction::Rollback { path, changeset: changeset_path } => {
            let root = normalize_path(&path)?;
            let mut cs = read_changeset(&changeset_path)?;
            changeset::rollback(&root, &mut cs).context("failed to roll back changeset")?;
            write_changeset(&changeset_path, &cs)?;
            println!("rolled back changeset {}", cs.id);
        }
        ChangesetAction::Commit {
            path,
            changeset: changeset_path,
            message,
            author,
        } => {
            let root = normalize_path(&path)?;
            let mut cs = read_changeset(&changeset_path)?;
            let vcs = GitVcs::new(&root);
            if !vcs.is_repo() {
                anyhow::bail!("{} is not a git working tree", root.display());
            }
            changeset::commit(&vcs, &mut cs, &message, author.as_deref())
                .context("failed to commit changeset")?;
            write_changeset(&changeset_path, &cs)?;
            println!(
                "committed changeset {} as {}",
                cs.id,
                cs.commit_id.as_deref().unwrap_or("<unknown>")
            );
        }
        ChangesetAction::Delete { changeset: changeset_path } => {
            let cs = read_changeset(&changeset_path)?;
            changeset::delete(&cs).context("cannot delete changeset")?;
            std::fs::remove_file(&changeset_path)
                .with_context(|| format!("failed to delete {}", changeset_path.display()))?;
            println!("deleted changeset {}", cs.id);
        }
    }
    Ok(())
}

fn read_changeset(path: &Path) -> anyhow::Result<codemap_core::model::Changeset> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read changeset: {}", path.display()))?;
    serde_json::from_str(&raw).context("failed to parse changeset JSON")
}

fn write_changeset(path: &Path, cs: &codemap_core::model::Changeset) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(cs)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn run_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show { path, config: config_path } => {
            let project_root = resolve_project_root(path)?;
            let resolved = config::load_and_resolve(&project_root, config_path.as_deref())
                .context("failed to load configuration")?;
            print_resolved_config(&resolved);
        }
        ConfigAction::Validate { path, config: config_path } => {
            let project_root = resolve_project_root(path)?;
            match config::load_and_resolve(&project_root, config_path.as_deref()) {
                Ok(resolved) => {
                    if let Some(ref p) = resolved.config_path {
                        println!("config valid: {}", p.display());
                    } else {
                        println!("no config file found, defaults are valid");
                    }
                }
                Err(e) => {
                    eprintln!("config validation failed: {e:#}");
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn resolve_project_root(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => normalize_path(&p),
        None => Ok(std::env::current_dir()?),
    }
}

fn print_resolved_config(resolved: &config::ResolvedConfig) {
    match &resolved.config_path {
        Some(p) => println!("config source: {}", p.display()),
        None => println!("config source: defaults"),
    }
    println!("max_file_size_bytes: {}", resolved.max_file_size_bytes);
    println!("impact_depth_cap:    {}", resolved.impact_depth_cap);
    println!("commit_batch_size:   {}", resolved.commit_batch_size);
    println!(
        "risk_thresholds:     low<=({},{}) medium<=({},{}) high<=({},{})",
        resolved.risk_thresholds.low_max_files,
        resolved.risk_thresholds.low_max_symbols,
        resolved.risk_thresholds.medium_max_files,
        resolved.risk_thresholds.medium_max_symbols,
        resolved.risk_thresholds.high_max_files,
        resolved.risk_thresholds.high_max_symbols,
    );
}
