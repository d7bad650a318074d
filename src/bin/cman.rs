//! # cman CLI - Course notes from the command line
//!
//! A thin command-line front end for the cman library.
//!
//! ## Usage
//! ```bash
//! # Set up a workspace and remember it as the default root
//! cman --root ~/notes init
//!
//! # Create nodes; each one becomes the current selection
//! cman new semester WS24
//! cman new course "Linear Algebra"
//!
//! # Move the selection
//! cman select course "Linear Algebra"
//!
//! # Inspect
//! cman status
//! cman tree
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cman::config::ROOT_DIR_KEY;
use cman::{CmanError, ConfigStore, JsonConfigStore, NodeRef, SelectionStatus, Workspace};
use colored::*;
use dialoguer::Confirm;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cman CLI - Manage a hierarchy of LaTeX notes
#[derive(Parser)]
#[command(name = "cman")]
#[command(version)]
#[command(about = "Keep a hierarchy of LaTeX notes and their composite documents in sync")]
#[command(long_about = None)]
struct Cli {
    /// Workspace root (defaults to the stored root-dir)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Config file holding root-dir and the current selection
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workspace directories and default templates
    Init,

    /// Create a node under the current selection
    #[command(alias = "n")]
    New {
        /// Level name or alias (semester, sem, s, ...)
        group: String,
        /// Title of the new node
        title: String,
    },

    /// Remove a node and everything below it
    #[command(visible_alias = "rm", alias = "rem")]
    Remove {
        /// Level name or alias
        group: String,
        /// Title of the node under the current selection
        title: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Change the current selection at one level
    #[command(alias = "current")]
    Select {
        /// Level name or alias
        group: String,
        /// Title to select
        title: String,
    },

    /// Show the current selection and workspace health
    Status,

    /// Print the whole hierarchy
    Tree,

    /// Bring every composite document up to date
    Sync,
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("cman=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<CmanError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

/// Main command runner
fn run(cli: Cli) -> Result<()> {
    let store = match &cli.config {
        Some(path) => JsonConfigStore::new(path),
        None => JsonConfigStore::open_default()?,
    };
    let root = cli.root;

    match cli.command {
        Commands::Init => cmd_init(root.context("init needs --root <dir>")?, store),
        Commands::New { group, title } => {
            cmd_new(&mut open_workspace(root, store)?, &group, &title)
        }
        Commands::Remove { group, title, yes } => {
            cmd_remove(&mut open_workspace(root, store)?, &group, &title, yes)
        }
        Commands::Select { group, title } => {
            cmd_select(&mut open_workspace(root, store)?, &group, &title)
        }
        Commands::Status => cmd_status(&open_workspace(root, store)?),
        Commands::Tree => cmd_tree(&open_workspace(root, store)?),
        Commands::Sync => cmd_sync(&mut open_workspace(root, store)?),
    }
}

/// Open the workspace at `root`, or at the stored root-dir
fn open_workspace(root: Option<PathBuf>, store: JsonConfigStore) -> Result<Workspace> {
    let root = match root {
        Some(root) => root,
        None => PathBuf::from(store.get(ROOT_DIR_KEY)?),
    };
    let workspace = Workspace::open(root.clone(), Box::new(store))
        .with_context(|| format!("failed to open workspace at {:?}", root))?;
    Ok(workspace)
}

/// Initialize a workspace and store its root as the default
fn cmd_init(root: PathBuf, mut store: JsonConfigStore) -> Result<()> {
    std::fs::create_dir_all(&root)
        .with_context(|| format!("cannot create workspace root {:?}", root))?;
    let root = root.canonicalize()?;

    println!("{}", "Initializing workspace...".blue().bold());
    store.set(ROOT_DIR_KEY, &root.to_string_lossy())?;
    let workspace = Workspace::init(root.clone(), Box::new(store.clone()))?;

    println!("{} Initialized cman workspace", "✓".green().bold());
    println!("  Root: {}", root.display().to_string().cyan());
    println!(
        "  Templates: {}",
        workspace.config().template_dir().display().to_string().cyan()
    );
    println!("  Config: {}", store.path().display().to_string().cyan());
    let top = workspace.hierarchy().name_at(0).unwrap_or_default();
    println!("\nNext steps:");
    println!("  - Create your first {}: {}", top, format!("cman new {} <title>", top).yellow());
    Ok(())
}

fn cmd_new(workspace: &mut Workspace, group: &str, title: &str) -> Result<()> {
    let node = workspace.create(group, title)?;
    let node = workspace.forest().node(node)?;
    println!(
        "{} Created {} '{}'",
        "✓".green().bold(),
        node.group(),
        node.title().cyan()
    );
    println!("  Path: {}", node.path().display());
    Ok(())
}

fn cmd_remove(workspace: &mut Workspace, group: &str, title: &str, yes: bool) -> Result<()> {
    let node = workspace.find(group, title)?;
    let target = workspace.forest().node(node)?;
    let below = workspace
        .forest()
        .walk()
        .into_iter()
        .filter(|n| workspace.forest().ancestors(*n).contains(&node))
        .count();

    if !yes {
        let prompt = format!(
            "Remove {} '{}' ({}) and {} node(s) below it?",
            target.group(),
            target.title(),
            target.path().display(),
            below
        );
        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("confirmation needs a terminal; pass --yes to skip it")?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    let removed = workspace.remove(node)?;
    println!(
        "{} Removed {} node(s)",
        "✓".green().bold(),
        removed.len()
    );
    Ok(())
}

fn cmd_select(workspace: &mut Workspace, group: &str, title: &str) -> Result<()> {
    let node = workspace.select(group, title)?;
    let node = workspace.forest().node(node)?;
    println!(
        "{} Selected {} '{}'",
        "✓".green().bold(),
        node.group(),
        node.title().cyan()
    );
    Ok(())
}

/// Show the current selection, level by level
fn cmd_status(workspace: &Workspace) -> Result<()> {
    let validation = workspace.validate_selection()?;

    println!("{}", "Selection:".blue().bold());
    for (depth, level) in workspace.hierarchy().levels().iter().enumerate() {
        let value = match validation.resolved.get(depth) {
            Some(node) => workspace.forest().node(*node)?.title().green().to_string(),
            None => match workspace.current(depth)? {
                Some(stored) => format!("{} {}", stored.red(), "(invalid)".dimmed()),
                None => "-".dimmed().to_string(),
            },
        };
        println!("  {:<10} {}", level.name, value);
    }

    println!();
    match &validation.status {
        SelectionStatus::Complete => println!("{}", "Selection is complete".green()),
        SelectionStatus::Empty { depth } => println!(
            "{} has no {} yet",
            describe_parent(workspace, &validation.resolved),
            workspace.hierarchy().name_at(*depth).unwrap_or_default()
        ),
        SelectionStatus::Invalid { depth, .. } => {
            let group = workspace.hierarchy().name_at(*depth).unwrap_or_default();
            println!(
                "{} Select a {}: {}",
                "!".yellow().bold(),
                group,
                format!("cman select {} <title>", group).yellow()
            );
        }
    }

    let reconcile = workspace.reconcile_report();
    let sync = workspace.sync_report();
    println!("\n{}", "Workspace:".bold());
    println!("  Root: {}", workspace.root().display());
    println!("  Nodes: {}", workspace.forest().len());
    if !reconcile.migrated.is_empty() {
        println!("  Migrated: {}", reconcile.migrated.len());
    }
    for (path, err) in &reconcile.errors {
        println!("  {} {}: {}", "✗".red(), path.display(), err);
    }
    for (node, err) in &sync.errors {
        let title = workspace.forest().node(*node)?.title();
        println!("  {} {}: {}", "✗".red(), title, err);
    }
    Ok(())
}

fn describe_parent(workspace: &Workspace, resolved: &[NodeRef]) -> String {
    match resolved.last().and_then(|n| workspace.forest().get(*n)) {
        Some(node) => format!("{} '{}'", node.group(), node.title()),
        None => "The workspace".to_string(),
    }
}

/// Print the hierarchy, marking the selected path
fn cmd_tree(workspace: &Workspace) -> Result<()> {
    let forest = workspace.forest();
    let selected = workspace.validate_selection()?.resolved;

    if forest.is_empty() {
        println!("{}", "No nodes yet".yellow());
        return Ok(());
    }

    for node_ref in forest.walk() {
        let node = forest.node(node_ref)?;
        let indent = "  ".repeat(node.depth());
        let title = if selected.contains(&node_ref) {
            format!("{} {}", "*".green().bold(), node.title().green())
        } else {
            format!("  {}", node.title())
        };
        println!("{}{} {}", indent, title, node.group().dimmed());
    }
    Ok(())
}

fn cmd_sync(workspace: &mut Workspace) -> Result<()> {
    let reconcile = workspace.reconcile()?;
    let pending = reconcile.pending.len();
    for path in &reconcile.pruned {
        println!("{} {} is gone from disk", "-".yellow(), path.display());
    }
    workspace.sync_composites();
    let workspace: &Workspace = workspace;
    let report = workspace.sync_report();

    for (node, outcome) in &report.synced {
        if outcome.written {
            println!(
                "{} {}: +{} -{}",
                "✓".green(),
                workspace.forest().node(*node)?.title(),
                outcome.added.len(),
                outcome.removed.len()
            );
        }
    }
    println!(
        "Synchronized {} composite document(s), {} rewritten",
        report.synced.len(),
        report.written()
    );
    if pending > 0 {
        println!("{} container(s) have no children directory yet", pending);
    }
    if !report.errors.is_empty() {
        for (_, err) in &report.errors {
            eprintln!("  {} {}", "✗".red(), err);
        }
        anyhow::bail!("{} composite document(s) could not be synchronized", report.errors.len());
    }
    Ok(())
}
