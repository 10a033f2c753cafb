//! crategraph CLI: inspect, diff and reconcile RO-Crate metadata documents.
//!
//! Usage:
//!   crategraph inspect <file>
//!   crategraph resolve <file> <term> | reverse <file> <iri>
//!   crategraph diff <saved> <edited>
//!   crategraph reconcile <last-known> <local> <fresh> [--apply]
//!   crategraph import|export|list [--db path | --dir path]

use clap::{Parser, Subcommand};
use crategraph::config::Config;
use crategraph::diff::{changed_properties, changelist};
use crategraph::{
    compute_server_differences, ContextResolver, ContextValue, CrateGraph, CrateStore, Diff,
    DirectoryStore, EntityStore, OpenStore, ResolverOptions, SqliteStore,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "crategraph", version, about = "RO-Crate entity graph tools")]
struct Cli {
    /// Path to config file (default: <config dir>/crategraph/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a metadata document
    Inspect {
        file: PathBuf,
    },
    /// Expand a term against a document's context
    Resolve {
        file: PathBuf,
        term: String,
    },
    /// Compact an IRI against a document's context
    Reverse {
        file: PathBuf,
        iri: String,
    },
    /// Show what changed between a saved and an edited document
    Diff {
        saved: PathBuf,
        edited: PathBuf,
    },
    /// Merge server changes into a locally edited document
    Reconcile {
        /// Server copy the local edits started from
        last_known: PathBuf,
        /// Locally edited copy
        local: PathBuf,
        /// Freshly fetched server copy
        fresh: PathBuf,
        /// Print the merged document instead of the forced updates
        #[arg(long)]
        apply: bool,
    },
    /// Store a metadata document
    Import {
        file: PathBuf,
        /// Crate id (default: name of the directory holding the file)
        #[arg(long)]
        id: Option<String>,
        #[command(flatten)]
        target: StoreArgs,
    },
    /// Print a stored crate as JSON
    Export {
        id: String,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[command(flatten)]
        target: StoreArgs,
    },
    /// List stored crates
    List {
        #[command(flatten)]
        target: StoreArgs,
    },
}

#[derive(clap::Args)]
struct StoreArgs {
    /// Path to SQLite database file
    #[arg(long, conflicts_with = "dir")]
    db: Option<PathBuf>,
    /// Use a directory of crates instead of the database
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn open_store(config: &Config, target: StoreArgs) -> Result<Box<dyn CrateStore>, String> {
    if let Some(dir) = target.dir {
        let store = DirectoryStore::open(&dir).map_err(|e| format!("Failed to open {}: {}", dir.display(), e))?;
        return Ok(Box::new(store));
    }
    let db_path = target.db.unwrap_or_else(|| config.database.clone());
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Box::new(store))
}

fn read_graph(path: &Path) -> Result<CrateGraph, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    CrateGraph::from_json_str(&text).map_err(|e| format!("'{}': {}", path.display(), e))
}

/// Resolver for a document; documents without a context get the configured specification
fn resolver_for(graph: &CrateGraph, options: ResolverOptions) -> ContextResolver {
    if graph.context.is_empty() {
        return ContextResolver::setup_with(&ContextValue::reference(options.fallback.uri), options);
    }
    ContextResolver::setup_with(&graph.context, options)
}

fn cmd_inspect(path: &Path, options: ResolverOptions) -> Result<(), String> {
    let graph = read_graph(path)?;
    let resolver = resolver_for(&graph, options);
    let store = EntityStore::from_graph(&graph);

    println!("Entities:      {}", store.len());
    match store.root_entity_id() {
        Some(root) => println!("Root entity:   {}", root),
        None => println!("Root entity:   (none)"),
    }
    println!(
        "Specification: {}{}",
        resolver.specification_version().unwrap_or("(none)"),
        if resolver.using_fallback() { " (fallback)" } else { "" }
    );
    if !resolver.custom_prefixes().is_empty() {
        println!("Prefixes:      {}", resolver.custom_prefixes().join(", "));
    }
    println!();
    println!("{:<40}  {:<24}  {:>5}", "ID", "TYPE", "REFS");
    println!("{}", "-".repeat(73));
    for entity in store.iter() {
        println!(
            "{:<40}  {:<24}  {:>5}",
            entity.id,
            entity.types.join(", "),
            store.find_references_to(&entity.id).len()
        );
    }
    Ok(())
}

fn cmd_resolve(path: &Path, term: &str, options: ResolverOptions) -> Result<(), String> {
    let graph = read_graph(path)?;
    match resolver_for(&graph, options).resolve(term) {
        Some(iri) => {
            println!("{}", iri);
            Ok(())
        }
        None => Err(format!("'{}' does not resolve", term)),
    }
}

fn cmd_reverse(path: &Path, iri: &str, options: ResolverOptions) -> Result<(), String> {
    let graph = read_graph(path)?;
    match resolver_for(&graph, options).reverse(iri) {
        Some(term) => {
            println!("{}", term);
            Ok(())
        }
        None => Err(format!("no term for '{}'", iri)),
    }
}

fn cmd_diff(saved: &Path, edited: &Path) -> Result<(), String> {
    let saved = read_graph(saved)?.entity_map();
    let edited = read_graph(edited)?.entity_map();

    let mut changed = 0;
    for (id, diff) in changelist(&edited, &saved) {
        if !diff.is_changed() {
            continue;
        }
        changed += 1;
        match (diff, edited.get(&id), saved.get(&id)) {
            (Diff::Modified, Some(now), Some(before)) => {
                println!("{:<9} {}  [{}]", diff, id, changed_properties(before, now).join(", "))
            }
            _ => println!("{:<9} {}", diff, id),
        }
    }
    if changed == 0 {
        println!("No changes.");
    }
    Ok(())
}

fn cmd_reconcile(last_known: &Path, local: &Path, fresh: &Path, apply: bool) -> Result<(), String> {
    let last_known = read_graph(last_known)?;
    let local = read_graph(local)?;
    let fresh = read_graph(fresh)?;

    let mut store = EntityStore::from_graph(&local);
    let differences = compute_server_differences(&fresh, &last_known, store.entities());
    let out = if apply {
        store.apply_server_differences(&differences);
        serde_json::to_string_pretty(&store.to_graph(fresh.context.clone()))
    } else {
        serde_json::to_string_pretty(&differences)
    };
    println!("{}", out.map_err(|e| e.to_string())?);
    Ok(())
}

fn cmd_import(store: &dyn CrateStore, path: &Path, id: Option<String>) -> Result<(), String> {
    let id = match id {
        Some(id) => id,
        None => path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().and_then(|d| d.file_name()).map(|n| n.to_string_lossy().to_string()))
            .ok_or_else(|| format!("cannot derive a crate id from '{}', use --id", path.display()))?,
    };
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    store.save_ro_crate_metadata_json(&id, &text).map_err(|e| e.to_string())?;
    println!("Imported crate '{}'", id);
    Ok(())
}

fn cmd_export(store: &dyn CrateStore, id: &str, output: Option<&Path>) -> Result<(), String> {
    let graph = store.get_crate(id).map_err(|e| e.to_string())?;
    let json = graph.to_json_string_pretty().map_err(|e| e.to_string())?;
    match output {
        Some(path) => std::fs::write(path, json).map_err(|e| format!("cannot write '{}': {}", path.display(), e)),
        None => {
            println!("{}", json);
            Ok(())
        }
    }
}

fn cmd_list(store: &dyn CrateStore) -> Result<(), String> {
    let ids = store.list_crates().map_err(|e| e.to_string())?;
    if ids.is_empty() {
        println!("No crates stored.");
        return Ok(());
    }
    println!("{:<40}  {:>8}", "ID", "ENTITIES");
    println!("{}", "-".repeat(50));
    for id in ids {
        let count = store.get_crate(&id).map(|g| g.len()).map_err(|e| e.to_string())?;
        println!("{:<40}  {:>8}", id, count);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    // Validated on load for files; defaults are always valid
    let level = config.level().unwrap_or(tracing::Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    let options = config.resolver_options().unwrap_or_default();

    let result = match cli.command {
        Commands::Inspect { file } => cmd_inspect(&file, options),
        Commands::Resolve { file, term } => cmd_resolve(&file, &term, options),
        Commands::Reverse { file, iri } => cmd_reverse(&file, &iri, options),
        Commands::Diff { saved, edited } => cmd_diff(&saved, &edited),
        Commands::Reconcile {
            last_known,
            local,
            fresh,
            apply,
        } => cmd_reconcile(&last_known, &local, &fresh, apply),
        Commands::Import { file, id, target } => {
            open_store(&config, target).and_then(|store| cmd_import(store.as_ref(), &file, id))
        }
        Commands::Export { id, output, target } => {
            open_store(&config, target).and_then(|store| cmd_export(store.as_ref(), &id, output.as_deref()))
        }
        Commands::List { target } => open_store(&config, target).and_then(|store| cmd_list(store.as_ref())),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
