//! docshelf CLI commands
//!
//! Thin layer over `docshelf_core::Registry`: every command opens the
//! registry at the configured storage root, runs, and renders the outcome.

use anyhow::{bail, Context as _, Result};
use clap::Subcommand;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use docshelf_core::{
    Activity, Config, FeedEntry, InstallJob, JobPhase, Registry, SearchOptions, Settings,
    SymbolCategory,
};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Settings for one invocation, after command line overrides
pub struct Context {
    pub config: Config,
    pub settings: Settings,
    /// `--feed`: a configured feed name or a URL
    pub feed: Option<String>,
}

impl Context {
    fn feed_url(&self) -> Result<String> {
        if let Some(feed) = &self.feed {
            return Ok(self
                .config
                .get_feed(feed)
                .map(|f| f.url.clone())
                .unwrap_or_else(|| feed.clone()));
        }
        self.config
            .default_feed()
            .map(|f| f.url.clone())
            .context("No feed configured. Add one with 'docshelf feeds add <name> <url>' or pass --feed <url>")
    }

    fn open_registry(&self) -> Result<Registry> {
        let root = &self.settings.storage_root;
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;
        Ok(Registry::from_settings(&self.settings)?)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the docsets offered by the feed
    Feed,

    /// Install docsets from the feed or from a local bundle
    Install {
        /// Docset identifiers as listed by the feed
        #[clap(required_unless_present = "archive", conflicts_with = "archive")]
        ids: Vec<String>,

        /// Install a local .tar.gz bundle
        #[clap(long, requires = "id")]
        archive: Option<PathBuf>,

        /// Identifier to install the local bundle under
        #[clap(long)]
        id: Option<String>,
    },

    /// Update installed docsets (all with a newer feed revision if none given)
    Update {
        /// Docset identifiers
        ids: Vec<String>,
    },

    /// Remove installed docsets
    Remove {
        /// Docset identifiers
        #[clap(required = true)]
        ids: Vec<String>,

        /// Do not ask for confirmation
        #[clap(long, short)]
        yes: bool,
    },

    /// List installed docsets
    List,

    /// Search symbols across installed docsets
    Search {
        /// Query, optionally prefixed with docset keywords (e.g. "py,django:QuerySet")
        query: String,

        /// Only search these docsets
        #[clap(long = "docset")]
        docsets: Vec<String>,

        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Show the symbol table of an installed docset
    Symbols {
        /// Docset identifier
        id: String,

        /// List the symbols of one category
        #[clap(long)]
        category: Option<SymbolCategory>,
    },

    /// Manage configured feeds
    Feeds {
        #[clap(subcommand)]
        command: FeedsCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum FeedsCommand {
    /// Add a feed
    Add {
        /// Feed name
        name: String,
        /// Feed URL or local path
        url: String,
        /// Make this the default feed
        #[clap(long)]
        default: bool,
    },

    /// List configured feeds
    List,

    /// Remove a feed
    Remove {
        /// Feed name
        name: String,
    },

    /// Set the default feed
    Default {
        /// Feed name
        name: String,
    },
}

impl Command {
    pub async fn execute(self, ctx: Context) -> Result<()> {
        match self {
            Command::Feed => execute_feed(&ctx).await,
            Command::Install { ids, archive, id } => match (archive, id) {
                (Some(archive), Some(id)) => execute_install_archive(&ctx, archive, &id).await,
                _ => execute_install(&ctx, &ids).await,
            },
            Command::Update { ids } => execute_update(&ctx, &ids).await,
            Command::Remove { ids, yes } => execute_remove(&ctx, &ids, yes),
            Command::List => execute_list(&ctx),
            Command::Search {
                query,
                docsets,
                json,
            } => execute_search(&ctx, &query, docsets, json),
            Command::Symbols { id, category } => execute_symbols(&ctx, &id, category),
            Command::Feeds { command } => execute_feeds(ctx, command),
        }
    }
}

fn render<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

/// Table row for feed entries
#[derive(Tabled)]
struct FeedRow {
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Revision")]
    revision: String,
    #[tabled(rename = "Status")]
    status: String,
}

async fn execute_feed(ctx: &Context) -> Result<()> {
    let registry = ctx.open_registry()?;
    let url = ctx.feed_url()?;

    println!("Fetching feed {url}...");
    let entries = registry.fetch_feed(&url).await?;
    if entries.is_empty() {
        println!("\nThe feed lists no docsets.");
        return Ok(());
    }

    let updates: Vec<String> = registry
        .updates_available(&entries)
        .into_iter()
        .map(|e| e.identifier)
        .collect();
    let catalog = registry.catalog();

    let rows: Vec<FeedRow> = entries
        .iter()
        .map(|entry| {
            let status = if updates.contains(&entry.identifier) {
                "update available"
            } else if catalog.contains(&entry.identifier) {
                "installed"
            } else {
                ""
            };
            FeedRow {
                identifier: entry.identifier.clone(),
                name: entry.name.clone(),
                revision: entry.revision.clone(),
                status: status.to_string(),
            }
        })
        .collect();

    println!("\n{} docset(s) available:\n", rows.len());
    println!("{}", render(&rows));
    Ok(())
}

async fn execute_install(ctx: &Context, ids: &[String]) -> Result<()> {
    let registry = ctx.open_registry()?;
    let url = ctx.feed_url()?;

    println!("Fetching feed {url}...");
    let entries = registry.fetch_feed(&url).await?;

    let mut selected = Vec::new();
    for id in ids {
        let entry = entries
            .iter()
            .find(|e| &e.identifier == id)
            .with_context(|| format!("Docset '{id}' is not listed in the feed"))?;
        selected.push(entry.clone());
    }

    install_entries(&registry, selected).await
}

async fn execute_install_archive(ctx: &Context, archive: PathBuf, id: &str) -> Result<()> {
    if !archive.is_file() {
        bail!("Archive not found: {}", archive.display());
    }
    let registry = ctx.open_registry()?;
    let job = registry.install_archive(&archive, id)?;
    wait_for_jobs(&registry, vec![job]).await
}

async fn install_entries(registry: &Registry, entries: Vec<FeedEntry>) -> Result<()> {
    let mut jobs = Vec::new();
    for entry in entries {
        println!("Installing {} ({})", entry.name, entry.identifier);
        jobs.push(registry.install(entry)?);
    }
    wait_for_jobs(registry, jobs).await
}

async fn execute_update(ctx: &Context, ids: &[String]) -> Result<()> {
    let registry = ctx.open_registry()?;

    if ids.is_empty() {
        let url = ctx.feed_url()?;
        println!("Checking {url} for updates...");
        let entries = registry.fetch_feed(&url).await?;
        let updates = registry.updates_available(&entries);
        if updates.is_empty() {
            println!("\nAll installed docsets are up to date.");
            return Ok(());
        }
        return install_entries(&registry, updates).await;
    }

    let mut jobs = Vec::new();
    for id in ids {
        println!("Updating {id}");
        jobs.push(registry.update(id).await?);
    }
    wait_for_jobs(&registry, jobs).await
}

fn activity_line(activity: &Activity) -> String {
    format!(
        "{} downloading / {} installing / {} indexing ({}%)",
        activity.downloading, activity.installing, activity.indexing, activity.percent
    )
}

/// Print progress until every job finishes, then report outcomes
async fn wait_for_jobs(registry: &Registry, jobs: Vec<InstallJob>) -> Result<()> {
    let mut shown: HashMap<String, (JobPhase, u8)> = HashMap::new();
    let mut shown_activity = Activity::default();
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

    while jobs.iter().any(|job| !job.is_finished()) {
        ticker.tick().await;

        for job in &jobs {
            let progress = job.progress();
            if progress.phase.is_finished() {
                continue;
            }
            let state = (progress.phase, progress.percent);
            if shown.get(job.identifier()) != Some(&state) {
                println!("  {}: {}: {}%", job.identifier(), progress.phase, progress.percent);
                shown.insert(job.identifier().to_string(), state);
            }
        }

        let activity = registry.activity();
        if jobs.len() > 1 && !activity.is_idle() && activity != shown_activity {
            println!("{}", activity_line(&activity));
            shown_activity = activity;
        }
    }

    let mut failed = 0;
    for job in &jobs {
        match job.wait().await {
            Ok(metadata) => println!(
                "Installed {} ({}) revision '{}'",
                metadata.name, metadata.identifier, metadata.revision
            ),
            Err(e) if e.is_cancelled() => println!("Cancelled {}", job.identifier()),
            Err(e) => {
                eprintln!("Failed to install {}: {}", job.identifier(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} docset(s) failed", failed, jobs.len());
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn execute_remove(ctx: &Context, ids: &[String], yes: bool) -> Result<()> {
    let registry = ctx.open_registry()?;

    if !yes && !confirm(&format!("Remove {}?", ids.join(", ")))? {
        println!("Nothing removed.");
        return Ok(());
    }

    let mut failed = 0;
    for (id, result) in registry.remove_all(ids) {
        match result {
            Ok(()) => println!("Removed {id}"),
            Err(e) => {
                eprintln!("Failed to remove {id}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} docset(s) could not be removed", failed, ids.len());
    }
    Ok(())
}

/// Table row for installed docsets
#[derive(Tabled)]
struct InstalledRow {
    #[tabled(rename = "Identifier")]
    identifier: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Revision")]
    revision: String,
    #[tabled(rename = "Symbols")]
    symbols: usize,
    #[tabled(rename = "Installed")]
    installed_at: String,
}

fn execute_list(ctx: &Context) -> Result<()> {
    let registry = ctx.open_registry()?;
    let catalog = registry.catalog();
    let installed = catalog.metadata();

    if installed.is_empty() {
        println!("No docsets installed.");
        println!("\nRun 'docshelf feed' to see what is available.");
        return Ok(());
    }

    let rows: Vec<InstalledRow> = installed
        .into_iter()
        .map(|meta| InstalledRow {
            symbols: catalog
                .get(&meta.identifier)
                .map(|d| d.index().len())
                .unwrap_or(0),
            installed_at: meta
                .installed_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            identifier: meta.identifier,
            name: meta.name,
            revision: meta.revision,
        })
        .collect();

    println!("Installed docsets in {}:\n", registry.root().display());
    println!("{}", render(&rows));
    Ok(())
}

/// Table row for search hits
#[derive(Tabled)]
struct SearchRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    category: String,
    #[tabled(rename = "Docset")]
    docset: String,
    #[tabled(rename = "Location")]
    location: String,
}

fn execute_search(ctx: &Context, query: &str, docsets: Vec<String>, json: bool) -> Result<()> {
    let registry = ctx.open_registry()?;
    let options = SearchOptions {
        fuzzy: ctx.settings.fuzzy_search,
        limit: ctx.settings.search_limit,
        docsets,
    };

    let results = registry.search_engine().search(query, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matches for '{query}'.");
        return Ok(());
    }

    let rows: Vec<SearchRow> = results
        .into_iter()
        .map(|r| SearchRow {
            name: r.name,
            category: r.category.to_string(),
            docset: r.docset_name,
            location: r.location,
        })
        .collect();
    println!("{}", render(&rows));
    Ok(())
}

/// Table row for symbol counts
#[derive(Tabled)]
struct CategoryRow {
    #[tabled(rename = "Type")]
    category: String,
    #[tabled(rename = "Count")]
    count: usize,
}

fn execute_symbols(ctx: &Context, id: &str, category: Option<SymbolCategory>) -> Result<()> {
    let registry = ctx.open_registry()?;
    let docset = registry
        .get(id)
        .with_context(|| format!("Docset '{id}' is not installed"))?;
    let index = docset.index();

    if let Some(category) = category {
        for entry in index.entries_in(category) {
            println!("{}\t{}", entry.name, entry.location);
        }
        return Ok(());
    }

    let meta = docset.metadata();
    println!("{} ({}) revision '{}'", meta.name, meta.identifier, meta.revision);
    println!("Path: {}", meta.path.display());
    if !meta.keywords.is_empty() {
        println!("Keywords: {}", meta.keywords.join(", "));
    }
    if index.skipped() > 0 {
        println!("Skipped records: {}", index.skipped());
    }
    println!();

    let rows: Vec<CategoryRow> = index
        .symbol_counts()
        .iter()
        .map(|(category, count)| CategoryRow {
            category: category.to_string(),
            count: *count,
        })
        .collect();
    println!("{}", render(&rows));
    println!("\n{} symbol(s)", index.len());
    Ok(())
}

fn execute_feeds(mut ctx: Context, command: FeedsCommand) -> Result<()> {
    match command {
        FeedsCommand::Add { name, url, default } => {
            ctx.config.add_feed(&name, &url)?;
            if default {
                ctx.config.set_default_feed(&name)?;
            }
            ctx.config.save()?;
            println!("Added feed '{name}' -> {url}");
        }
        FeedsCommand::List => {
            if ctx.config.feeds().is_empty() {
                println!("No feeds configured.");
                println!("\nAdd one with 'docshelf feeds add <name> <url>'.");
                return Ok(());
            }
            println!("Configured feeds ({}):\n", ctx.config.path().display());
            for feed in ctx.config.feeds() {
                let marker = if feed.is_default { " (default)" } else { "" };
                println!("  {} -> {}{}", feed.name, feed.url, marker);
            }
        }
        FeedsCommand::Remove { name } => {
            ctx.config.remove_feed(&name)?;
            ctx.config.save()?;
            println!("Removed feed '{name}'");
        }
        FeedsCommand::Default { name } => {
            ctx.config.set_default_feed(&name)?;
            ctx.config.save()?;
            println!("Default feed is now '{name}'");
        }
    }
    Ok(())
}
