//! # staffdex CLI (`sdx`)
//!
//! The `sdx` binary is the operational interface for staffdex. It provides
//! commands for database initialization, employee management, document
//! upload and processing, index maintenance, and federated search.
//!
//! ## Usage
//!
//! ```bash
//! sdx --config ./config/sdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sdx init` | Create the SQLite database and run schema migrations |
//! | `sdx employee add` | Register an employee and publish it to the index |
//! | `sdx employee list` | List all employees |
//! | `sdx upload <owner> <files...>` | Upload documents for an employee |
//! | `sdx process pending` | Run the pipeline over the unprocessed queue |
//! | `sdx process id <id>` | (Re)process one document |
//! | `sdx watch` | Poll the unprocessed queue continuously |
//! | `sdx reindex` | Republish every employee and processed document |
//! | `sdx search "<query>"` | Federated search across employees and documents |
//! | `sdx get <id>` | Show one document record and its extracted text |
//! | `sdx delete <id>` | Remove a document record and its index entry |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use staffdex::{config, db, employees, get, index, migrate, pipeline, search, storage};

/// staffdex — employee document ingestion, OCR, and federated search.
#[derive(Parser)]
#[command(
    name = "sdx",
    about = "staffdex — employee document ingestion, OCR, and federated search",
    version,
    long_about = "staffdex ingests employee documents (PDF, Word, plain text, scans), extracts \
    their text with an OCR fallback for scanned material, indexes everything alongside employee \
    profiles, and serves one federated search over both."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file, the record tables, and both
    /// full-text index partitions. Idempotent.
    Init,

    /// Manage employee records.
    Employee {
        #[command(subcommand)]
        action: EmployeeAction,
    },

    /// Upload one or more documents for an employee.
    ///
    /// Stores the raw files in blob storage and enqueues them for
    /// processing. Pass `--process` to run the pipeline immediately.
    Upload {
        /// Owner employee id.
        owner: String,

        /// Files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Declared MIME type for every file in this batch. Defaults to
        /// detection from each file's extension.
        #[arg(long = "type")]
        declared_type: Option<String>,

        /// Process the uploaded documents immediately.
        #[arg(long)]
        process: bool,
    },

    /// Run the processing pipeline.
    Process {
        #[command(subcommand)]
        action: ProcessAction,
    },

    /// Poll the unprocessed queue continuously.
    Watch {
        /// Seconds between queue scans.
        #[arg(long, default_value_t = 30)]
        interval: u64,

        /// Maximum documents per scan.
        #[arg(long, default_value_t = 100)]
        batch_size: i64,
    },

    /// Republish every employee and every processed document to the index.
    ///
    /// Rebuilds stale projections (e.g. after an employee rename) and
    /// repairs the index after publish failures.
    Reindex,

    /// Federated search across employees and their documents.
    ///
    /// Returns a merged, ranked list: employees that matched directly (with
    /// their matching documents nested) and employees that matched only
    /// through their documents.
    Search {
        /// The search query string.
        query: String,

        /// Filter results to one department (exact, case-insensitive).
        #[arg(long)]
        department: Option<String>,

        /// Number of leading results to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Print results as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show one document record and its extracted text.
    Get {
        /// Document id.
        id: String,

        /// Include a presigned/download URL for the raw blob.
        #[arg(long)]
        url: bool,
    },

    /// Remove a document record and its index entry.
    Delete {
        /// Document id.
        id: String,
    },
}

/// Employee management subcommands.
#[derive(Subcommand)]
enum EmployeeAction {
    /// Register an employee and publish it to the index.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        department: String,
        #[arg(long, default_value = "")]
        role: String,
        /// Comma-separated skill list.
        #[arg(long, default_value = "")]
        skills: String,
        #[arg(long, default_value = "")]
        bio: String,
    },
    /// List all employees.
    List,
}

/// Processing subcommands.
#[derive(Subcommand)]
enum ProcessAction {
    /// Process every document in the unprocessed queue, oldest first.
    Pending {
        /// Maximum documents to process in this run.
        #[arg(long, default_value_t = 1000)]
        limit: i64,
    },
    /// (Re)process one document by id, overwriting its derived fields.
    Id {
        /// Document id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let pool = db::connect(&cfg).await?;
    let index = index::SqliteIndexClient::new(pool.clone());

    match cli.command {
        Commands::Init => unreachable!(),
        Commands::Employee { action } => match action {
            EmployeeAction::Add {
                name,
                department,
                role,
                skills,
                bio,
            } => {
                let id = employees::add_employee(
                    &pool,
                    &index,
                    employees::NewEmployee {
                        name,
                        department,
                        role,
                        skills,
                        bio,
                    },
                )
                .await?;
                println!("{}", id);
            }
            EmployeeAction::List => {
                for employee in employees::list_employees(&pool).await? {
                    println!(
                        "{}  {}  [{}] {}",
                        employee.id, employee.name, employee.department, employee.role
                    );
                }
            }
        },
        Commands::Upload {
            owner,
            files,
            declared_type,
            process,
        } => {
            let store = storage::open_store(&cfg.storage)?;
            let mut items = Vec::with_capacity(files.len());
            for path in &files {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let file_name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("Invalid file name: {}", path.display()))?
                    .to_string();
                items.push(pipeline::UploadItem {
                    file_name,
                    declared_type: declared_type.clone().unwrap_or_default(),
                    bytes,
                });
            }

            let ids = pipeline::upload_documents(&pool, store.as_ref(), &owner, items).await?;
            for (path, id) in files.iter().zip(&ids) {
                println!("{}  {}", id, path.display());
            }

            if process {
                for id in &ids {
                    pipeline::process_document(&pool, store.as_ref(), &index, &cfg.pipeline, id)
                        .await?;
                }
                println!("Processed {} document(s).", ids.len());
            }
        }
        Commands::Process { action } => {
            let store = storage::open_store(&cfg.storage)?;
            match action {
                ProcessAction::Pending { limit } => {
                    let summary = pipeline::process_pending(
                        &pool,
                        store.as_ref(),
                        &index,
                        &cfg.pipeline,
                        limit,
                    )
                    .await?;
                    println!(
                        "Processed {} document(s), {} failed.",
                        summary.processed, summary.failed
                    );
                }
                ProcessAction::Id { id } => {
                    pipeline::process_document(&pool, store.as_ref(), &index, &cfg.pipeline, &id)
                        .await?;
                    println!("Processed {}.", id);
                }
            }
        }
        Commands::Watch {
            interval,
            batch_size,
        } => {
            let store = storage::open_store(&cfg.storage)?;
            pipeline::run_watch(
                &pool,
                store.as_ref(),
                &index,
                &cfg.pipeline,
                interval,
                batch_size,
            )
            .await?;
        }
        Commands::Reindex => {
            let summary = pipeline::reindex(&pool, &index).await?;
            println!(
                "Reindexed {} employee(s) and {} document(s), {} failed.",
                summary.employees, summary.documents, summary.failed
            );
        }
        Commands::Search {
            query,
            department,
            offset,
            limit,
            json,
        } => {
            let request = search::SearchRequest {
                query,
                department,
                offset,
                limit,
            };
            let results = search::federated_search(&index, &cfg.search, &request).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&results.entries)?);
            } else {
                print_search_results(&results);
            }
        }
        Commands::Get { id, url } => {
            let store = if url {
                Some(storage::open_store(&cfg.storage)?)
            } else {
                None
            };
            get::run_get(&pool, store.as_deref(), &id).await?;
        }
        Commands::Delete { id } => {
            pipeline::delete_document(&pool, &index, &id).await?;
            println!("Deleted {}.", id);
        }
    }

    pool.close().await;
    Ok(())
}

fn print_search_results(results: &search::SearchResults) {
    if results.entries.is_empty() {
        println!("No results.");
        return;
    }
    println!(
        "{} result(s), showing {}:",
        results.total,
        results.entries.len()
    );
    for (i, entry) in results.entries.iter().enumerate() {
        let tag = match entry.kind {
            staffdex::models::ResultKind::Employee => "employee",
            staffdex::models::ResultKind::DocumentOnly => "documents",
        };
        println!();
        println!(
            "{}. {} ({})  score={:.3}  [{}]",
            i + 1,
            entry.owner_name,
            entry.owner_id,
            entry.score,
            tag
        );
        if let (Some(department), Some(role)) = (&entry.department, &entry.role) {
            println!("   {} / {}", department, role);
        }
        if let Some(snippet) = &entry.snippet {
            if !snippet.is_empty() {
                println!("   {}", snippet);
            }
        }
        for doc in &entry.documents {
            println!("   - {}  score={:.3}", doc.file_name, doc.score);
            if !doc.snippet.is_empty() {
                println!("     {}", doc.snippet);
            }
        }
    }
}
