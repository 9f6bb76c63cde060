//! sqlite-clean - lint and fix SQLite database files from the command line.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};

use sqlite_clean::logging::{init_logging, LogConfig};
use sqlite_clean::{catalog, dbheader, Database, FixOptions, LikeNulls, Scope};

#[derive(Parser)]
#[command(name = "sqlite-clean")]
#[command(about = "Utility for linting and fixing SQLite database files.", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// Filepath for SQLite database file
    #[arg(long)]
    db: PathBuf,

    /// Optional table name to focus on
    #[arg(long)]
    table_name: Option<String>,

    /// Optional column name to focus on
    #[arg(long)]
    column_name: Option<String>,

    /// Comma separated list of strings treated as null-like values
    #[arg(long, default_value_t = LikeNulls::default())]
    like_nulls: LikeNulls,
}

impl TargetArgs {
    fn scope(&self) -> Scope {
        Scope {
            table_name: self.table_name.clone(),
            column_name: self.column_name.clone(),
        }
    }

    fn open(&self) -> Result<Database> {
        ensure!(
            self.db.exists(),
            "Database file {} does not exist",
            self.db.display()
        );
        Database::open(&self.db).with_context(|| format!("Failed to open {}", self.db.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Report data issues without changing the database
    Lint {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Fix data issues, updating the schema where necessary
    Fix {
        #[command(flatten)]
        target: TargetArgs,

        /// Destination filepath for the schema-updated database file
        #[arg(long)]
        dest_path: Option<PathBuf>,

        /// Replace the source database file with the fixed one
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        inplace: bool,
    },

    /// List the registered lint and fix operations
    Catalog {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the database file header
    Header {
        /// Filepath for SQLite database file
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(LogConfig {
        verbose: cli.verbose,
    })?;
    catalog::validate()?;

    match cli.command {
        Commands::Lint { target } => lint(&target),
        Commands::Fix {
            target,
            dest_path,
            inplace,
        } => fix(&target, dest_path, inplace),
        Commands::Catalog { json } => print_catalog(json),
        Commands::Header { db } => print_header(&db),
    }
}

fn lint(target: &TargetArgs) -> Result<ExitCode> {
    let db = target.open()?;
    let scope = target.scope();
    let mut found = false;
    for (entry, lint) in catalog::lints() {
        if lint(&db, &scope, &target.like_nulls)
            .with_context(|| format!("Lint {} failed", entry.id))?
        {
            println!("{}: {}", entry.id, entry.description);
            found = true;
        }
    }
    if found {
        return Ok(ExitCode::FAILURE);
    }
    println!("Database linted, no issues detected!");
    Ok(ExitCode::SUCCESS)
}

fn fix(target: &TargetArgs, dest_path: Option<PathBuf>, inplace: bool) -> Result<ExitCode> {
    let options = FixOptions {
        dest_path,
        scope: target.scope(),
        inplace,
        like_nulls: target.like_nulls.clone(),
    };
    let mut db = target.open()?;
    for (entry, fix) in catalog::fixes() {
        db = fix(db, &options).with_context(|| format!("Fix {} failed", entry.id))?;
    }
    let location = db.path().unwrap_or(&target.db);
    println!("Database fixed at {}!", location.display());
    Ok(ExitCode::SUCCESS)
}

fn print_catalog(json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(&catalog::listing())?);
    } else {
        for entry in catalog::CATALOG.iter() {
            let kind = match entry.kind() {
                catalog::Kind::Lint => "lint",
                catalog::Kind::Fix => "fix",
            };
            println!("{}\t{}\t{}", entry.id, kind, entry.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_header(db: &Path) -> Result<ExitCode> {
    let hdr = dbheader::read_header(db)
        .with_context(|| format!("Failed to read header of {}", db.display()))?;
    println!("page size: {}", hdr.pagesize);
    println!("page count: {}", hdr.numpages);
    println!("file change counter: {}", hdr.changecnt);
    println!("schema cookie: {}", hdr.schema_cookie);
    println!("schema format: {}", hdr.schema_format);
    println!("text encoding: {}", hdr.text_encoding_name());
    println!("user version: {}", hdr.user_version);
    Ok(ExitCode::SUCCESS)
}
