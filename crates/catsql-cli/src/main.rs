//! catsql CLI
//!
//! Command-line tool for viewing, filtering and patching database tables.

mod logging;
mod output;

use catsql_core::csv_source::ID_COLUMN;
use catsql_core::{Bookmark, HighlightDiff, OrderBy, Session, Settings, Value};
use clap::{Args, Parser, Subcommand};
use output::Format;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "catsql")]
#[command(about = "Quickly display and patch (part of) a database", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Slack for comparing float columns
    #[arg(long, global = true)]
    epsilon: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tables, optionally filtered
    Show(ShowArgs),

    /// Show column names and types
    Types {
        /// Database url or file name
        url: String,

        /// Tables to include (defaults to all tables)
        #[arg(long)]
        table: Vec<String>,
    },

    /// Apply a highlighter diff to a table
    Patch {
        /// Database url or file name
        url: String,

        /// Table to patch
        #[arg(long)]
        table: String,

        /// Diff file (CSV in highlighter format)
        #[arg(long)]
        patch: PathBuf,

        /// Decode `NULL` cells as SQL NULL
        #[arg(long)]
        safe_null: bool,

        /// Do not list the change operations
        #[arg(long)]
        quiet: bool,
    },
}

#[derive(Args)]
struct ShowArgs {
    /// Database url, file name, or bookmark file with --load-bookmark
    url: String,

    /// Tables to include (defaults to all tables)
    #[arg(long)]
    table: Vec<String>,

    /// Columns to include; tables lacking them are omitted
    #[arg(long, value_delimiter = ',')]
    column: Vec<String>,

    /// SQL conditions, e.g. "total < 1000"
    #[arg(long)]
    sql: Vec<String>,

    /// column=value filter; a value of @file.json matches any value found in the file
    #[arg(long = "value", value_parser = parse_assignment)]
    values: Vec<(String, String)>,

    /// Show rows containing this text in any column
    #[arg(long)]
    grep: Option<String>,

    /// Make --grep case sensitive
    #[arg(long)]
    case_sensitive: bool,

    /// Hide duplicate rows
    #[arg(long)]
    distinct: bool,

    /// Columns to order by, with - for descending; "none" disables ordering
    #[arg(long)]
    order: Vec<String>,

    /// Maximum rows per table
    #[arg(long)]
    limit: Option<u64>,

    /// Show row counts instead of rows
    #[arg(long)]
    count: bool,

    /// Output strict CSV (one table only)
    #[arg(long)]
    csv: bool,

    /// Save results to a JSON file (one table only)
    #[arg(long)]
    json: Option<PathBuf>,

    /// Encode NULL reversibly
    #[arg(long)]
    safe_null: bool,

    /// Hide columns fixed by --value filters
    #[arg(long)]
    terse: bool,

    /// Save the view to a bookmark file
    #[arg(long)]
    save_bookmark: Option<PathBuf>,

    /// Treat the url as a bookmark file to load
    #[arg(long)]
    load_bookmark: bool,
}

fn parse_assignment(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((column, value)) if !column.is_empty() => Ok((column.to_string(), value.to_string())),
        _ => Err(format!("expected column=value, got '{text}'")),
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> catsql_core::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(epsilon) = cli.epsilon {
        settings.epsilon = epsilon;
    }

    match cli.command {
        Commands::Show(args) => cmd_show(&args, &settings),
        Commands::Types { url, table } => cmd_types(&url, &table, &settings),
        Commands::Patch {
            url,
            table,
            patch,
            safe_null,
            quiet,
        } => cmd_patch(&url, &table, &patch, safe_null, quiet, &settings),
    }
}

fn cmd_show(args: &ShowArgs, settings: &Settings) -> catsql_core::Result<()> {
    let mut bookmark = if args.load_bookmark {
        Bookmark::load(&args.url)?
    } else {
        Bookmark::new(&args.url)
    };

    if !args.table.is_empty() {
        bookmark.table = Some(args.table.clone());
    }
    if !args.column.is_empty() {
        bookmark.column = Some(args.column.clone());
    }
    if !args.sql.is_empty() {
        bookmark
            .sql
            .get_or_insert_with(Vec::new)
            .extend(args.sql.iter().cloned());
    }
    for (column, value) in &args.values {
        bookmark
            .context
            .insert(column.clone(), Value::from(value.as_str()));
        if args.terse && bookmark.shows(column) {
            bookmark.hidden_columns.push(column.clone());
        }
    }
    bookmark.distinct |= args.distinct;

    let session = bookmark.open(settings)?;
    let mut engine = session.query();
    bookmark.apply(&mut engine)?;
    if let Some(pattern) = &args.grep {
        engine.grep(pattern, args.case_sensitive);
    }
    engine.order(&OrderBy::parse(&args.order));
    if let Some(limit) = args.limit {
        engine.limit(limit);
    }

    for dropped in engine.rejections() {
        tracing::debug!(table = %dropped.table, reason = %dropped.reason, "table omitted");
    }

    let synthetic_id = session.csv_source().is_some_and(|s| s.synthetic_id);
    let visible = |column: &str| bookmark.shows(column) && !(synthetic_id && column == ID_COLUMN);

    if let Some(path) = &args.json {
        output::write_json(path, &engine, visible)?;
    } else {
        let format = Format {
            csv: args.csv,
            count: args.count,
            safe_null: args.safe_null,
        };
        let stdout = io::stdout();
        let mut out = stdout.lock();
        output::write_tables(&mut out, &engine, format, visible)?;
        out.flush()?;
    }

    if let Some(path) = &args.save_bookmark {
        bookmark.save(path)?;
    }
    Ok(())
}

fn cmd_types(url: &str, tables: &[String], settings: &Settings) -> catsql_core::Result<()> {
    let settings = if tables.is_empty() {
        settings.clone()
    } else {
        settings.clone().with_tables(tables.iter().cloned())
    };
    let session = Session::connect(url, &settings)?;

    for (i, table) in session.catalog().iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", table.name);
        println!("{}", "=".repeat(table.name.chars().count()));
        for column in &table.columns {
            let key = if column.primary_key { " (key)" } else { "" };
            let declared = if column.declared_type.is_empty() {
                "-"
            } else {
                column.declared_type.as_str()
            };
            println!(
                "{}\t{}\t{}{}",
                column.name,
                declared,
                column.kind.as_str(),
                key
            );
        }
    }
    Ok(())
}

fn cmd_patch(
    url: &str,
    table: &str,
    patch_path: &Path,
    safe_null: bool,
    quiet: bool,
    settings: &Settings,
) -> catsql_core::Result<()> {
    let diff = HighlightDiff::load(patch_path)?;
    let session = Session::connect(url, settings)?;
    let keys = session.catalog().table(table)?.primary_key.clone();
    let ops = diff.to_change_ops(&keys, safe_null);

    if !quiet {
        for op in &ops {
            eprintln!("{}", serde_json::to_string(op)?);
        }
    }

    let mut engine = session.reconcile(table)?;
    engine.apply_all(&ops)?;
    let result = engine.finish();

    if result.skips != 0 {
        eprintln!(" * {}", serde_json::to_string(&result)?);
    }
    session.finalize(result.changed())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("NAME=two").unwrap(),
            ("NAME".to_string(), "two".to_string())
        );
        assert_eq!(
            parse_assignment("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=x").is_err());
    }

    #[test]
    fn test_cli_parses_show() {
        let cli = Cli::try_parse_from([
            "catsql",
            "show",
            "data.db",
            "--column",
            "NAME,DIGIT",
            "--value",
            "DIGIT=4",
            "--order",
            "DIGIT-",
        ])
        .unwrap();
        match cli.command {
            Commands::Show(args) => {
                assert_eq!(args.column, vec!["NAME", "DIGIT"]);
                assert_eq!(args.values, vec![("DIGIT".to_string(), "4".to_string())]);
                assert_eq!(args.order, vec!["DIGIT-"]);
            }
            _ => panic!("expected show"),
        }
    }
}
