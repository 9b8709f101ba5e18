use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod catalog;
pub mod catalog_db;
pub mod cli;
pub mod data_dir;
pub mod dataset;
pub mod error;
pub mod query;
pub mod search;
pub mod search_index;

use catalog::Catalog;
use cli::{Cli, Command};
use data_dir::DataDir;
use dataset::DatasetRecord;
use query::FieldVocabulary;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DATASHELF_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let catalog = Catalog::open(&data_dir.catalog_db(), &data_dir.tantivy_dir()?)?;
    let vocab = FieldVocabulary::default();

    match cli.command {
        Command::Add(args) => {
            cmd_add(&catalog, &args)?;
        }
        Command::Remove(args) => {
            catalog.delete(&args.id)?;
            println!("Removed '{}'", args.id);
        }
        Command::Search(args) => {
            let results =
                search::search(&args.query, args.count, &vocab, &catalog);
            if args.json {
                search::format_json(&results, &args.query)?;
            } else if args.ids {
                search::format_ids(&results);
            } else {
                search::format_human(&results);
            }
        }
        Command::List(args) => {
            let results = search::list_datasets(args.count, &catalog)?;
            if args.json {
                search::format_json(&results, "")?;
            } else {
                search::format_human(&results);
            }
        }
        Command::Fields(args) => {
            cmd_fields(&vocab, args.prefix.as_deref());
        }
        Command::Reindex => {
            cmd_reindex(&catalog)?;
        }
        Command::Status(args) => {
            cmd_status(&catalog, &data_dir, args.json)?;
        }
        Command::Completions(_) => unreachable!("handled above"),
    }

    Ok(())
}

fn cmd_add(catalog: &Catalog, args: &cli::AddArgs) -> error::Result<()> {
    let content = std::fs::read_to_string(&args.file)?;
    let record: DatasetRecord = serde_json::from_str(&content)?;
    let id = record.id.clone();
    catalog.upsert(&record)?;
    println!("Indexed '{id}'");
    Ok(())
}

fn cmd_fields(vocab: &FieldVocabulary, prefix: Option<&str>) {
    let fields = vocab.complete(prefix.unwrap_or(""));
    if fields.is_empty() {
        println!("No matching fields.");
        return;
    }
    for field in fields {
        println!("{field}  ({})", vocab.operators_for(field).join(" "));
    }
}

fn cmd_reindex(catalog: &Catalog) -> error::Result<()> {
    eprintln!("Rebuilding full-text index...");
    let outcome = catalog.reindex()?;
    eprintln!("  Indexed {} datasets", outcome.indexed);
    for (id, message) in &outcome.failures {
        eprintln!("  Failed '{id}': {message}");
    }
    eprintln!("Reindex complete.");
    Ok(())
}

fn cmd_status(
    catalog: &Catalog,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let dataset_count = catalog.db().count()?;
    let indexed_count = catalog.index().num_docs()?;

    if json {
        let status = serde_json::json!({
            "data_dir": data_dir.root().display().to_string(),
            "datasets": dataset_count,
            "indexed": indexed_count,
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Datasets: {dataset_count}");
        println!("Indexed: {indexed_count}");
    }
    Ok(())
}
