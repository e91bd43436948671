use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{error, info, warn};

use es_bulk_helpers::audit_builder::AuditBuilder;
use es_bulk_helpers::conf::{parse_operation, Config, LevelMode};
use es_bulk_helpers::debug_if;
use es_bulk_helpers::models::bulk::{build_body, delete_body, BulkOperation};
use es_bulk_helpers::models::document::{Document, DEFAULT_ID_FIELD};
use es_bulk_helpers::utils::{read_documents, read_ids, read_query};
use es_bulk_helpers::{EsClient, EsError, Result, ScrollPage, SearchOptions};

#[derive(Parser, Debug)]
#[command(version, about = "Bulk writes and scrolled reads against Elasticsearch")]
struct Args {
    /// Config file (.toml or .json)
    #[arg(short, long)]
    config: PathBuf,
    /// Enable debug mode
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,
    /// Actually send mutating requests instead of printing them
    #[arg(short, long = "no-dry-run", action = ArgAction::SetTrue)]
    no_dry_run: bool,
    /// Append every bulk request and response to this file
    #[arg(long)]
    audit: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print cluster name and version
    Ping,
    /// Run one search and print the raw response
    Search {
        #[arg(short, long)]
        index: String,
        /// File holding the query body
        #[arg(short, long)]
        query: PathBuf,
        #[arg(long)]
        timeout_seconds: Option<u64>,
    },
    /// Scroll through all hits and write their sources as NDJSON
    Scroll {
        #[arg(short, long)]
        index: String,
        #[arg(short, long)]
        query: PathBuf,
        /// Output file, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Write NDJSON documents with create, update-as-upsert or index
    Bulk {
        #[arg(short, long)]
        index: String,
        #[arg(short, long, value_parser = parse_operation_arg)]
        operation: BulkOperation,
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_ID_FIELD)]
        id_field: String,
    },
    /// Delete documents by id, one id per line
    Delete {
        #[arg(short, long)]
        index: String,
        #[arg(long)]
        ids: PathBuf,
    },
    /// Drop a whole index
    DeleteIndex {
        #[arg(short, long)]
        index: String,
    },
}

fn parse_operation_arg(value: &str) -> std::result::Result<BulkOperation, String> {
    parse_operation(value).map_err(|e| e.to_string())
}

fn init_tracing(level: LevelMode, debug: bool) {
    let fallback = if debug { "debug" } else { level.as_str() };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LevelMode::Warn, args.debug);
            error!("{}", e);
            return ExitCode::from(2);
        }
    };
    init_tracing(config.get_log_level(), args.debug);
    info!(
        "Args debug={:?}, no-dry-run={:?}, config_path={:?}",
        args.debug, args.no_dry_run, args.config
    );
    debug_if!(args.debug, "Config file loaded correctly ... {:#?}", config);

    match run(&args, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, config: &Config) -> Result<()> {
    let es_config = config.get_elasticsearch().clone();
    let mut client = match &args.command {
        Commands::Ping => EsClient::new(es_config)?,
        _ => EsClient::connect(es_config).await?,
    };
    if let Some(path) = &args.audit {
        let audit = AuditBuilder::new(path).await.map_err(|source| EsError::Io {
            path: path.clone(),
            source,
        })?;
        client = client.with_audit(audit);
    }

    match &args.command {
        Commands::Ping => {
            let info = client.server_info().await?;
            println!(
                "{} ({}) version {}",
                info.get_name(),
                info.get_hostname(),
                info.get_version()
            );
        }
        Commands::Search {
            index,
            query,
            timeout_seconds,
        } => {
            let query = read_query(query).await?;
            let options = SearchOptions {
                timeout: timeout_seconds
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| client.get_config().get_query_timeout()),
                scroll: None,
            };
            let response: Value = client.search_with(index, &query, &options).await?;
            println!("{}", serde_json::to_string_pretty(&response).map_err(EsError::Serialize)?);
        }
        Commands::Scroll {
            index,
            query,
            output,
            max_pages,
        } => {
            let query = read_query(query).await?;
            let mut writer: Box<dyn AsyncWrite + Unpin + Send> = match output {
                Some(path) => Box::new(tokio::fs::File::create(path).await.map_err(|source| {
                    EsError::Io {
                        path: path.clone(),
                        source,
                    }
                })?),
                None => Box::new(tokio::io::stdout()),
            };
            let written = scroll_to_writer(&client, index, &query, *max_pages, &mut writer).await?;
            info!("scroll over {} finished, {} documents written", index, written);
        }
        Commands::Bulk {
            index,
            operation,
            input,
            id_field,
        } => {
            let docs = read_documents(input, id_field).await?;
            if args.no_dry_run {
                let summary = client.write(*operation, index, &docs).await?;
                info!(
                    "{} of {} documents into {} done: items={}, errors={}",
                    operation.as_str(),
                    docs.len(),
                    index,
                    summary.items,
                    summary.errors
                );
            } else if *operation == BulkOperation::Delete {
                let ids: Vec<&str> = docs.iter().map(|doc| doc.document_id()).collect();
                print_delete_chunks(&client, index, &ids)?;
            } else {
                let body = build_body(*operation, index, &docs)?;
                print!("{}", body.as_str());
                warn!("dry run, {} actions not sent (use --no-dry-run)", body.get_actions());
            }
        }
        Commands::Delete { index, ids } => {
            let ids = read_ids(ids).await?;
            if args.no_dry_run {
                let summary = client.delete(index, &ids).await?;
                info!(
                    "delete of {} ids from {} done: items={}, errors={}",
                    ids.len(),
                    index,
                    summary.items,
                    summary.errors
                );
            } else {
                print_delete_chunks(&client, index, &ids)?;
            }
        }
        Commands::DeleteIndex { index } => {
            if args.no_dry_run {
                client.delete_index(index).await?;
            } else {
                warn!("dry run, index {} not deleted (use --no-dry-run)", index);
            }
        }
    }
    Ok(())
}

fn print_delete_chunks<S: AsRef<str>>(client: &EsClient, index: &str, ids: &[S]) -> Result<()> {
    let batch_size = client.get_config().get_delete_batch_size().max(1);
    for (chunk_no, chunk) in ids.chunks(batch_size).enumerate() {
        let body = delete_body(index, chunk, chunk_no * batch_size)?;
        print!("{}", body.as_str());
    }
    warn!(
        "dry run, {} ids in {} bulk calls not sent (use --no-dry-run)",
        ids.len(),
        ids.len().div_ceil(batch_size)
    );
    Ok(())
}

async fn write_page<W: AsyncWrite + Unpin + ?Sized>(
    page: &ScrollPage,
    writer: &mut W,
) -> Result<usize> {
    let mut buf = String::new();
    let mut lines = 0;
    for source in page.response.get_hits().iter().filter_map(|hit| hit.get_source()) {
        buf.push_str(&serde_json::to_string(source).map_err(EsError::Serialize)?);
        buf.push('\n');
        lines += 1;
    }
    writer
        .write_all(buf.as_bytes())
        .await
        .map_err(|source| EsError::Io {
            path: PathBuf::from("<output>"),
            source,
        })?;
    Ok(lines)
}

async fn scroll_to_writer<W: AsyncWrite + Unpin + ?Sized>(
    client: &EsClient,
    index: &str,
    query: &Value,
    max_pages: Option<usize>,
    writer: &mut W,
) -> Result<usize> {
    let mut page: ScrollPage = client.scroll_start(index, query).await?;
    let mut written = write_page(&page, writer).await?;
    let mut pages = 1;
    if page.scroll_id.is_none() {
        if let Some(scroll_id) = page.response.get_scroll_id() {
            client.clear_scroll(scroll_id).await?;
        }
    }

    while let Some(scroll_id) = page.scroll_id.clone() {
        if max_pages.map_or(false, |max| pages >= max) {
            client.clear_scroll(&scroll_id).await?;
            break;
        }
        page = client.scroll_next(&scroll_id).await?;
        written += write_page(&page, writer).await?;
        pages += 1;
        if page.scroll_id.is_none() {
            client.clear_scroll(&scroll_id).await?;
        }
    }
    writer.flush().await.map_err(|source| EsError::Io {
        path: PathBuf::from("<output>"),
        source,
    })?;
    Ok(written)
}
