use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pixmem_core::DEFAULT_EMBEDDING_DIM;
use pixmem_indexer::{
    Collection, GeoResolver, NoGeocode, NoOcr, NominatimResolver, SearchOptions, TesseractCli,
    TextExtractor, DEFAULT_RELEVANCE_CUTOFF,
};
use pixmem_memory::{EmbeddingProvider, HashEmbedding, OllamaEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pixmem", about = "Index and search a local photo collection")]
struct Cli {
    /// Directory holding the photo collection
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Ollama endpoint for embeddings; hash-based embedding when unset
    #[arg(long)]
    embed_url: Option<String>,
    /// Embedding model name, used with --embed-url
    #[arg(long, default_value = "nomic-embed-text")]
    embed_model: String,
    /// Embedding dimensionality
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIM)]
    embed_dim: usize,

    /// Skip OCR during scans
    #[arg(long)]
    no_ocr: bool,
    /// Tesseract language code
    #[arg(long, default_value = "eng")]
    ocr_lang: String,

    /// Nominatim base URL for turning GPS EXIF into location tags
    #[arg(long)]
    geocode_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every supported image under the root
    Scan {
        /// Re-enrich files already known by content hash
        #[arg(long)]
        rebuild: bool,
        /// Skip vision enrichment for this scan, even when a backend is
        /// configured
        #[arg(long)]
        no_vision: bool,
    },
    /// Search the collection with a natural-language query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long, default_value_t = 12)]
        limit: usize,
        /// Inclusive lower bound on capture date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Inclusive upper bound on capture date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Relevance cutoff on squared L2 distance
        #[arg(long, default_value_t = DEFAULT_RELEVANCE_CUTOFF)]
        max_distance: f32,
        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record in full
    Show {
        /// Record identifier, as printed by `search`
        file_id: Uuid,
    },
    /// Manage the vision enrichment backend
    Vision {
        #[command(subcommand)]
        action: VisionAction,
    },
}

#[derive(Subcommand)]
enum VisionAction {
    /// Show the saved vision configuration
    Show,
    /// List vision-capable models at the configured endpoint
    Models,
    /// Validate a vision configuration against a test image, then save it
    Set {
        /// Base URL of the vision endpoint
        #[arg(long)]
        endpoint: String,
        /// Bearer token, when the endpoint needs one
        #[arg(long)]
        api_key: Option<String>,
        /// Model identifier to use for inference
        #[arg(long)]
        model: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let embedder: Arc<dyn EmbeddingProvider> = match &cli.embed_url {
        Some(url) => Arc::new(OllamaEmbedding::new(url, &cli.embed_model, cli.embed_dim)),
        None => Arc::new(HashEmbedding::new(cli.embed_dim)),
    };
    let ocr: Arc<dyn TextExtractor> = if cli.no_ocr {
        Arc::new(NoOcr)
    } else {
        Arc::new(TesseractCli::new(&cli.ocr_lang))
    };
    let geo: Arc<dyn GeoResolver> = match &cli.geocode_url {
        Some(url) => Arc::new(NominatimResolver::new(url)),
        None => Arc::new(NoGeocode),
    };

    let mut collection = Collection::mount(cli.root.clone(), embedder, ocr, geo)
        .await
        .with_context(|| format!("could not mount collection at {}", cli.root.display()))?;

    match cli.command {
        Commands::Scan { rebuild, no_vision } => {
            if no_vision {
                collection.disable_vision();
            }
            let report = collection.scan(rebuild).await?;
            println!(
                "{} added, {} skipped ({} records total)",
                report.added,
                report.skipped,
                collection.count()?
            );
        }
        Commands::Search {
            query,
            limit,
            from,
            to,
            max_distance,
            json,
        } => {
            let opts = SearchOptions {
                k: limit,
                date_from: from,
                date_to: to,
                max_distance,
            };
            let hits = collection.search(&query, &opts).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No matches.");
            } else {
                for (rank, hit) in hits.iter().enumerate() {
                    println!("{:>2}. [{:.3}] {}", rank + 1, hit.distance, hit.path);
                    println!("    {}", hit.summary);
                    println!(
                        "    tags: {}  vision: {}  id: {}",
                        hit.tags,
                        hit.vision_status.as_str(),
                        hit.file_id
                    );
                    if let Some(date) = hit.exif_date {
                        println!("    taken: {}", date.format("%Y-%m-%d %H:%M"));
                    }
                }
            }
        }
        Commands::Show { file_id } => match collection.record(file_id)? {
            Some(record) => {
                println!("id:       {}", record.file_id);
                println!("path:     {}", record.path);
                println!("hash:     {}", record.hash);
                println!("summary:  {}", record.memory_summary);
                println!("caption:  {}", record.caption);
                println!("tags:     {}", record.tags);
                println!("vision:   {}", record.vision_status.as_str());
                match record.exif_date {
                    Some(date) => println!("taken:    {}", date.format("%Y-%m-%d %H:%M:%S")),
                    None => println!("taken:    unknown"),
                }
                println!("modified: {}", record.modified_at.to_rfc3339());
                println!("vector:   {} dims", record.embedding.len());
                if !record.ocr_text.trim().is_empty() {
                    println!("ocr:\n{}", record.ocr_text.trim());
                }
                if let Some(vision_json) = record.vision_json {
                    println!("vision output:\n{vision_json}");
                }
            }
            None => println!("No record with id {file_id}."),
        },
        Commands::Vision { action } => match action {
            VisionAction::Show => match collection.vision_config()? {
                Some(config) => {
                    println!("endpoint:  {}", config.endpoint);
                    println!("vendor:    {}", config.vendor.as_deref().unwrap_or("unknown"));
                    println!("model:     {}", config.model);
                    match config.last_validated_at {
                        Some(t) => println!("validated: {}", t.to_rfc3339()),
                        None => println!("validated: never"),
                    }
                }
                None => println!("No vision backend configured."),
            },
            VisionAction::Models => {
                let models = collection.vision_models().await?;
                if models.is_empty() {
                    println!("No vision-capable models found. Configure a backend with `pixmem vision set`.");
                } else {
                    for model in models {
                        println!("{model}");
                    }
                }
            }
            VisionAction::Set {
                endpoint,
                api_key,
                model,
            } => {
                let config = collection.configure_vision(&endpoint, api_key, &model).await?;
                println!(
                    "Vision backend validated and saved: {} ({}) model {}",
                    config.endpoint,
                    config.vendor.as_deref().unwrap_or("unknown"),
                    config.model
                );
            }
        },
    }

    Ok(())
}
