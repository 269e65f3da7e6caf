use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use assessrec::config::Config;
use assessrec::corpus::Corpus;
use assessrec::embedding::EmbeddingProvider;
use assessrec::embedding::local::LocalEmbeddingProvider;
use assessrec::embedding::openai::OpenAIEmbeddingProvider;
use assessrec::engine::{EngineSlot, RecommendationEngine};
use assessrec::errors::RecommendError;
use assessrec::logging;
use assessrec::rerank::RerankProvider;
use assessrec::rerank::local::LocalRerankProvider;
use assessrec::server::RecommendService;
use rmcp::ServiceExt;

#[derive(Parser)]
#[command(name = "assessrec", version, about = "Assessment recommendation server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single query and print the results as JSON
    Recommend {
        /// Job description or skill query
        #[arg(long)]
        query: String,
        /// Number of results (default: retrieval.default_k)
        #[arg(long)]
        k: Option<usize>,
    },
    /// Corpus inspection
    Corpus {
        #[command(subcommand)]
        action: CorpusAction,
    },
}

#[derive(Subcommand)]
enum CorpusAction {
    /// Load the corpus and report accepted/skipped records and test type counts
    Check {
        /// Corpus file (default: corpus_path from config)
        #[arg(long)]
        path: Option<String>,
    },
}

/// Create the embedding provider based on configuration.
async fn create_embedding_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.embedding.provider.as_str() {
        "openai" => {
            let api_key = config.embedding.openai_api_key.clone()
                .ok_or_else(|| anyhow::anyhow!(
                    "OpenAI API key required when provider is 'openai'. \
                     Set ASSESSREC_EMBEDDING__OPENAI_API_KEY or embedding.openai_api_key in assessrec.toml"
                ))?;
            Ok(Arc::new(OpenAIEmbeddingProvider::new(
                api_key,
                config.embedding.openai_model.clone(),
            )?))
        }
        "local" => {
            Ok(Arc::new(LocalEmbeddingProvider::new(
                &config.embedding.model,
                &config.embedding.cache_dir,
                config.embedding.batch_size,
            ).await?))
        }
        other => Err(RecommendError::Config(format!(
            "Unknown embedding provider '{}', expected 'local' or 'openai'",
            other
        )).into()),
    }
}

/// Create the cross-encoder based on configuration.
async fn create_rerank_provider(config: &Config) -> Result<Arc<dyn RerankProvider>> {
    Ok(Arc::new(LocalRerankProvider::new(
        &config.reranker.model,
        &config.reranker.cache_dir,
    ).await?))
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });

    // 3. Initialize logging FIRST (before any other output)
    // Logging goes to stderr only; stdout is reserved for JSON-RPC / JSON results
    logging::init_logging(&config);

    // Settings the engine cannot run with are fatal
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // 4. Handle subcommands
    match cli.command {
        Some(Commands::Corpus { action: CorpusAction::Check { path } }) => {
            let path = path.unwrap_or_else(|| config.corpus_path.clone());
            let corpus = Corpus::load(&path)?;
            let report = serde_json::json!({
                "path": path,
                "report": corpus.report(),
                "test_type_counts": corpus.test_type_counts(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Some(Commands::Recommend { query, k }) => {
            let embedder = create_embedding_provider(&config).await?;
            let reranker = create_rerank_provider(&config).await?;
            let engine = RecommendationEngine::from_path(
                &config.corpus_path,
                embedder,
                reranker,
                config.retrieval.clone(),
                config.embedding.batch_size,
            )
            .await?;
            let k = k.unwrap_or_else(|| engine.default_k());
            let results = engine.recommend(&query, k).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }

        None => {
            // Default: start the MCP server
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                corpus_path = %config.corpus_path,
                "assessrec server starting"
            );

            // 5. Load models (blocking until weights are available)
            let embedder = create_embedding_provider(&config).await?;
            let reranker = create_rerank_provider(&config).await?;

            // 6. Build the engine in the background so health_check can report progress
            let slot = Arc::new(EngineSlot::new());
            let (fail_tx, fail_rx) = tokio::sync::oneshot::channel();
            {
                let slot = slot.clone();
                let embedder = embedder.clone();
                let reranker = reranker.clone();
                let config = config.clone();
                tokio::spawn(async move {
                    let built = RecommendationEngine::from_path(
                        &config.corpus_path,
                        embedder,
                        reranker,
                        config.retrieval.clone(),
                        config.embedding.batch_size,
                    )
                    .await;
                    match built {
                        Ok(engine) => {
                            slot.publish(engine);
                            tracing::info!("Recommendation engine ready");
                        }
                        Err(e) => {
                            let _ = fail_tx.send(e);
                        }
                    }
                });
            }

            // 7. Serve via stdio transport
            let service = RecommendService::new(slot, embedder, reranker, config);
            let (stdin, stdout) = rmcp::transport::io::stdio();
            let server = service.serve((stdin, stdout)).await?;

            tracing::info!("assessrec server running — awaiting tool calls via stdio");

            // 8. Wait for shutdown, or stop early if the initial build fails
            tokio::select! {
                res = server.waiting() => {
                    res?;
                }
                Ok(err) = fail_rx => {
                    tracing::error!(error = %err, "Initial engine build failed");
                    return Err(err.into());
                }
            }

            tracing::info!("assessrec server stopped");
        }
    }

    Ok(())
}
