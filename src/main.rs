use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::Path;

use raglet::chunk;
use raglet::config::{self, State};
use raglet::embed::{Embedder, GeminiEmbedder};
use raglet::generate::{build_prompt, GeminiGenerator};
use raglet::index::VectorIndex;
use raglet::pipeline::{assemble_context, Retriever};
use raglet::store::CorpusStore;

#[derive(Parser)]
#[command(name = "raglet")]
#[command(version = "0.1")]
#[command(about = "Retrieval-augmented lookup over tabular corpora", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest source CSVs, embed the chunks, and rebuild the corpus store
    Build,
    /// Print the chunks nearest to a query as JSON
    Search {
        query: String,
        /// Override the configured number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Answer a question using retrieved context
    Ask { query: String },
    /// Print the resolved configuration
    Config,
}

fn build_command(state: &State) -> Result<()> {
    let api_key = config::api_key()?;

    let (chunks, summary) = chunk::build_chunks(state)?;
    println!(
        "Found {} CSV files ({} skipped), {} chunks ({} rows skipped).",
        summary.files_found, summary.files_skipped, summary.chunks, summary.rows_skipped
    );
    if chunks.is_empty() {
        anyhow::bail!(
            "No chunks were built from '{}'; nothing to index.",
            state.source_dir
        );
    }

    println!("Embedding {} chunks...", chunks.len());
    let embedder = GeminiEmbedder::new(&api_key, state)?;
    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = embedder.embed(&texts)?;

    let mut index = VectorIndex::new();
    index.insert(&vectors)?;

    let store = CorpusStore::new(Path::new(&state.data_dir));
    store.save(&chunks, &index)?;
    println!(
        "Saved {} chunks ({} dimensions) to '{}'.",
        index.len(),
        index.dim().unwrap_or(0),
        state.data_dir
    );
    Ok(())
}

fn search_command(state: &State, query: &str, top_k: Option<usize>) -> Result<()> {
    let api_key = config::api_key()?;
    let k = top_k.unwrap_or(state.top_k);

    let store = CorpusStore::new(Path::new(&state.data_dir));
    if !store.exists() {
        anyhow::bail!(
            "No corpus store found in '{}'; run `raglet build` first.",
            state.data_dir
        );
    }
    let corpus = store.load()?;
    config::verbose_print(&format!("Loaded corpus with {} chunks", corpus.len()));

    let embedder = GeminiEmbedder::new(&api_key, state)?;
    let retriever = Retriever::new(&corpus, &embedder);
    let results = retriever.retrieve(query, k)?;

    let output = serde_json::json!({
        "query": query,
        "corpus_chunk_count": corpus.len(),
        "results": results.iter().map(|retrieved| {
            serde_json::json!({
                "ordinal": retrieved.ordinal,
                "distance": retrieved.distance,
                "category": retrieved.chunk.metadata.category,
                "source_file": retrieved.chunk.metadata.source_file,
                "text": retrieved.chunk.text,
            })
        }).collect::<Vec<_>>(),
        "actual_results_count": results.len(),
        "requested_results_count": k,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn ask_command(state: &State, query: &str) -> Result<()> {
    let api_key = config::api_key()?;

    let store = CorpusStore::new(Path::new(&state.data_dir));
    if !store.exists() {
        anyhow::bail!(
            "No corpus store found in '{}'; run `raglet build` first.",
            state.data_dir
        );
    }
    let corpus = store.load()?;

    let embedder = GeminiEmbedder::new(&api_key, state)?;
    let retriever = Retriever::new(&corpus, &embedder);
    let results = retriever.retrieve(query, state.top_k)?;

    if results.is_empty() {
        println!("No information found in the corpus for this question.");
        return Ok(());
    }

    let context = assemble_context(&results);
    config::verbose_print(&format!("Assembled context:\n{}", context));

    let generator = GeminiGenerator::new(&api_key, state)?;
    let answer = generator.generate(&build_prompt(&context, query))?;
    println!("{}", answer);
    Ok(())
}

fn config_command(state: &State) -> Result<()> {
    state.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let state = State::new()?;

    match args.command {
        Commands::Build => build_command(&state)?,
        Commands::Search { query, top_k } => search_command(&state, &query, top_k)?,
        Commands::Ask { query } => ask_command(&state, &query)?,
        Commands::Config => config_command(&state)?,
    }
    Ok(())
}
