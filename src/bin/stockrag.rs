use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use stockrag::{
    ChunkIndex, Chunker, Embedder, Ingestor, OllamaGenerator, QueryRouter, RagConfig,
    StockLabeler,
    dump::{save_chunks_to_json, to_pretty_json, write_pretty_json},
    evaluation::{
        DEFAULT_OUTPUT, DEFAULT_QUESTION_SET, EvaluationObserver, EvaluationRecord,
        QuestionRecord, evaluate, load_question_set,
    },
    grab_all_documents,
    spinner::Spinner,
};

#[derive(Parser, Debug)]
#[command(
    name = "stockrag",
    about = "Index PDF stock reports and answer questions about them"
)]
struct Cli {
    /// TOML config file; ./stockrag.toml is used when present
    #[arg(long, global = true, env = "STOCKRAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split, label and index every PDF under the data directory
    Ingest {
        /// Delete the persisted index before ingesting
        #[arg(long, default_value_t = false)]
        reset: bool,

        /// Directory of PDF reports
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Where to write the JSON dump of all chunks
        #[arg(long)]
        dump: Option<PathBuf>,

        /// Show a spinner while chunks are embedded
        #[arg(long, default_value_t = false)]
        spinner: bool,
    },

    /// Answer one question from a single stock's reports
    Query {
        /// The question text
        query_text: String,

        /// Stock label to restrict retrieval to
        #[arg(long)]
        stock: String,

        /// Number of chunks retrieved as context
        #[arg(long)]
        top_k: Option<usize>,

        /// Show a spinner while the model generates
        #[arg(long, default_value_t = false)]
        spinner: bool,
    },

    /// Run a JSON question set and write a report
    Evaluate {
        /// JSON array of {question, stock, expected_answer}
        #[arg(long, alias = "question_set", default_value = DEFAULT_QUESTION_SET)]
        question_set: PathBuf,

        /// Report destination
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        #[arg(long, default_value_t = false)]
        spinner: bool,
    },

    /// Print every loaded PDF page with a content preview
    Inspect {
        #[arg(long)]
        data_path: Option<PathBuf>,
    },
}

const PREVIEW_CHARS: usize = 500;

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Ingest {
            reset,
            data_path,
            dump,
            spinner,
        } => ingest(&config, reset, data_path, dump, spinner),
        Command::Query {
            query_text,
            stock,
            top_k,
            spinner,
        } => query(&config, &query_text, &stock, top_k, spinner),
        Command::Evaluate {
            question_set,
            output,
            spinner,
        } => run_evaluation(&config, &question_set, &output, spinner),
        Command::Inspect { data_path } => inspect(&config, data_path),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn ingest(
    config: &RagConfig,
    reset: bool,
    data_path: Option<PathBuf>,
    dump: Option<PathBuf>,
    spinner: bool,
) -> Result<()> {
    if reset {
        println!("✨ Clearing Database");
        ChunkIndex::reset(&config.index.path).context("failed to clear the index")?;
    }

    let data_path = data_path.unwrap_or_else(|| config.data_path.clone());
    let docs = grab_all_documents(&data_path)
        .with_context(|| format!("failed to load PDFs from {}", data_path.display()))?;

    let chunker = Chunker::from_config(&config.chunking);
    let labeler = StockLabeler::from_config(&config.stocks);
    let ingestor = Ingestor::new(&chunker, &labeler, config.embedding.batch_size);
    let chunks = ingestor.prepare(&docs);

    let dump = dump.unwrap_or_else(|| config.debug_dump.clone());
    save_chunks_to_json(&chunks, &dump)
        .with_context(|| format!("failed to write {}", dump.display()))?;
    println!("Chunks saved to {}", dump.display());

    let mut index = ChunkIndex::open(&config.index).context("failed to open the index")?;
    println!("Number of existing documents in DB: {}", index.len());

    let plan = ingestor.plan(&chunks, &index)?;
    let pending = plan.pending();
    if pending == 0 {
        println!("✅ No new documents to add");
        return Ok(());
    }

    println!("👉 Adding new documents: {}", pending);
    let mut embedder = Embedder::new(&config.embedding)?;
    let progress = spinner.then(|| Spinner::start(format!("embedding {} chunks", pending)));
    let stats = ingestor.apply(plan, &mut index, &mut embedder)?;
    if let Some(progress) = progress {
        progress.finish(format!("stored {} chunks", stats.added));
    }
    log::info!("{:?}", stats);
    Ok(())
}

fn query(
    config: &RagConfig,
    question: &str,
    stock: &str,
    top_k: Option<usize>,
    spinner: bool,
) -> Result<()> {
    let index = ChunkIndex::open(&config.index).context("failed to open the index")?;
    let mut embedder = Embedder::new(&config.embedding)?;
    let generator = OllamaGenerator::new(&config.llm)?;

    let mut router = QueryRouter::new(&index, &mut embedder, &generator)
        .with_top_k(top_k.unwrap_or(config.query.top_k))
        .with_spinner(spinner);
    let result = router.query(question, stock)?;

    let sources: Vec<String> = result.sources.iter().map(|s| s.to_string()).collect();
    println!("Response: {}\nSources: {:?}", result.response, sources);
    Ok(())
}

struct ConsoleProgress;

impl EvaluationObserver for ConsoleProgress {
    fn started(&mut self, _index: usize, record: &QuestionRecord) {
        println!("\n正在處理問題：{} （個股：{}）", record.question, record.stock);
    }

    fn answered(&mut self, _index: usize, record: &EvaluationRecord) {
        println!("答案：{}", record.response);
    }
}

fn run_evaluation(
    config: &RagConfig,
    question_set: &Path,
    output: &Path,
    spinner: bool,
) -> Result<()> {
    let questions = load_question_set(question_set)
        .with_context(|| format!("failed to read question set {}", question_set.display()))?;

    let index = ChunkIndex::open(&config.index).context("failed to open the index")?;
    let mut embedder = Embedder::new(&config.embedding)?;
    let generator = OllamaGenerator::new(&config.llm)?;
    let mut router = QueryRouter::new(&index, &mut embedder, &generator)
        .with_top_k(config.query.top_k)
        .with_spinner(spinner);

    let results = evaluate(&mut router, &questions, &mut ConsoleProgress)?;

    println!("\n最終評估結果：");
    println!("{}", to_pretty_json(&results)?);
    write_pretty_json(output, &results)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("\n評估結果已存檔至：{}", output.display());
    Ok(())
}

fn inspect(config: &RagConfig, data_path: Option<PathBuf>) -> Result<()> {
    let data_path = data_path.unwrap_or_else(|| config.data_path.clone());
    let docs = grab_all_documents(&data_path)
        .with_context(|| format!("failed to load PDFs from {}", data_path.display()))?;

    for (i, doc) in docs.iter().enumerate() {
        let preview: String = doc.text.chars().take(PREVIEW_CHARS).collect();
        println!("Document {}", i + 1);
        println!("Metadata: source={}, page={}", doc.source, doc.page);
        println!("Content Preview: {}", preview);
        println!("{}", "-".repeat(50));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ingest_spinner_is_opt_in() {
        let cli = Cli::try_parse_from(["stockrag", "ingest"]).unwrap();
        assert!(matches!(cli.command, Command::Ingest { spinner: false, .. }));

        let cli = Cli::try_parse_from(["stockrag", "ingest", "--reset", "--spinner"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Ingest {
                spinner: true,
                reset: true,
                ..
            }
        ));
    }
}
