use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use topic_engine::sweep::Outcome;
use topic_engine::{
    select_best, AuditTrail, CancellationToken, EngineConfig, Query, ResultTable, TopicEngine,
};

const TOPIC_TERMS_SHOWN: usize = 10;

#[derive(Parser, Debug)]
#[command(version, about = "Discover topics in earnings-call transcripts", long_about = None)]
struct Args {
    /// JSON engine configuration
    #[clap(short, long)]
    config: PathBuf,
    #[clap(short, long, help = "Query the selected model with this text instead of sampling the corpus")]
    test_doc: Option<String>,
    #[clap(short, long, help = "Audit trail path (default: topic_engine_audit_trail.txt beside the config)")]
    audit: Option<PathBuf>,
    #[clap(short, long, help = "Log per-pass training detail")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = EngineConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let audit_path = args
        .audit
        .clone()
        .or_else(|| config.audit_path.clone())
        .unwrap_or_else(|| AuditTrail::default_path(&args.config));
    let sample_size = config.sample_size;

    let engine = TopicEngine::new(config)?;
    let documents = engine.load_documents().context("reading documents")?;
    let prepared = engine.prepare(documents)?;
    info!(
        "Corpus ready: {} documents, {} terms",
        prepared.len(),
        prepared.vocabulary.len()
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            warn!("Interrupt received, finishing running models");
            cancel.cancel();
        })
        .context("installing interrupt handler")?;
    }

    let audit = Arc::new(
        AuditTrail::open(&audit_path).with_context(|| format!("opening {}", audit_path.display()))?,
    );
    let table = engine.sweep(&prepared, cancel.clone(), Some(audit))?;
    print_table(&table);

    let (best, model) = select_best(&table)?;
    println!("\nSelected model: {}", best);
    for topic in 0..model.num_topics() {
        println!(
            "  topic {}: {}",
            topic,
            model.format_topic(topic, TOPIC_TERMS_SHOWN, &prepared.vocabulary)
        );
    }
    if cancel.is_cancelled() {
        println!("(sweep interrupted; selection covers completed models only)");
    }

    let request = match args.test_doc {
        Some(text) => Query::Document(text),
        None => Query::Sample(sample_size),
    };
    let hits = engine.query(&prepared, model, &request)?;
    println!("\nQuery results:");
    for hit in hits {
        let label = match hit.document {
            Some(index) => prepared.documents[index].id.clone(),
            None => "test document".to_string(),
        };
        let topics: Vec<String> = hit
            .topics
            .iter()
            .map(|(topic, score)| format!("{}:{:.3}", topic, score))
            .collect();
        println!("  {}: {}", label, topics.join(" "));
        if let Some((lead, terms)) = hit.lead_topic(model, &prepared.vocabulary, TOPIC_TERMS_SHOWN) {
            println!("    topic {}: {}", lead, terms);
        }
    }

    Ok(())
}

fn print_table(table: &ResultTable) {
    println!("\n{:>7} {:>7} {:>9} {:>10}  {}", "topics", "passes", "corpus", "coherence", "notes");
    for (params, entry) in table.iter() {
        let (score, notes) = match &entry.outcome {
            Outcome::Succeeded { coherence, .. } => (format!("{:.4}", coherence), String::new()),
            Outcome::Failed { reason } => ("-".to_string(), reason.clone()),
            Outcome::Cancelled => ("-".to_string(), "cancelled".to_string()),
        };
        println!(
            "{:>7} {:>7} {:>9} {:>10}  {}",
            params.topic_count, params.iteration_budget, params.encoding.as_str(), score, notes
        );
    }
    println!("{} of {} models succeeded", table.successes(), table.len());
}
