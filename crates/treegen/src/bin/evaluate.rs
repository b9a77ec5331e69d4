//! Trains a TGen model on one AST corpus and evaluates it on another.
//!
//! ```text
//! evaluate --training-data train.json --evaluation-data eval.json \
//!     --tgen-program model.tgen [--is-for-node-type] [--metric errorrate]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use treegen::counts::SmoothingKind;
use treegen::data::{load_corpus, CorpusOptions, DEFAULT_MAX_TREE_SIZE, DEFAULT_PARSE_THREADS};
use treegen::model::{MetricComputation, MetricKind, ModelConfig, TGenModel};
use treegen::tree::FullCursor;
use treegen::{ExecutionContext, StringInterner, TGenProgram};

#[derive(Parser, Debug)]
#[command(about = "Train a TGen model over ASTs and evaluate it")]
struct Args {
    /// File with the training ASTs, one JSON array per line.
    #[arg(long)]
    training_data: PathBuf,

    /// File with the evaluation ASTs.
    #[arg(long)]
    evaluation_data: PathBuf,

    /// File with the TGen program.
    #[arg(long)]
    tgen_program: PathBuf,

    /// Predict node types; the default is node values.
    #[arg(long)]
    is_for_node_type: bool,

    /// Maximum number of training ASTs to load.
    #[arg(long, default_value_t = 100_000)]
    num_training_asts: usize,

    /// Maximum number of evaluation ASTs to load.
    #[arg(long, default_value_t = 50_000)]
    num_eval_asts: usize,

    /// Skip trees with more nodes than this.
    #[arg(long, default_value_t = DEFAULT_MAX_TREE_SIZE)]
    max_tree_size: usize,

    /// Smoothing: wittenbell, kneserney or laplace.
    #[arg(long, default_value = "wittenbell")]
    smoothing: String,

    /// Fixed Kneser-Ney discount in (0, 1); estimated per feature length
    /// when unset.
    #[arg(long)]
    kneser_ney_d: Option<f64>,

    /// Number of best labels to try at each model order.
    #[arg(long, default_value_t = 4)]
    beam_size: usize,

    /// Disable TEq label remapping.
    #[arg(long)]
    no_teq: bool,

    /// Metric to evaluate: entropy, errorrate or confidence50. Defaults to
    /// the model's default metric.
    #[arg(long)]
    metric: Option<String>,

    /// Worker threads parsing corpus JSON; 1 parses on the main thread.
    #[arg(long, default_value_t = DEFAULT_PARSE_THREADS)]
    threads: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let smoothing = match args.smoothing.parse::<SmoothingKind>()? {
        SmoothingKind::KneserNey { .. } => SmoothingKind::KneserNey {
            fixed_delta: args.kneser_ney_d,
        },
        other => other,
    };
    let config = ModelConfig::builder()
        .smoothing(smoothing)
        .beam_size(args.beam_size)
        .enable_teq(!args.no_teq)
        .build();
    let metric_kind = match &args.metric {
        Some(name) => name.parse::<MetricKind>()?,
        None => config.default_metric,
    };

    let mut interner = StringInterner::new();
    let tgen_program = TGenProgram::load_from_path(&args.tgen_program, &mut interner)?;

    info!("loading training data");
    let training_options = CorpusOptions {
        max_records: args.num_training_asts,
        max_tree_size: args.max_tree_size,
        parse_threads: args.threads,
    };
    let trees = load_corpus(&args.training_data, &training_options, &mut interner)?;
    info!(trees = trees.len(), "training data loaded");

    info!("loading evaluation data");
    let eval_options = CorpusOptions {
        max_records: args.num_eval_asts,
        ..training_options
    };
    let eval_trees = load_corpus(&args.evaluation_data, &eval_options, &mut interner)?;
    info!(trees = eval_trees.len(), "evaluation data loaded");

    info!("training");
    let mut model = TGenModel::new(tgen_program, args.is_for_node_type, config);
    for tree in &trees {
        let exec = ExecutionContext::new(tree);
        for node_id in 0..tree.len() as i32 {
            model.train_sample(model.start_id(), &exec, FullCursor::new(tree, node_id));
        }
    }
    model.end_training();
    info!("training done");

    info!(metric = %metric_kind, "evaluating");
    let mut metric = MetricComputation::new(metric_kind);
    for tree in &eval_trees {
        let exec = ExecutionContext::new(tree);
        for node_id in 0..tree.len() as i32 {
            metric.add_sample(&model, &exec, node_id);
        }
    }
    info!(samples = metric.num_samples(), "evaluation done");

    println!("{} = {:.4}", metric_kind, metric.value());
    Ok(())
}
