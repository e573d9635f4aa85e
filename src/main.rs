use clap::Parser;
use cranbert::{
    ConfigDb,
    CorpusDir,
    DataDir,
    EmbeddingDb,
    Engine,
    IndexPaths,
    LexicalDb,
    ModelManager,
    cli::{
        Cli,
        Command,
        EvalArgs,
        FeedbackArgs,
        IndexArgs,
        ModelAction,
        SearchArgs,
    },
    config_db::MODEL_SETTING,
    error::Result,
    eval::{self, EvalParams},
    feedback::{Feedback, RocchioWeights},
    model_manager::{DEFAULT_MODEL_ID, resolve_model_id},
    search::{self, SearchParams},
};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("CRANBERT_LOG") {
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

/// Shared state every index-backed command needs.
struct Context {
    data_dir: DataDir,
    config_db: ConfigDb,
    corpus: CorpusDir,
    model_override: Option<String>,
    progress: bool,
}

impl Context {
    fn model(&self) -> Result<ModelManager> {
        let (model_id, _) =
            resolve_model_id(self.model_override.as_deref(), &self.config_db)?;
        Ok(ModelManager::with_model_id(model_id))
    }

    fn open_engine(&self) -> Result<Engine> {
        Engine::open(
            &IndexPaths::from_data_dir(&self.data_dir),
            &self.corpus,
            self.model()?,
            self.progress,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;
    let corpus = CorpusDir::open(&data_dir.corpus_dir(cli.corpus.as_deref()));

    let ctx = Context {
        data_dir,
        config_db,
        corpus,
        model_override: cli.model,
        progress: !cli.quiet,
    };

    match cli.command {
        Command::Index(args) => cmd_index(&ctx, &args)?,
        Command::Search(args) => cmd_search(&ctx, &args)?,
        Command::Feedback(args) => cmd_feedback(&ctx, &args)?,
        Command::Eval(args) => cmd_eval(&ctx, &args)?,
        Command::Status(args) => cmd_status(&ctx, args.json)?,
        Command::Model { action } => match action {
            ModelAction::Show { json } => model_show(&ctx, json)?,
            ModelAction::Set { model } => {
                ctx.config_db.set_setting(MODEL_SETTING, &model)?;
                println!("Default model set to '{model}'");
                println!("Run `cranbert index --rebuild` to re-encode the corpus.");
            }
            ModelAction::Clear => {
                if ctx.config_db.remove_setting(MODEL_SETTING)? {
                    println!("Cleared stored model; using {DEFAULT_MODEL_ID}");
                } else {
                    println!("No stored model setting");
                }
            }
        },
        Command::Completions(args) => args.generate(),
    }

    Ok(())
}

fn cmd_index(ctx: &Context, args: &IndexArgs) -> Result<()> {
    let engine = if args.rebuild {
        Engine::rebuild(
            &IndexPaths::from_data_dir(&ctx.data_dir),
            &ctx.corpus,
            ctx.model()?,
            ctx.progress,
        )?
    } else {
        ctx.open_engine()?
    };

    let lexical = engine.lexical();
    let semantic = engine.semantic();
    println!(
        "Lexical index: {} documents x {} terms ({} non-zero weights)",
        lexical.len(),
        lexical.model().n_terms(),
        lexical.matrix().nnz()
    );
    println!(
        "Semantic index: {} documents x {} dimensions ({})",
        semantic.len(),
        semantic.dim(),
        semantic.encoder_id()
    );
    Ok(())
}

fn cmd_search(ctx: &Context, args: &SearchArgs) -> Result<()> {
    let params = SearchParams::new(args.count, args.lambda)?;
    let mut engine = ctx.open_engine()?;
    let results = engine.search(&args.query, params)?;

    if args.json {
        search::format_json(&results, &args.query, params.lambda)?;
    } else {
        search::format_human(&results);
    }
    Ok(())
}

fn cmd_feedback(ctx: &Context, args: &FeedbackArgs) -> Result<()> {
    let params = SearchParams::new(args.count, args.lambda)?;
    let weights = RocchioWeights {
        alpha: args.alpha,
        beta: args.beta,
        gamma: args.gamma,
    };
    let feedback = Feedback {
        relevant: args.relevant.clone(),
        non_relevant: args.non_relevant.clone(),
    };

    let mut engine = ctx.open_engine()?;
    let outcome =
        engine.feedback_search(&args.query, &feedback, params, weights)?;

    if args.json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        if !outcome.skipped_ids.is_empty() {
            println!(
                "Skipped unknown document id(s): {}\n",
                outcome.skipped_ids.join(", ")
            );
        }
        search::format_human(&outcome.results);
    }
    Ok(())
}

fn cmd_eval(ctx: &Context, args: &EvalArgs) -> Result<()> {
    let params = EvalParams {
        k: args.k,
        lambda: args.lambda,
        feedback: args.feedback,
    };
    let queries = ctx.corpus.load_queries()?;
    let judgments = ctx.corpus.load_judgments()?;

    let mut engine = ctx.open_engine()?;
    let report = eval::evaluate(&mut engine, &queries, &judgments, params)?;

    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        eval::format_human(&report);
    }
    Ok(())
}

fn cmd_status(ctx: &Context, json: bool) -> Result<()> {
    let (model_id, source) =
        resolve_model_id(ctx.model_override.as_deref(), &ctx.config_db)?;

    let lexical = match LexicalDb::open_existing(&ctx.data_dir.lexical_db()) {
        Ok(db) => db.stats()?,
        Err(err) if err.is_missing_artifact() => None,
        Err(err) => return Err(err),
    };
    let semantic = match EmbeddingDb::open_existing(&ctx.data_dir.embeddings_db())
    {
        Ok(db) => db.stats()?,
        Err(err) if err.is_missing_artifact() => None,
        Err(err) => return Err(err),
    };

    if json {
        let status = serde_json::json!({
            "data_dir": ctx.data_dir.root(),
            "corpus_dir": ctx.corpus.root(),
            "model": model_id,
            "model_source": source.as_str(),
            "lexical": lexical.map(|s| serde_json::json!({
                "documents": s.documents,
                "terms": s.terms,
            })),
            "semantic": semantic.as_ref().map(|s| serde_json::json!({
                "documents": s.documents,
                "dimension": s.dimension,
                "encoder": s.encoder_id,
            })),
        });
        println!("{status}");
        return Ok(());
    }

    println!("Data directory: {}", ctx.data_dir.root().display());
    println!("Corpus: {}", ctx.corpus.root().display());
    println!("Model: {model_id} ({})", source.as_str());
    match lexical {
        Some(s) => {
            println!("Lexical index: {} documents, {} terms", s.documents, s.terms)
        }
        None => println!("Lexical index: not built"),
    }
    match &semantic {
        Some(s) => {
            println!(
                "Semantic index: {} documents x {} dimensions ({})",
                s.documents, s.dimension, s.encoder_id
            );
            if s.encoder_id != model_id {
                println!(
                    "  warning: built with a different model; run `cranbert index --rebuild`"
                );
            }
        }
        None => println!("Semantic index: not built"),
    }
    Ok(())
}

fn model_show(ctx: &Context, json: bool) -> Result<()> {
    let (model_id, source) =
        resolve_model_id(ctx.model_override.as_deref(), &ctx.config_db)?;
    let stored = ctx.config_db.get_setting(MODEL_SETTING)?;

    if json {
        let out = serde_json::json!({
            "model": model_id,
            "source": source.as_str(),
            "stored": stored,
        });
        println!("{out}");
    } else {
        println!("Model: {model_id}");
        println!("Source: {}", source.as_str());
        if let Some(stored) = stored {
            println!("Stored: {stored}");
        }
    }
    Ok(())
}
