//! Binary entry point for cardsmith.
//!
//! This binary provides the CLI over a component library manifest.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use cardsmith::config::CardsmithConfig;
use cardsmith::embedding::HashEmbedder;
use cardsmith::index::library_fingerprint;
use cardsmith::observability::{self, InitOptions};
use cardsmith::services::{
    BuildPlan, BuildRequest, ComponentEngine, EngineBoundaries, EngineSettings, PatternFilter,
};
use cardsmith::storage::{FilesystemTemplateStore, InMemoryVectorStore, SqliteResolutionStore};
use cardsmith::{ComponentLibrary, ComponentRegistry, Feedback, PatternId, ResolutionStore};

/// Cardsmith - semantic component discovery and pattern promotion.
#[derive(Parser)]
#[command(name = "cardsmith")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "CARDSMITH_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Library manifest (overrides the configured one).
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Index the library and print symbols and containment edges.
    Index,

    /// Parse notation and print its canonical form.
    Parse {
        /// Notation, e.g. `§[δ, Ƀ[ᵬ×2]]`.
        notation: String,
    },

    /// Validate notation against the library.
    Validate {
        /// Notation to validate.
        notation: String,
    },

    /// Plan a card build.
    Build {
        /// Components by path, name or symbol, root first.
        components: Vec<String>,

        /// Parameter values as KEY=VALUE (VALUE is JSON or a bare string).
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Intent; records the build as a pattern.
        #[arg(short, long)]
        description: Option<String>,

        /// Owning session or user.
        #[arg(long)]
        owner: Option<String>,

        /// Build from a promoted template instead of components.
        #[arg(short, long, conflicts_with = "components")]
        template: Option<String>,
    },

    /// Search components, or patterns with `--patterns`.
    Search {
        /// Natural-language query.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Search stored patterns instead of components.
        #[arg(long)]
        patterns: bool,

        /// Include promoted templates in pattern results.
        #[arg(long, requires = "patterns")]
        templates: bool,

        /// Only results involving every given component path.
        #[arg(long = "path")]
        paths: Vec<String>,
    },

    /// Record feedback for a pattern.
    Feedback {
        /// Pattern ID.
        pattern_id: String,

        /// positive, negative or unset.
        value: String,
    },

    /// List promoted templates, or show one.
    Templates {
        /// Template name.
        name: Option<String>,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match CardsmithConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Some(library) = cli.library.clone() {
        config = config.with_library(library);
    }

    let _observability = match observability::init_from_config(
        &config,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: false,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli, &config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: &CardsmithConfig) -> anyhow::Result<ExitCode> {
    let json = cli.json;
    match cli.command {
        Commands::Parse { notation } => cmd_parse(&notation, json),
        Commands::Index => cmd_index(config, json),
        Commands::Validate { notation } => cmd_validate(config, &notation, json),
        Commands::Build {
            components,
            params,
            description,
            owner,
            template,
        } => cmd_build(config, components, &params, description, owner, template, json),
        Commands::Search {
            query,
            limit,
            patterns,
            templates,
            paths,
        } => cmd_search(config, &query, limit, patterns, templates, paths, json),
        Commands::Feedback { pattern_id, value } => cmd_feedback(config, &pattern_id, &value, json),
        Commands::Templates { name } => cmd_templates(config, name.as_deref(), json),
    }
}

/// Composes and indexes an engine over the configured library.
fn open_engine(config: &CardsmithConfig) -> anyhow::Result<ComponentEngine> {
    let engine = compose_engine(config)?;
    engine.reindex()?;
    Ok(engine)
}

/// Composes an engine over the configured library without indexing it.
fn compose_engine(config: &CardsmithConfig) -> anyhow::Result<ComponentEngine> {
    let manifest = config
        .library
        .as_ref()
        .context("no component library configured (use --library, `library` or CARDSMITH_LIBRARY)")?;
    let registry = ComponentRegistry::load_manifest(manifest)
        .with_context(|| format!("loading library manifest {}", manifest.display()))?;
    let library: Arc<dyn ComponentLibrary> = Arc::new(registry);

    let resolution: Option<Arc<dyn ResolutionStore>> = if config.cache.l2_enabled {
        let fingerprint = library_fingerprint(&library.describe()?, &library.overrides())?;
        Some(Arc::new(SqliteResolutionStore::open(
            config.resolution_db_path(),
            &fingerprint,
        )?))
    } else {
        None
    };

    let boundaries = EngineBoundaries {
        library,
        store: Arc::new(InMemoryVectorStore::open(config.vector_snapshot_path())?),
        embedder: Arc::new(HashEmbedder::new()),
        resolution,
        artifacts: Arc::new(FilesystemTemplateStore::new(&config.templates_dir)?),
    };
    Ok(ComponentEngine::new(
        boundaries,
        EngineSettings::from_config(config)?,
    ))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_parse(notation: &str, json: bool) -> anyhow::Result<ExitCode> {
    let tree = cardsmith::dsl::parse(notation)?;
    if json {
        print_json(&json!({
            "canonical": tree.to_string(),
            "symbols": tree.symbols(),
            "instances": tree.instance_count(),
        }))?;
    } else {
        println!("{tree}");
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_index(config: &CardsmithConfig, json: bool) -> anyhow::Result<ExitCode> {
    let engine = compose_engine(config)?;
    let report = engine.reindex()?;
    let index = engine.index();
    if json {
        let components: Vec<Value> = index
            .components()
            .map(|c| json!({"path": c.path, "symbol": c.symbol, "kind": c.kind.as_str()}))
            .collect();
        let edges: Vec<Value> = index
            .graph()
            .edges()
            .iter()
            .map(|e| json!({"parent": e.parent, "child": e.child, "kind": e.kind.as_str()}))
            .collect();
        print_json(&json!({
            "fingerprint": index.fingerprint(),
            "components": components,
            "edges": edges,
            "rejected_edges": report.rejected_edges,
            "unresolved_hints": report.unresolved_hints,
        }))?;
        return Ok(ExitCode::SUCCESS);
    }

    println!("Indexed {} components ({})", index.len(), index.fingerprint());
    for component in index.components() {
        if let Some(symbol) = &component.symbol {
            println!("  {symbol}  {}", component.path);
        }
    }
    let edges = index.graph().edges();
    println!("{} containment edges", edges.len());
    for edge in edges {
        println!("  {} -> {} ({})", edge.parent, edge.child, edge.kind.as_str());
    }
    for edge in &report.rejected_edges {
        println!("  rejected {} -> {} (would close a cycle)", edge.parent, edge.child);
    }
    if !report.unresolved_hints.is_empty() {
        println!("unresolved type hints: {}", report.unresolved_hints.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(config: &CardsmithConfig, notation: &str, json: bool) -> anyhow::Result<ExitCode> {
    let engine = open_engine(config)?;
    let report = engine.validate(notation)?;
    if json {
        print_json(&report)?;
    } else if report.is_valid() {
        println!("valid");
    } else {
        println!("{report}");
    }
    Ok(if report.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[allow(clippy::too_many_arguments)]
fn cmd_build(
    config: &CardsmithConfig,
    components: Vec<String>,
    params: &[String],
    description: Option<String>,
    owner: Option<String>,
    template: Option<String>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let values = parse_params(params)?;
    let engine = open_engine(config)?;

    let plan = if let Some(name) = template {
        engine.plan_template(&name, &values)?
    } else {
        if components.is_empty() {
            bail!("give at least one component or --template");
        }
        let mut request = BuildRequest::new(components);
        request.params = values;
        request.description = description.unwrap_or_default();
        request.owner = owner;
        engine.plan(request)?
    };

    if json {
        print_json(&plan_json(&plan))?;
        return Ok(ExitCode::SUCCESS);
    }
    match &plan.notation {
        Some(notation) => println!("{notation}"),
        None => println!("(flat build)"),
    }
    for step in &plan.steps {
        let params = serde_json::to_string(&step.params)?;
        println!("  {} {params} [{}]", step.component.path, step.tier);
    }
    if let Some(id) = &plan.pattern_id {
        println!("pattern {id}");
    }
    Ok(ExitCode::SUCCESS)
}

fn plan_json(plan: &BuildPlan) -> Value {
    let steps: Vec<Value> = plan
        .steps
        .iter()
        .map(|step| {
            json!({
                "path": step.component.path,
                "name": step.component.name,
                "params": step.params,
                "tier": step.tier.as_str(),
            })
        })
        .collect();
    json!({
        "notation": plan.notation,
        "steps": steps,
        "pattern_id": plan.pattern_id.as_ref().map(PatternId::as_str),
    })
}

/// Parses `KEY=VALUE` pairs; values that are not JSON are taken as strings.
fn parse_params(params: &[String]) -> anyhow::Result<BTreeMap<String, Value>> {
    params
        .iter()
        .map(|pair| {
            let (key, raw) = pair
                .split_once('=')
                .with_context(|| format!("parameter '{pair}' is not KEY=VALUE"))?;
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

#[allow(clippy::fn_params_excessive_bools)]
fn cmd_search(
    config: &CardsmithConfig,
    query: &str,
    limit: Option<usize>,
    patterns: bool,
    templates: bool,
    paths: Vec<String>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let engine = open_engine(config)?;

    if !patterns {
        let hits = engine.search_components(query, &paths, limit)?;
        if json {
            print_json(&hits)?;
        } else {
            for hit in hits {
                let symbol = hit.symbol.as_deref().unwrap_or(" ");
                println!("{:.4}  {symbol}  {}", hit.score, hit.path);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut filter = PatternFilter::new();
    filter.paths = paths;
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }
    if templates {
        filter = filter.including_templates();
    }
    let hits = engine.similar_patterns(query, &filter)?;
    if json {
        let hits: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "id": hit.id,
                    "score": hit.score,
                    "type": hit.point_type.as_str(),
                    "description": hit.description,
                    "components": hit.components,
                    "params": hit.params,
                    "feedback": hit.feedback.as_str(),
                    "state": hit.state.as_str(),
                })
            })
            .collect();
        print_json(&hits)?;
    } else {
        for hit in hits {
            println!(
                "{:.4}  {}  {} [{}, {}]",
                hit.score, hit.id, hit.description, hit.feedback, hit.state
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_feedback(
    config: &CardsmithConfig,
    pattern_id: &str,
    value: &str,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let Some(feedback) = Feedback::parse(value) else {
        bail!("feedback must be positive, negative or unset, got '{value}'");
    };
    let engine = open_engine(config)?;
    let outcome = engine.feedback(&PatternId::new(pattern_id), feedback)?;
    if json {
        print_json(&outcome)?;
        return Ok(ExitCode::SUCCESS);
    }
    if outcome.promoted() {
        println!("{}: {} -> {}", outcome.pattern_id, outcome.previous, outcome.state);
    } else {
        println!("{}: {}", outcome.pattern_id, outcome.state);
    }
    if let Some(template) = &outcome.template {
        println!("template {template}");
    }
    if let Some(artifact) = &outcome.artifact {
        println!("artifact {}", artifact.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_templates(config: &CardsmithConfig, name: Option<&str>, json: bool) -> anyhow::Result<ExitCode> {
    let engine = open_engine(config)?;

    if let Some(name) = name {
        let template = engine.template(name)?;
        if json {
            print_json(&template)?;
        } else {
            println!("{}  {}", template.name, template.description);
            if let Some(notation) = &template.notation {
                println!("  {notation}");
            }
            for component in &template.components {
                println!("  {} {}", component.path, serde_json::to_string(&component.params)?);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let listings = engine.templates()?;
    if json {
        print_json(&listings)?;
    } else if listings.is_empty() {
        println!("no templates");
    } else {
        for listing in listings {
            println!("{}  [{}]  {}", listing.name, listing.state, listing.description);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_params() {
        let params = parse_params(&[
            "title=Deploy status".to_string(),
            "count=3".to_string(),
            "enabled=true".to_string(),
        ])
        .unwrap();
        assert_eq!(params["title"], json!("Deploy status"));
        assert_eq!(params["count"], json!(3));
        assert_eq!(params["enabled"], json!(true));
        assert!(parse_params(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_build() {
        let cli = Cli::try_parse_from([
            "cardsmith", "build", "Section", "DecoratedText", "-p", "text=hi", "-d", "status card",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Build { ref components, .. } if components.len() == 2));
    }
}
