// CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};

/// Nullpath - NPE-Candidate Analysis Engine
///
/// Ranks the methods of one class by how likely they are to raise a null
/// pointer exception, for use as fitness guidance by a test generator.
#[derive(Parser, Debug, Clone)]
#[command(name = "nullpath")]
#[command(author, version, about)]
#[command(long_about = "Nullpath analyzes a single target class, supplied as a JSON class model.

It builds a control flow graph per method and constructor, enumerates the
backward and def-use paths reaching each dereference, infers which values
may be null on those paths, and scores methods by complexity, parameter
count and the number of paths on which a null dereference is possible.

The analysis is heuristic: it neither proves nor refutes NPEs.")]
pub struct Cli {
    /// Path to the JSON class model
    #[arg(global = true, long, env = "NULLPATH_MODEL")]
    pub model: Option<String>,

    /// Path to a JSON analysis config
    #[arg(global = true, long)]
    pub config: Option<String>,

    /// Override the seed of the target chooser
    #[arg(global = true, long)]
    pub seed: Option<u64>,

    /// Output format
    #[arg(global = true, long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Human,
    /// Compact JSON for programmatic consumption
    Json,
    /// Formatted JSON with indentation
    Pretty,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the full analysis and report sites, scores and targets
    Analyze(AnalyzeArgs),

    /// Show the control-flow graph of a method or constructor
    Cfg(CfgArgs),

    /// Enumerate backward or def-use paths from a node
    Paths(PathsArgs),

    /// Draw target methods with score-weighted sampling
    Choose(ChooseArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Restrict the report to one method (signature or substring)
    #[arg(long)]
    pub method: Option<String>,

    /// Lines where an NPE has already been observed
    #[arg(long = "npe-line")]
    pub npe_lines: Vec<u32>,
}

#[derive(Parser, Debug, Clone)]
pub struct CfgArgs {
    /// Method signature or substring
    #[arg(long)]
    pub method: String,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<CfgFormat>,
}

#[derive(Parser, Debug, Clone)]
pub struct PathsArgs {
    /// Method signature or substring
    #[arg(long)]
    pub method: String,

    /// Start node id (defaults to the exit node)
    #[arg(long, conflicts_with = "line")]
    pub node: Option<usize>,

    /// Start at the first statement node on this source line
    #[arg(long)]
    pub line: Option<u32>,

    /// Enumerate def-use paths instead of backward paths
    #[arg(long)]
    pub def_use: bool,

    /// Maximum path length (for pruning)
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Maximum number of routes
    #[arg(long)]
    pub max_paths: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
pub struct ChooseArgs {
    /// Number of draws
    #[arg(long, default_value_t = 1)]
    pub count: usize,

    /// Also draw an influential parameter for each chosen method
    #[arg(long)]
    pub with_param: bool,
}

/// CFG output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgFormat {
    /// Human-readable text
    Human,
    /// Graphviz DOT format
    Dot,
    /// JSON export
    Json,
}

// ============================================================================
// Utility Functions
// ============================================================================

pub const DEFAULT_MODEL_PATH: &str = "./class-model.json";

/// Resolve the class model path from multiple sources
///
/// Priority: CLI arg > NULLPATH_MODEL env var > default "./class-model.json"
pub fn resolve_model_path(cli_model: Option<String>) -> anyhow::Result<String> {
    match cli_model {
        Some(path) => Ok(path),
        None => std::env::var("NULLPATH_MODEL").or_else(|_| Ok(DEFAULT_MODEL_PATH.to_string())),
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

pub mod cmds {
    use super::*;
    use crate::analysis::{AnalysisContext, Analyzer};
    use crate::cfg::{
        backward_paths, def_use_paths, detect_natural_loops, export_dot, export_json, find_exit, find_node_by_id,
        loop_subgraphs, Cfg,
    };
    use crate::config::{load_config, AnalysisConfig};
    use crate::model::{load_class_model, ClassModel};
    use crate::output::{self, JsonError, JsonResponse};
    use crate::registry::Signature;
    use anyhow::{Context, Result};
    use petgraph::graph::NodeIndex;
    use serde::Serialize;
    use std::path::Path;
    use std::rc::Rc;

    pub fn analyze(args: AnalyzeArgs, cli: &Cli) -> Result<()> {
        let mut analyzer = Analyzer::new(load_model(cli)?, load_analysis_config(cli)?);
        analyzer.run();
        for line in &args.npe_lines {
            analyzer.record_discovered_npe(*line);
        }

        let mut report = analyzer.report();
        if let Some(method) = &args.method {
            let sig = resolve_or_exit(analyzer.context(), method, cli.output);
            report.methods.retain(|m| m.record.signature == sig);
        }

        match cli.output {
            OutputFormat::Human => {
                output::header(&format!("Class {}", report.class));
                for (name, nullability) in report.fields.iter() {
                    println!("  field {}: {:?}", name, nullability);
                }
                if !report.found_npe_lines.is_empty() {
                    println!("  NPE already observed on lines {:?}", report.found_npe_lines);
                }
                println!();
                for method in &report.methods {
                    let record = &method.record;
                    let marker = if record.is_target { "*" } else { " " };
                    println!(
                        "{} {}  score={:.4} complexity={} returns_null={}",
                        marker,
                        output::highlight(record.signature.as_str()),
                        method.score,
                        record.complexity,
                        record.return_nullable.map_or("?".to_string(), |b| b.to_string()),
                    );
                    for site in &record.sites {
                        println!(
                            "      line {:>4}  paths={:<4} {}",
                            site.line, site.path_count, site.description
                        );
                    }
                }
                println!();
                if report.targets.is_empty() {
                    output::warn("No target methods (no visible method has a candidate site)");
                } else {
                    output::success(&format!("{} target method(s)", report.targets.len()));
                }
            }
            format => emit(format, &report),
        }
        Ok(())
    }

    pub fn cfg(args: CfgArgs, cli: &Cli) -> Result<()> {
        let mut ctx = AnalysisContext::new(load_model(cli)?, load_analysis_config(cli)?);
        let sig = resolve_or_exit(&ctx, &args.method, cli.output);
        let cfg = cfg_or_exit(&mut ctx, &sig, cli.output);

        let format = args.format.unwrap_or(match cli.output {
            OutputFormat::Human => CfgFormat::Human,
            OutputFormat::Json | OutputFormat::Pretty => CfgFormat::Json,
        });

        match format {
            CfgFormat::Dot => print!("{}", export_dot(&cfg)),
            CfgFormat::Json => emit(cli.output, &export_json(&cfg, sig.as_str())),
            CfgFormat::Human => {
                let export = export_json(&cfg, sig.as_str());
                output::header(&format!("CFG of {}", export.executable));
                for node in &export.nodes {
                    let line = node.line.map_or(String::from("-"), |l| l.to_string());
                    println!(
                        "  [{:>3}] {:<12} line {:<5} {}",
                        node.id,
                        node.kind,
                        line,
                        node.code.as_deref().unwrap_or("")
                    );
                }
                println!();
                for edge in &export.edges {
                    let back = if edge.back_edge { " (back)" } else { "" };
                    println!("  {} -> {} {}{}", edge.from, edge.to, edge.kind, back);
                }

                let natural = detect_natural_loops(&cfg);
                for lp in loop_subgraphs(&cfg) {
                    let nesting = natural
                        .iter()
                        .find(|n| n.header == lp.entry)
                        .map_or(0, |n| n.nesting_level(&natural));
                    println!(
                        "  loop at node {}: {} node(s), {} back edge(s), nesting {}",
                        cfg[lp.entry].id,
                        lp.size(),
                        lp.back_edges.len(),
                        nesting
                    );
                }
            }
        }
        Ok(())
    }

    pub fn paths(args: PathsArgs, cli: &Cli) -> Result<()> {
        let config = load_analysis_config(cli)?;
        let mut limits = config.limits.clone();
        if let Some(n) = args.max_length {
            limits = limits.with_max_length(n);
        }
        if let Some(n) = args.max_paths {
            limits = limits.with_max_paths(n);
        }

        let mut ctx = AnalysisContext::new(load_model(cli)?, config);
        let sig = resolve_or_exit(&ctx, &args.method, cli.output);
        let cfg = cfg_or_exit(&mut ctx, &sig, cli.output);

        let start = match start_node(&cfg, &args) {
            Some(start) => start,
            None => {
                let what = match (args.node, args.line) {
                    (Some(id), _) => format!("id {}", id),
                    (None, Some(line)) => format!("line {}", line),
                    (None, None) => "the exit".to_string(),
                };
                fail(cli.output, JsonError::node_not_found(&what), output::EXIT_NOT_FOUND);
            }
        };

        let paths = if args.def_use {
            def_use_paths(&cfg, start, None, &limits)
        } else {
            backward_paths(&cfg, start, None, &limits)
        };

        match cli.output {
            OutputFormat::Human => {
                let kind = if args.def_use { "def-use" } else { "backward" };
                output::header(&format!(
                    "{} {} path(s) from node {} of {}",
                    paths.len(),
                    kind,
                    cfg[start].id,
                    sig
                ));
                for path in &paths {
                    let route: Vec<String> = path.ids.iter().rev().map(|id| id.to_string()).collect();
                    println!("  {}  {}", &path.path_id[..12], route.join(" -> "));
                }
            }
            format => emit(format, &paths),
        }
        Ok(())
    }

    #[derive(Debug, Serialize)]
    struct Choice {
        signature: Signature,
        score: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        param: Option<usize>,
    }

    pub fn choose(args: ChooseArgs, cli: &Cli) -> Result<()> {
        if args.count == 0 {
            fail(cli.output, JsonError::invalid_input("--count must be at least 1"), output::EXIT_USAGE);
        }
        let mut analyzer = Analyzer::new(load_model(cli)?, load_analysis_config(cli)?);
        analyzer.run();

        let mut choices = Vec::with_capacity(args.count);
        for _ in 0..args.count {
            let Some(signature) = analyzer.choose_target_method() else {
                break;
            };
            let param = if args.with_param {
                analyzer.choose_influential_param(signature.as_str())
            } else {
                None
            };
            choices.push(Choice {
                score: analyzer.score(signature.as_str()),
                signature,
                param,
            });
        }

        match cli.output {
            OutputFormat::Human => {
                if choices.is_empty() {
                    output::warn("No target methods to choose from");
                }
                for choice in &choices {
                    match choice.param {
                        Some(p) => println!("{}  score={:.4}  param={}", choice.signature, choice.score, p),
                        None => println!("{}  score={:.4}", choice.signature, choice.score),
                    }
                }
            }
            format => emit(format, &choices),
        }
        Ok(())
    }

    fn load_model(cli: &Cli) -> Result<ClassModel> {
        let path = super::resolve_model_path(cli.model.clone())?;
        if !Path::new(&path).exists() {
            fail(cli.output, JsonError::model_not_found(&path), output::EXIT_FILE_NOT_FOUND);
        }
        load_class_model(Path::new(&path))
    }

    fn load_analysis_config(cli: &Cli) -> Result<AnalysisConfig> {
        let config = match &cli.config {
            Some(path) => load_config(Path::new(path)).context("could not load analysis config")?,
            None => AnalysisConfig::default(),
        };
        Ok(match cli.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        })
    }

    fn start_node(cfg: &Cfg, args: &PathsArgs) -> Option<NodeIndex> {
        match (args.node, args.line) {
            (Some(id), _) => find_node_by_id(cfg, id),
            (None, Some(line)) => cfg
                .node_indices()
                .filter(|&n| cfg[n].line == Some(line) && cfg[n].code.is_some())
                .min_by_key(|&n| cfg[n].id),
            (None, None) => find_exit(cfg),
        }
    }

    fn resolve_or_exit(ctx: &AnalysisContext, method: &str, format: OutputFormat) -> Signature {
        match ctx.classes().resolve(method) {
            Some(sig) => sig,
            None => fail(format, JsonError::method_not_found(method), output::EXIT_NOT_FOUND),
        }
    }

    fn cfg_or_exit(ctx: &mut AnalysisContext, sig: &Signature, format: OutputFormat) -> Rc<Cfg> {
        match ctx.cfg_of(sig) {
            Some(cfg) => cfg,
            None => fail(format, JsonError::cfg_error(sig.as_str()), output::EXIT_VALIDATION),
        }
    }

    fn fail(format: OutputFormat, err: JsonError, code: i32) -> ! {
        match format {
            OutputFormat::Human => {
                output::error(&err.message);
                if let Some(hint) = &err.remediation {
                    output::hint(hint);
                }
            }
            format => emit(format, &err),
        }
        std::process::exit(code);
    }

    fn emit<T: Serialize>(format: OutputFormat, data: &T) {
        let response = JsonResponse::new(data);
        match format {
            OutputFormat::Pretty => println!("{}", response.to_pretty_json()),
            OutputFormat::Json | OutputFormat::Human => println!("{}", response.to_json()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
