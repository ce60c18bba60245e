use anyhow::{Context, Result, bail};
use cellgraph_core::{CellId, CellIndex, CellKind, GraphConfig, Point, Rect};
use cellgraph_model::{GraphModel, GraphSnapshot, codec};
use cellgraph_view::{GraphView, ValidationReport};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cellgraph", author, version, about = "Inspect cellgraph snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON file with a graph configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a snapshot, validate a view over it and print the cell states
    Inspect {
        /// Snapshot file
        path: PathBuf,

        /// View scale
        #[arg(long)]
        scale: Option<f64>,

        /// View translation as `x,y`
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        translate: Option<Point>,

        /// Id of the cell to use as the view's current root
        #[arg(long)]
        root: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print cell counts and the graph bounds of a snapshot
    Stats {
        /// Snapshot file
        path: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_point(raw: &str) -> Result<Point, String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected x,y but got '{raw}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid coordinate '{v}': {e}"))
    };
    Ok(Point::new(parse(x)?, parse(y)?))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GraphConfig> {
    let Some(path) = path else {
        return Ok(GraphConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    GraphConfig::from_json_str(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn load_snapshot(path: &Path) -> Result<GraphSnapshot> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot = GraphSnapshot::from_json(&json)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;
    debug!(cells = snapshot.len(), path = %path.display(), "snapshot loaded");
    Ok(snapshot)
}

/// A model holding the snapshot below its root.
fn build_model(snapshot: &GraphSnapshot, config: &GraphConfig) -> Result<GraphModel> {
    let mut model = GraphModel::new(config);
    let root = model.root();
    codec::import(&mut model, snapshot, root, 0.0, 0.0).context("importing snapshot")?;
    Ok(model)
}

#[derive(Debug, Serialize)]
struct StateRow {
    id: String,
    kind: CellKind,
    text: String,
    bounds: Rect,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    points: Vec<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    fallback: bool,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    scale: f64,
    translate: Point,
    states: Vec<StateRow>,
    diagnostics: Vec<String>,
}

fn cell_name(model: &GraphModel, cell: CellIndex) -> String {
    model
        .id(cell)
        .map(|id| id.to_string())
        .unwrap_or_else(|| cell.to_string())
}

fn inspect_output(model: &GraphModel, view: &GraphView, report: &ValidationReport) -> InspectOutput {
    let mut states: Vec<_> = view.states().filter(|s| !s.kind.is_group()).collect();
    states.sort_by_key(|s| s.cell);
    let states = states
        .into_iter()
        .map(|s| StateRow {
            id: cell_name(model, s.cell),
            kind: s.kind,
            text: s.text.clone(),
            bounds: s.bounds,
            points: s.absolute_points.clone(),
            source: s.visible_source.map(|c| cell_name(model, c)),
            target: s.visible_target.map(|c| cell_name(model, c)),
            fallback: s.routing_fallback,
        })
        .collect();
    InspectOutput {
        scale: view.scale(),
        translate: view.translate(),
        states,
        diagnostics: report
            .diagnostics
            .iter()
            .map(|d| format!("{}: {}", cell_name(model, d.cell), d.message))
            .collect(),
    }
}

fn fmt_rect(r: &Rect) -> String {
    format!("({}, {}) {}x{}", r.x, r.y, r.width, r.height)
}

fn render_text(output: &InspectOutput) -> String {
    let mut out = String::new();
    for row in &output.states {
        let _ = write!(out, "{:<12} {:<7} {}", row.id, row.kind.to_string(), fmt_rect(&row.bounds));
        if !row.text.is_empty() {
            let _ = write!(out, " \"{}\"", row.text);
        }
        if row.kind.is_edge() {
            let ends = |end: &Option<String>| end.clone().unwrap_or_else(|| "-".to_string());
            let _ = write!(out, " {} -> {}", ends(&row.source), ends(&row.target));
            let route: Vec<_> = row.points.iter().map(|p| format!("({}, {})", p.x, p.y)).collect();
            let _ = write!(out, " [{}]", route.join(" "));
            if row.fallback {
                out.push_str(" (fallback)");
            }
        }
        out.push('\n');
    }
    for diagnostic in &output.diagnostics {
        let _ = writeln!(out, "warning: {diagnostic}");
    }
    out
}

/// View settings applied before validation.
#[derive(Debug, Default)]
struct ViewOptions {
    scale: Option<f64>,
    translate: Option<Point>,
    root: Option<CellId>,
}

fn inspect(
    snapshot: &GraphSnapshot,
    config: &GraphConfig,
    options: &ViewOptions,
    format: OutputFormat,
) -> Result<String> {
    let model = build_model(snapshot, config)?;
    let mut view = GraphView::new(&config.view);
    if let Some(scale) = options.scale {
        view.set_scale(scale)?;
    }
    if let Some(translate) = options.translate {
        view.set_translate(translate);
    }
    if let Some(id) = &options.root {
        view.set_current_root(Some(model.require_by_id(id)?));
    }
    let report = view.validate(&model);
    info!(
        states = view.state_count(),
        diagnostics = report.diagnostics.len(),
        "view validated"
    );

    let output = inspect_output(&model, &view, &report);
    match format {
        OutputFormat::Text => Ok(render_text(&output)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&output)? + "\n"),
    }
}

fn stats(snapshot: &GraphSnapshot, config: &GraphConfig) -> Result<String> {
    let model = build_model(snapshot, config)?;
    let cells = model.descendants(None);
    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    let mut depth_max = 0;
    let mut collapsed = 0;
    let mut dangling = 0;
    for &cell in cells.iter().filter(|&&c| c != model.root()) {
        let Some(kind) = model.kind(cell) else {
            continue;
        };
        *kinds.entry(kind.to_string()).or_default() += 1;
        let depth = std::iter::successors(model.parent(cell), |&p| model.parent(p)).count();
        depth_max = depth_max.max(depth);
        if model.is_collapsed(cell) {
            collapsed += 1;
        }
        if kind.is_edge() && (model.terminal(cell, true).is_none() || model.terminal(cell, false).is_none()) {
            dangling += 1;
        }
    }

    let mut view = GraphView::new(&config.view);
    view.validate(&model);

    let mut out = String::new();
    writeln!(out, "cells: {}", cells.len() - 1)?;
    for (kind, count) in &kinds {
        writeln!(out, "  {kind}: {count}")?;
    }
    writeln!(out, "depth: {depth_max}")?;
    writeln!(out, "collapsed: {collapsed}")?;
    writeln!(out, "dangling edges: {dangling}")?;
    match view.graph_bounds() {
        Some(bounds) => writeln!(out, "bounds: {}", fmt_rect(&bounds))?,
        None => writeln!(out, "bounds: empty")?,
    }
    Ok(out)
}

fn run(cli: Cli) -> Result<String> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Inspect {
            path,
            scale,
            translate,
            root,
            format,
        } => {
            if scale.is_some_and(|s| s <= 0.0) {
                bail!("--scale must be positive");
            }
            let snapshot = load_snapshot(&path)?;
            let options = ViewOptions {
                scale,
                translate,
                root: root.map(CellId::from),
            };
            inspect(&snapshot, &config, &options, format)
        }
        Commands::Stats { path } => stats(&load_snapshot(&path)?, &config),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = run(cli)?;
    print!("{output}");
    Ok(())
}
