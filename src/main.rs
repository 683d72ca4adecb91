//! strata - inspect a hierarchical store of time-indexed report data.

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;
use clap::Parser;
use serde::Serialize;
use strata::{
    StrataConfig,
    cli::{Cli, Commands, WindowArgs},
    logger, merge,
    node::Payload,
    status::{StatusSummary, Timeslice, UpdateWindow},
    store::Store,
    tree::{Tree, View},
    utils::date::{parse_day, parse_instant, parse_instant_end},
};
use strata_table::{Format, Table, TzPipe};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::set_quiet(cli.quiet || cli.wants_json());
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Status {
            report,
            policy,
            window,
            json,
        } => {
            let mut store = Store::open(&config, report)?;
            store.refresh(timeslice(window)?, *policy)?;
            print_status(&store, *json)
        }
        Commands::Tree { report, depth } => {
            let store = Store::open(&config, report)?;
            print_tree(store.tree(), *depth);
            Ok(())
        }
        Commands::Show {
            report,
            key,
            tz,
            window,
            rows,
        } => {
            let store = Store::open(&config, report)?;
            let payload = store.query(key, &view(*tz, window)?)?;
            print_payload(key, &payload, *rows, &config.codec_format());
            Ok(())
        }
        Commands::Search {
            report,
            terms,
            best,
            kind,
        } => {
            let store = Store::open(&config, report)?;
            let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
            for key in store.search(&terms, *best, *kind) {
                println!("{key}");
            }
            Ok(())
        }
        Commands::Export {
            report,
            key,
            destination,
            tz,
            window,
        } => {
            let store = Store::open(&config, report)?;
            let written = store.export(key, destination, &view(*tz, window)?)?;
            for path in &written {
                println!("{}", path.display());
            }
            Ok(())
        }
        Commands::Diagnose {
            file,
            resolution,
            json,
        } => {
            let diagnosis = merge::diagnose(file, &config.codec_format(), *resolution)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&diagnosis)?);
            } else {
                println!("{diagnosis}");
            }
            Ok(())
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &Cli) -> Result<StrataConfig> {
    let mut config = if cli.config.exists() {
        StrataConfig::from_path(&cli.config)
            .with_context(|| format!("cannot load {}", cli.config.display()))?
    } else if cli.is_standalone() {
        StrataConfig::default()
    } else {
        bail!("Config file `{}` not found.", cli.config.display())
    };
    if let Some(root) = &cli.root {
        config.set_root(root);
    }
    config.validate()?;
    Ok(config)
}

fn timeslice(window: &WindowArgs) -> Result<Timeslice> {
    let day = |raw: &Option<String>| -> Result<_> {
        raw.as_deref()
            .map(|r| parse_day(r).with_context(|| format!("`{r}` is not a date")))
            .transpose()
    };
    Ok(Timeslice::between(day(&window.start)?, day(&window.end)?))
}

fn view(tz: Option<chrono_tz::Tz>, window: &WindowArgs) -> Result<View> {
    let instant = |raw: &Option<String>, parse: fn(&str) -> Option<NaiveDateTime>| -> Result<_> {
        raw.as_deref()
            .map(|r| parse(r).with_context(|| format!("`{r}` is not a date or instant")))
            .transpose()
    };
    let mut view = View::new().between(
        instant(&window.start, parse_instant)?,
        instant(&window.end, parse_instant_end)?,
    );
    if let Some(tz) = tz {
        view = view.with_tz(TzPipe::to(tz));
    }
    Ok(view)
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct StatusOutput {
    #[serde(flatten)]
    summary: StatusSummary,
    requirements: Option<UpdateWindow>,
}

fn print_status(store: &Store, json: bool) -> Result<()> {
    let status = store.status();
    if json {
        let output = StatusOutput {
            summary: status.summary(),
            requirements: status.requirements(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let summary = status.summary();
    let or_dash = |b: Option<strata::status::Bound>| b.map_or_else(|| "-".to_string(), |b| b.to_string());
    println!("report      {}", summary.report);
    println!("directory   {}", summary.dir.display());
    println!("exists      {}", summary.exists);
    println!("up to date  {}", summary.up_to_date);
    println!("observed    {} .. {}", or_dash(summary.observed_min), or_dash(summary.observed_max));
    println!("potential   {} .. {}", summary.potential_min, summary.potential_max);
    if !summary.missing.is_empty() {
        let dates: Vec<String> = summary.missing.iter().map(ToString::to_string).collect();
        println!("missing     {}", dates.join(", "));
    }
    if let Some(window) = status.requirements() {
        println!("next        {} .. {} ({} days)", window.start, window.end, window.days.len());
    }
    for warning in &summary.warnings {
        println!("warning     {warning}");
    }
    Ok(())
}

fn print_tree(tree: &Tree, depth: Option<usize>) {
    let root = tree.root();
    println!("{} ({})", root.name, root.path.display());
    for node in tree.descendants(root.id) {
        if depth.is_some_and(|d| node.depth > d) {
            continue;
        }
        let indent = "  ".repeat(node.depth);
        println!("{indent}{} [{}]", node.name, node.kind);
    }
}

fn print_payload(key: &str, payload: &Payload, rows: usize, format: &Format) {
    match payload.table() {
        Some(table) => print_table(table, rows, format),
        None => {
            for (name, child) in payload.children().into_iter().flatten() {
                println!("{key}.{name}: {} tables", child.leaf_count());
            }
        }
    }
}

/// The last `rows` rows of `table`, as delimited text.
fn print_table(table: &Table, rows: usize, format: &Format) {
    let separator = format.separator as char;
    let mut header = vec![table.index_name.to_string()];
    header.extend(table.columns.iter().map(|c| c.name.to_string()));
    println!("{}", header.join(&separator.to_string()));

    let start = table.len().saturating_sub(rows);
    for (row, key) in table.index.iter().enumerate().skip(start) {
        let mut line = table.wall(key.stamp).format("%Y-%m-%d %H:%M").to_string();
        if let Some(tag) = &key.tag {
            line.push(separator);
            line.push_str(tag);
        }
        for column in &table.columns {
            line.push(separator);
            if let Some(cell) = column.cells.get(row) {
                line.push_str(&cell.render(format.decimal));
            }
        }
        println!("{line}");
    }
    if start > 0 {
        println!("... {} earlier rows", start);
    }
}

