use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use serde_json::json;

use hotelq_cli::{geo_cache, init_tracing, spinner, SpinnerProgress};
use hotelq_core::config::Config;
use hotelq_core::{fields, Context};
use hotelq_engine::testing::StaticBackend;
use hotelq_engine::Engine;

const USAGE: &str =
    "Usage: hotelq <query> [--fixtures FILE] [--destination NAME] [--session ID] [--json]";

struct Args {
    query: String,
    fixtures: PathBuf,
    destination: Option<String>,
    session: Option<String>,
    json: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut query = None;
    let mut fixtures = PathBuf::from("apps/hotelq-cli/data/hotels.json");
    let (mut destination, mut session, mut json) = (None, None, false);
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fixtures" => {
                fixtures = args.next().map(PathBuf::from).context("--fixtures requires a path")?
            }
            "--destination" => {
                destination = Some(args.next().context("--destination requires a name")?)
            }
            "--session" => session = Some(args.next().context("--session requires an id")?),
            "--json" => json = true,
            "-h" | "--help" => bail!(USAGE),
            _ if !arg.starts_with('-') => query = Some(arg),
            other => bail!("unknown flag {other}\n{USAGE}"),
        }
    }
    let query = query.context(USAGE)?;
    Ok(Args { query, fixtures, destination, session, json })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = parse_args()?;
    let config = Config::load()?.app()?;
    let base = env::current_dir()?;

    let geo = geo_cache(&config, &base)?;
    let backend = Arc::new(
        StaticBackend::load(&args.fixtures)
            .with_context(|| format!("loading {}", args.fixtures.display()))?,
    );
    let pb = spinner("resolving");
    let engine = Engine::builder()
        .config(&config.engine)
        .with_reference_pipeline(backend, geo)
        .progress(Arc::new(SpinnerProgress(pb.clone())))
        .build()?;

    let mut context = Context::new();
    if let Some(d) = args.destination {
        context.insert("destination".into(), json!(d));
    }
    if let Some(s) = args.session {
        context.insert("session_id".into(), json!(s));
    }

    let resolution = engine.run(&args.query, &context).await?;
    pb.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolution.state)?);
        return Ok(());
    }
    let state = &resolution.state;
    println!("Query: {}", args.query);
    println!("Status: {:?} after {} retries", resolution.status, resolution.retry_count());
    println!(
        "Regions: {:?}  Subregions: {:?}",
        state.ids(fields::REGION_IDS),
        state.ids(fields::SUBREGION_IDS)
    );
    println!(
        "Stay: {} → {}  Guests: {} adults, {} children",
        state.str_field(fields::CHECK_IN).unwrap_or("-"),
        state.str_field(fields::CHECK_OUT).unwrap_or("-"),
        state.i64_field(fields::ADULTS).unwrap_or(0),
        state.i64_field(fields::CHILDREN).unwrap_or(0),
    );
    for list in engine.routes().result_fields() {
        let records = state.list(list);
        println!("\n{list}: {}", records.len());
        for r in records {
            let label = r
                .get("name")
                .or_else(|| r.get("plan_name"))
                .or_else(|| r.get("hotel_name"))
                .and_then(|v| v.as_str())
                .unwrap_or("?");
            let price = r.get("price").map(|p| p.to_string()).unwrap_or_else(|| "-".into());
            println!("  - {label} ({price})");
        }
    }
    if let Some(message) = state.get(fields::RESPONSE).get("message").and_then(|m| m.as_str()) {
        println!("\n{message}");
    }
    if let Some(log) = state.str_field(fields::DIAGNOSTICS) {
        println!("\nDiagnostics:");
        for line in log.lines() {
            println!("  {line}");
        }
    }
    Ok(())
}
