use std::env;

use anyhow::bail;

use hotelq_cli::{geo_cache, init_tracing, spinner};
use hotelq_core::config::Config;

const USAGE: &str = "Usage: hotelq-geo <warm|clear|regions|lookup NAME|resolve TEXT|mentions TEXT>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else { bail!(USAGE) };
    let text = args.collect::<Vec<_>>().join(" ");

    let config = Config::load()?.app()?;
    let cache = geo_cache(&config, &env::current_dir()?)?;

    if cmd == "clear" {
        cache.clear_cache().await?;
        println!("Geo cache cleared");
        return Ok(());
    }

    let pb = spinner("loading geo cache");
    cache.initialize().await?;
    pb.finish_and_clear();

    match cmd.as_str() {
        "warm" => {
            if let Some(m) = cache.manifest() {
                println!(
                    "Geo cache ready: {} regions, {} subregions ({} d{})",
                    m.regions, m.subregions, m.embedder_id, m.dim
                );
            }
        }
        "regions" => {
            for region in cache.regions()? {
                let subs: Vec<String> =
                    cache.subregions_of(region.id)?.into_iter().map(|s| s.name).collect();
                println!("{:>4} {}  [{}]", region.id, region.name, subs.join(", "));
            }
        }
        "lookup" if !text.is_empty() => {
            match cache.lookup_region(&text)? {
                Some(m) => println!(
                    "region     {} {} ({:?}, {:.3})",
                    m.entity.id, m.entity.name, m.kind, m.score
                ),
                None => println!("region     -"),
            }
            match cache.lookup_subregion(&text)? {
                Some(m) => println!(
                    "subregion  {} {} ({:?}, {:.3})",
                    m.entity.id, m.entity.name, m.kind, m.score
                ),
                None => println!("subregion  -"),
            }
        }
        "resolve" if !text.is_empty() => {
            let res = cache.resolve(&text)?;
            println!("region:    {:?}", res.region.map(|r| (r.id, r.name)));
            println!("subregion: {:?}", res.subregion.map(|s| (s.id, s.name)));
        }
        "mentions" if !text.is_empty() => {
            for m in cache.mentions(&text)? {
                println!("{:?} {} {} [{}..{}]", m.level, m.id, m.name, m.start, m.end);
            }
        }
        _ => bail!(USAGE),
    }
    Ok(())
}
