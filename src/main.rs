use clap::Parser;
use kvbridge::config::Config;
use kvbridge::core::{ConnectionRegistry, KeyValueStore};
use serde_json::Value as Json;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kvbridge")]
#[command(about = "Uniform key-value store adapter")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kvbridge.yaml")]
    config: String,

    /// Store name from the configuration
    #[arg(short, long)]
    store: String,

    /// Operation method, e.g. setCart, incrementHits or fetchAllCart
    method: String,

    /// Positional operation arguments, parsed as JSON where possible
    args: Vec<String>,
}

fn init_logging() {
    // Map RUST_LOG to a max level (trace/debug/info/warn/error)
    let level = match std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };

    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact()
        .with_max_level(level)
        .try_init();
}

/// Bare words that are not valid JSON become string arguments, so
/// `kvbridge ... appendCart item1` works without shell-quoted quotes.
fn parse_argument(raw: &str) -> Json {
    serde_json::from_str(raw).unwrap_or_else(|_| Json::String(raw.to_string()))
}

async fn run(args: &Args) -> Result<Json, Box<dyn std::error::Error>> {
    let config = Config::from_yaml_file(&args.config).await?;
    let store_config = config.store(&args.store)?;

    let registry = ConnectionRegistry::new();
    let store = KeyValueStore::factory(&registry, store_config).await?;
    info!(
        "Store '{}' bound to {}",
        args.store,
        store.backend().endpoint()
    );

    let call_args = args.args.iter().map(|raw| parse_argument(raw)).collect();
    let result = store.call(&args.method, call_args).await;
    registry.close_all().await;

    Ok(result?.into_json())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let args = Args::parse();

    match run(&args).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            error!("{} failed: {}", args.method, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_argument_json_and_bare_words() {
        assert_eq!(parse_argument("42"), Json::from(42));
        assert_eq!(parse_argument("[1,2]"), serde_json::json!([1, 2]));
        assert_eq!(parse_argument("item1"), Json::String("item1".into()));
        assert_eq!(parse_argument("\"item1\""), Json::String("item1".into()));
    }

    #[test]
    fn test_args_parse_from() {
        let args = Args::parse_from([
            "kvbridge", "--config", "/tmp/cfg.yaml", "--store", "sessions", "setCart", "[]", "60",
        ]);
        assert_eq!(args.config, "/tmp/cfg.yaml");
        assert_eq!(args.store, "sessions");
        assert_eq!(args.method, "setCart");
        assert_eq!(args.args, vec!["[]", "60"]);
    }

    #[tokio::test]
    async fn test_run_fails_on_missing_config_file() {
        let args = Args {
            config: "/nonexistent/kvbridge.yaml".to_string(),
            store: "main".to_string(),
            method: "getCart".to_string(),
            args: vec![],
        };
        assert!(run(&args).await.is_err());
    }
}
