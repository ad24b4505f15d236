// src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;

use universal_router::{
    cache::CacheManager,
    config::{load_config, Config},
    data::{load_venues, GraphBuilder, JsonRpcReader, PairFetcher, StaticPriceOracle, SubgraphIndexer},
    routing::{
        EnhanceOptions, ExistingRouteResponse, GraphRegistry, PairResolver, PathFinder, QuoteAggregator, RouteBuilder,
        RouteScorer, RouteServiceEnhancer, RouteValidator,
    },
    types::{ChainId, QuoteRequest},
    utils::setup_logging,
};

/// Multi-venue swap routing engine.
#[derive(Parser)]
#[command(name = "universal-router", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the liquidity graph of one chain and print the build report
    Refresh {
        #[arg(long)]
        chain_id: ChainId,
    },

    /// Rebuild the chain's graph, then route a swap through it
    Quote {
        #[arg(long)]
        chain_id: ChainId,

        /// Input token address
        #[arg(long)]
        from: String,

        /// Output token address
        #[arg(long)]
        to: String,

        /// Input amount in token units
        #[arg(long)]
        amount: f64,

        /// Input token USD price
        #[arg(long, default_value = "0.0")]
        input_price: f64,

        /// Output token USD price
        #[arg(long, default_value = "0.0")]
        output_price: f64,

        #[arg(long)]
        max_hops: Option<usize>,
    },
}

struct Stack {
    builder: Arc<GraphBuilder>,
    enhancer: RouteServiceEnhancer,
    prices: Arc<StaticPriceOracle>,
}

async fn build_stack(config: &Config) -> anyhow::Result<Stack> {
    let venues = load_venues(&config.venues_config_path)
        .with_context(|| format!("loading venues from {}", config.venues_config_path))?;
    info!("Loaded {} venues", venues.len());

    let indexer = Arc::new(SubgraphIndexer::new(config.request_timeout(), config.retry_policy())?);
    let reader = Arc::new(JsonRpcReader::new(
        config.rpc_urls.clone(),
        config.request_timeout(),
        config.retry_policy(),
    )?);
    let prices = Arc::new(StaticPriceOracle::new());
    let fetcher = Arc::new(PairFetcher::new(indexer, reader, prices.clone(), config.fetcher_config()));
    let cache = Arc::new(CacheManager::connect(&config.cache_config()).await);
    let graphs = Arc::new(GraphRegistry::new());

    let builder = Arc::new(GraphBuilder::new(
        Arc::clone(&graphs),
        fetcher,
        cache,
        venues,
        config.graph_builder_config(),
    ));

    let aggregator = Arc::new(
        QuoteAggregator::new(
            graphs,
            Arc::new(PathFinder::new(config.pathfinder_config())),
            RouteScorer::default(),
            RouteBuilder::new(config.builder_config(), RouteScorer::default()),
            config.aggregator_config(),
        )
        .with_pair_resolver(Arc::clone(&builder) as Arc<dyn PairResolver>),
    );
    let enhancer = RouteServiceEnhancer::new(
        aggregator,
        RouteValidator::new(config.validator_config()),
        Vec::new(),
        config.enhancer_config(),
    );

    Ok(Stack {
        builder,
        enhancer,
        prices,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config().context("loading configuration")?;
    setup_logging(&config.log_level).context("initializing logging")?;
    config.log_settings();

    let stack = build_stack(&config).await?;

    match cli.command {
        Command::Refresh { chain_id } => {
            let report = stack.builder.build_graph(chain_id).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Quote {
            chain_id,
            from,
            to,
            amount,
            input_price,
            output_price,
            max_hops,
        } => {
            let request = QuoteRequest::new(chain_id, from, to, amount);
            if input_price > 0.0 {
                stack.prices.set_price(chain_id, request.from_token.clone(), input_price);
            }
            if output_price > 0.0 {
                stack.prices.set_price(chain_id, request.to_token.clone(), output_price);
            }

            let report = stack.builder.build_graph(chain_id).await;
            if !report.errors.is_empty() {
                warn!("Graph build for chain {} reported {} errors", chain_id, report.errors.len());
            }

            let options = EnhanceOptions {
                gas_price_gwei: config.gas_price_gwei,
                native_price_usd: config.native_price_usd,
                input_price_usd: input_price,
                output_price_usd: output_price,
                max_hops,
                ..Default::default()
            };
            let existing = ExistingRouteResponse {
                provider: "none".to_string(),
                route: None,
            };
            let response = stack.enhancer.enhance_route(&request, existing, &options).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
