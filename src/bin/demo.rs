use clap::Parser;
use gossipdns::{
    development_config, generate_node_id, init_logging, production_config, GossipDns,
    GossipEvent, GossipNode, MemoryNetwork,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Run a small in-memory gossipdns mesh and report how the record sets converge
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of nodes, linked in a line
    #[arg(short, long, default_value_t = 2)]
    nodes: usize,

    /// Seconds between query broadcasts
    #[arg(short, long, default_value_t = 10)]
    interval_secs: u64,

    /// Seconds to run before printing the final record sets
    #[arg(short, long, default_value_t = 25)]
    run_secs: u64,

    /// Seed URL, handed to the nodes round-robin. Repeatable.
    #[arg(short, long = "seed", default_values_t = ["baidu.com".to_string(), "google.com".to_string()])]
    seeds: Vec<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let log_config = if cli.json {
        production_config()
    } else {
        development_config().with_level("info").with_target("gossipdns", "info")
    };
    init_logging(&log_config)?;

    if cli.nodes == 0 {
        return Err("at least one node is required".into());
    }

    let network = MemoryNetwork::new();
    let mut protocols = Vec::with_capacity(cli.nodes);
    let mut node_ids = Vec::with_capacity(cli.nodes);

    for i in 0..cli.nodes {
        let node_id = generate_node_id();
        let seed: Vec<String> = cli
            .seeds
            .iter()
            .skip(i)
            .step_by(cli.nodes)
            .cloned()
            .collect();

        let (protocol, mut events) = GossipDns::builder()
            .with_seed_urls(seed)
            .with_broadcast_interval(Duration::from_secs(cli.interval_secs))
            .build()?;
        let protocol = Arc::new(protocol);

        let (transport, inbound) = network.register(node_id.clone()).await?;
        GossipNode::new(protocol.clone(), Arc::new(transport), inbound).spawn();

        info!(index = i, node_id = %node_id, "Registered node");

        let id = node_id.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let GossipEvent::UrlsMerged { added, .. } = &event {
                    if *added > 0 {
                        info!(node = %id, ?event, "Record set grew");
                        continue;
                    }
                }
                debug!(node = %id, ?event, "Gossip event");
            }
        });

        protocols.push(protocol);
        node_ids.push(node_id);
    }

    for pair in node_ids.windows(2) {
        network.connect(&pair[0], &pair[1]).await?;
    }

    info!(
        nodes = cli.nodes,
        interval_secs = cli.interval_secs,
        run_secs = cli.run_secs,
        "Mesh running"
    );
    tokio::time::sleep(Duration::from_secs(cli.run_secs)).await;

    for (node_id, protocol) in node_ids.iter().zip(&protocols) {
        let stats = protocol.stats().await;
        let urls = protocol.records().await;
        info!(
            node = %node_id,
            urls = ?urls,
            rounds = stats.rounds,
            queries_answered = stats.queries_answered,
            "Final record set"
        );
        protocol.shutdown();
    }

    Ok(())
}
