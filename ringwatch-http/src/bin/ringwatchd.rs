#[macro_use]
extern crate tracing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use chitchat::transport::UdpTransport;
use clap::{Parser, Subcommand};
use ringwatch_manager::ManagerConfig;
use ringwatch_membership::{DiscoveryConfig, DiscoveryRing, GossipConfig, GossipRing};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args: Args = Args::parse();

    let manager_config = ManagerConfig::default()
        .with_mailbox_capacity(args.mailbox_capacity)
        .with_ping_timeout(Duration::from_millis(args.ping_timeout_ms));

    match args.source {
        Source::Gossip(gossip) => {
            let config = GossipConfig::new(
                gossip.node_id,
                gossip.gossip_listen_addr,
                gossip.public_addr.unwrap_or(gossip.gossip_listen_addr),
                gossip.seeds,
                gossip.service_port,
            )
            .with_cluster_id(gossip.cluster_id)
            .with_gossip_interval(Duration::from_millis(gossip.gossip_interval_ms))
            .with_manager_config(manager_config);

            let ring = Arc::new(GossipRing::connect(config, &UdpTransport).await?);
            serve(args.rest_listen_addr, ringwatch_http::router(ring.clone())).await?;

            match Arc::try_unwrap(ring) {
                Ok(ring) => ring.shutdown().await,
                Err(_) => warn!("Gossip ring is still in use, skipping graceful leave."),
            }
        },
        Source::Discovery(discovery) => {
            let mut config = DiscoveryConfig::new(discovery.service_name, discovery.service_port)
                .with_receiver_capacity(discovery.receiver_capacity)
                .with_manager_config(manager_config);
            if let Some(url) = discovery.seed_url {
                config = config.with_seed_url(url);
            }

            let ring = Arc::new(DiscoveryRing::connect(config).await?);
            serve(
                args.rest_listen_addr,
                ringwatch_http::discovery_router(ring.clone()),
            )
            .await?;

            ring.shutdown();
        },
    }

    Ok(())
}

async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(error = %error, "Failed to listen for shutdown signal.");
            }
            info!("Shutting down.");
        })
        .await?;
    Ok(())
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[arg(long, default_value = "127.0.0.1:8080")]
    /// The address for the REST server to listen on.
    rest_listen_addr: SocketAddr,

    #[arg(long, default_value_t = ringwatch_manager::DEFAULT_MAILBOX_CAPACITY)]
    /// How many commands can wait for the ring manager.
    mailbox_capacity: usize,

    #[arg(long, default_value_t = 5)]
    /// How long the ring manager has to answer a ping, in milliseconds.
    ping_timeout_ms: u64,

    #[command(subcommand)]
    source: Source,
}

#[derive(Subcommand, Debug)]
enum Source {
    /// Build the ring from the members of a gossip cluster.
    Gossip(GossipArgs),
    /// Build the ring from a service discovery catalog.
    Discovery(DiscoveryArgs),
}

#[derive(clap::Args, Debug)]
struct GossipArgs {
    #[arg(long)]
    /// The unique ID of the node.
    node_id: String,

    #[arg(long = "seed")]
    /// The set of seed nodes.
    ///
    /// This is used to kick start the auto-discovery of nodes within the cluster.
    seeds: Vec<String>,

    #[arg(long, default_value = "127.0.0.1:7946")]
    /// The address for the gossip protocol to listen on.
    gossip_listen_addr: SocketAddr,

    #[arg(long)]
    /// The public address for the node to broadcast to other nodes.
    ///
    /// If not provided the `gossip_listen_addr` is used which will only
    /// work when running a cluster on the same local network.
    public_addr: Option<SocketAddr>,

    #[arg(long, default_value = ringwatch_membership::gossip::DEFAULT_CLUSTER_ID)]
    cluster_id: String,

    #[arg(long)]
    /// The port this node's service listens on.
    service_port: u16,

    #[arg(long, default_value_t = 1000)]
    gossip_interval_ms: u64,
}

#[derive(clap::Args, Debug)]
struct DiscoveryArgs {
    #[arg(long)]
    /// The service whose instances make up the ring.
    service_name: String,

    #[arg(long)]
    /// The service port to match against each instance's ports.
    service_port: u16,

    #[arg(long)]
    /// A catalog URL to fetch the initial state from.
    seed_url: Option<String>,

    #[arg(long, default_value_t = ringwatch_membership::discovery::DEFAULT_RECEIVER_CAPACITY)]
    receiver_capacity: usize,
}
