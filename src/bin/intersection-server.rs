use anyhow::Context;
use auto_intersection::config::ServerFlags;
use auto_intersection::{logging, IntersectionServer};
use log::info;
use std::sync::Arc;
use structopt::StructOpt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = ServerFlags::from_args();
    logging::setup(&flags.logging)?;

    let topology = flags
        .topology
        .build(flags.lane_conflicts)
        .context("invalid intersection")?;
    info!(
        "{}-way intersection, {} lanes per way, {} cm wide, {} lane conflicts",
        topology.ways(),
        topology.lanes_per_way(),
        topology.width_cm(),
        topology.conflict_table().mode()
    );

    let server = IntersectionServer::bind(
        flags.listen_addr(),
        Arc::new(topology),
        flags.policy,
        flags.options(),
    )
    .await?;

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    server.serve_until(shutdown).await?;
    Ok(())
}
