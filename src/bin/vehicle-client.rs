use anyhow::Context;
use auto_intersection::config::ClientFlags;
use auto_intersection::vehicle::driver::{bind_towards, Driver};
use auto_intersection::vehicle::fallback::LocalFallback;
use auto_intersection::vehicle::motion::SimulatedLane;
use auto_intersection::{logging, ConflictMode, VehicleAddr, VehicleClient};
use log::{info, warn};
use structopt::StructOpt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let flags = ClientFlags::from_args();
    logging::setup(&flags.logging)?;

    let topology = flags
        .topology
        .build(ConflictMode::Geometric)
        .context("invalid intersection")?;
    let lane = flags.lane_spec(&topology).context("invalid lane")?;

    let server = flags.server_addr();
    // Held until the end of the drive, so that no other process takes the port.
    let identity = bind_towards(server)
        .await
        .with_context(|| format!("no route to {}", server))?;
    let local = identity.local_addr()?;
    let addr = VehicleAddr((local.ip(), flags.vehicle_port.unwrap_or(local.port())).into());
    info!("Vehicle {} will cross on {}", addr, lane);
    warn!(
        "No motion layer adapter for {}, driving a simulated lane",
        flags.player_addr()
    );

    let client = VehicleClient::new(
        addr,
        lane,
        flags.estimator(),
        flags.params(),
        LocalFallback::default(),
    );
    let motion = SimulatedLane::new(topology.width_cm(), flags.speed);
    let summary = Driver::new(client, motion, server, flags.cycle())
        .with_laps(flags.laps)
        .run()
        .await?;
    info!(
        "Crossed {} times, {} under local control",
        summary.crossings, summary.fallbacks
    );
    drop(identity);
    Ok(())
}
