mod bus;
mod cli;
mod config;
mod control;
mod envelope;
mod link;

use anyhow::Result;
use bus::Bus;
use config::LinkConfig;
use control::Control;
use link::Uplink;
use tracing::{debug, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("info".parse()?)
                    .add_directive("hyper=error".parse()?)
                    .add_directive("reqwest=warn".parse()?)
                    .add_directive("tungstenite=warn".parse()?),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();

    // Missing required values abort here, before the core starts
    let cli = cli::parse();
    let config = LinkConfig::from(cli);
    debug!("{config:#?}");
    info!(
        server = %config.credentials.server_address,
        "starting uplink"
    );

    // One bus and one uplink per process, handed to consumers by reference
    let bus = Bus::new();
    let uplink = Uplink::new(config, bus.clone());
    let control = Control::new(bus, uplink.gateway());

    // Race the two long-lived tasks; either one finishing ends the process
    tokio::select! {
        _ = uplink.run() => info!("uplink finished, exiting"),
        _ = control.run() => info!("control finished, exiting"),
    }

    Ok(())
}
