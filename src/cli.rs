use clap::Parser;
use std::num::ParseIntError;
use std::time::Duration;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Control server WebSocket address, eg. "wss://control.example.com/ws"
    #[arg(env = "TETHER_SERVER_ADDRESS", long = "server-address", value_name = "uri")]
    pub server_address: String,

    /// API key identifying this device to the control server
    #[arg(env = "TETHER_API_KEY", long = "api-key", value_name = "key")]
    pub api_key: String,

    /// Device password for the access-token exchange
    #[arg(env = "TETHER_PASSWORD", long = "password", value_name = "str")]
    pub password: String,

    /// HTTP endpoint minting access tokens
    #[arg(env = "TETHER_AUTH_ENDPOINT", long = "auth-endpoint", value_name = "uri")]
    pub auth_endpoint: String,

    /// Token request timeout in milliseconds
    #[arg(
        env = "TETHER_AUTH_TIMEOUT_MS",
        long = "auth-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration,
        default_value = "30000"
    )]
    pub auth_timeout: Duration,
}

pub fn parse() -> Cli {
    Parser::parse()
}
