use clap::Parser;
use core::time::Duration;

/// Command-line arguments, each with an environment variable fallback.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fleetid-kv-server",
    version,
    about = "Key/value server with TTL leases for fleetid generators"
)]
pub struct CliArgs {
    /// Address to listen on, or a socket path with `--uds`.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:2379")]
    pub server_addr: String,

    /// Listen on a Unix domain socket at `server_addr`.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Longest lease a client may request, in seconds.
    #[arg(long, env = "MAX_LEASE_TTL", default_value_t = 300)]
    pub max_lease_ttl: u64,

    /// Seconds to wait for open connections to drain after a shutdown signal.
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

/// Validated runtime configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub max_lease_ttl: Duration,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.server_addr.is_empty() {
            anyhow::bail!("server_addr must not be empty");
        }
        if args.max_lease_ttl == 0 {
            anyhow::bail!("max_lease_ttl must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            max_lease_ttl: Duration::from_secs(args.max_lease_ttl),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
