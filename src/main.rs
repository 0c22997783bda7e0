use anyhow::Context;
use clap::Parser;
use rendezvous_server::ServerConfig;
use rendezvous_telemetry::TelemetryConfig;

#[derive(Parser, Debug)]
#[command(name = "rendezvous")]
#[command(about = "Signaling relay that pairs two peers by token and forwards their offer/answer")]
#[command(version)]
struct Args {
    /// Host to bind
    #[arg(long, env = "RENDEZVOUS_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "RENDEZVOUS_PORT", default_value_t = 6033)]
    port: u16,

    /// Outbound frames buffered per connection
    #[arg(long, env = "RENDEZVOUS_SEND_QUEUE", default_value_t = 64)]
    send_queue: usize,

    /// Seconds between heartbeat pings
    #[arg(long, env = "RENDEZVOUS_HEARTBEAT_SECS", default_value_t = 30)]
    heartbeat_secs: u64,

    /// Seconds of silence before a connection is dropped
    #[arg(long, env = "RENDEZVOUS_CLIENT_TIMEOUT_SECS", default_value_t = 90)]
    client_timeout_secs: u64,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, env = "RENDEZVOUS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "RENDEZVOUS_JSON_LOGS")]
    json_logs: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_send_queue: self.send_queue,
            heartbeat_interval_secs: self.heartbeat_secs,
            client_timeout_secs: self.client_timeout_secs,
            ..Default::default()
        }
    }

    fn telemetry_config(&self) -> anyhow::Result<TelemetryConfig> {
        let log_level = self
            .log_level
            .parse()
            .with_context(|| format!("invalid log level: {}", self.log_level))?;
        Ok(TelemetryConfig {
            log_level,
            json: self.json_logs,
            ..Default::default()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    rendezvous_telemetry::init_telemetry(&args.telemetry_config()?)?;

    let config = args.server_config();
    let handle = rendezvous_server::start(config)
        .await
        .context("failed to start signaling server")?;

    tracing::info!(port = handle.port(), "Signaling server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_server_config() {
        let args = Args::parse_from(["rendezvous"]);
        let config = args.server_config();
        assert_eq!(config.port, 6033);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_send_queue, 64);
    }

    #[test]
    fn rejects_bad_log_level() {
        let args = Args::parse_from(["rendezvous", "--log-level", "loud"]);
        assert!(args.telemetry_config().is_err());
    }

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from(["rendezvous", "-p", "7000", "--log-level", "debug", "--json-logs"]);
        assert_eq!(args.server_config().port, 7000);
        let telemetry = args.telemetry_config().unwrap();
        assert_eq!(telemetry.log_level, tracing::Level::DEBUG);
        assert!(telemetry.json);
    }
}
