//! CLI configuration (SPEC_FULL §10.1).
//!
//! Grounded on `chopin-cli/src/main.rs`'s `clap` derive usage; flags map
//! onto the reference implementation's `argv` handling in `aws.c::main`
//! (`getopt`-style `-p <port>`, a hardcoded static/dynamic dispatch) but are
//! named and defaulted per SPEC_FULL rather than carried over literally.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::error::{ReactorError, ReactorResult};

#[derive(Parser, Debug)]
#[command(name = "reactor-httpd", about = "Event-driven static/dynamic file server")]
pub struct Cli {
    /// Address to bind, e.g. 0.0.0.0:8080.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// URL substring that routes a request to the static (sendfile) path.
    #[arg(long, default_value = "/static/")]
    pub static_prefix: String,

    /// URL substring that routes a request to the dynamic (io_uring) path.
    #[arg(long, default_value = "/dynamic/")]
    pub dynamic_prefix: String,

    /// Directory resource paths are resolved against.
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Number of reactor worker threads. Defaults to the number of
    /// available CPUs (§10.3).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-connection receive/send buffer size in bytes (§4.2, §4.7).
    #[arg(long, default_value_t = 8192)]
    pub buffer_size: usize,

    /// Maximum simultaneous connections per worker (§4.2's bounded slab).
    #[arg(long, default_value_t = 1024)]
    pub max_connections: usize,

    /// Pin each worker thread to a distinct CPU core (§10.3).
    #[arg(long, default_value_t = false)]
    pub pin_workers: bool,
}

pub struct Config {
    pub bind: SocketAddr,
    pub static_prefix: String,
    pub dynamic_prefix: String,
    pub root: PathBuf,
    pub workers: usize,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub pin_workers: bool,
}

impl Config {
    /// Parse and validate `argv`. Validation failures map to
    /// `ReactorError::Config`, matching the error enum's role as the single
    /// place startup failures funnel through before `telemetry` is even
    /// initialized (so these reach stderr, not the log stream).
    pub fn from_args() -> ReactorResult<Self> {
        Self::from_cli(Cli::parse())
    }

    fn from_cli(cli: Cli) -> ReactorResult<Self> {
        let bind = resolve_bind(&cli.bind)?;

        if cli.static_prefix.is_empty() || cli.dynamic_prefix.is_empty() {
            return Err(ReactorError::Config(
                "static-prefix and dynamic-prefix must be non-empty".into(),
            ));
        }
        if cli.static_prefix == cli.dynamic_prefix {
            return Err(ReactorError::Config(
                "static-prefix and dynamic-prefix must differ".into(),
            ));
        }
        if cli.buffer_size < 256 {
            return Err(ReactorError::Config(
                "buffer-size must be at least 256 bytes (response headers must fit)".into(),
            ));
        }
        if cli.max_connections == 0 {
            return Err(ReactorError::Config("max-connections must be > 0".into()));
        }

        let workers = cli.workers.unwrap_or_else(num_cpus::get).max(1);

        Ok(Self {
            bind,
            static_prefix: cli.static_prefix,
            dynamic_prefix: cli.dynamic_prefix,
            root: cli.root,
            workers,
            buffer_size: cli.buffer_size,
            max_connections: cli.max_connections,
            pin_workers: cli.pin_workers,
        })
    }
}

fn resolve_bind(raw: &str) -> ReactorResult<SocketAddr> {
    raw.parse::<SocketAddr>().or_else(|_| {
        raw.parse::<u16>()
            .map(|port| SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))
            .map_err(|_| ReactorError::Config(format!("invalid --bind value: {raw}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(bind: &str) -> Cli {
        Cli {
            bind: bind.to_string(),
            static_prefix: "/static/".into(),
            dynamic_prefix: "/dynamic/".into(),
            root: PathBuf::from("."),
            workers: Some(2),
            buffer_size: 8192,
            max_connections: 1024,
            pin_workers: false,
        }
    }

    #[test]
    fn accepts_bare_port() {
        let cfg = Config::from_cli(cli("8080")).unwrap();
        assert_eq!(cfg.bind.port(), 8080);
    }

    #[test]
    fn accepts_full_socket_addr() {
        let cfg = Config::from_cli(cli("127.0.0.1:9000")).unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn rejects_identical_prefixes() {
        let mut c = cli("8080");
        c.dynamic_prefix = c.static_prefix.clone();
        assert!(Config::from_cli(c).is_err());
    }

    #[test]
    fn rejects_undersized_buffer() {
        let mut c = cli("8080");
        c.buffer_size = 16;
        assert!(Config::from_cli(c).is_err());
    }
}
