use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "wirelog",
    version,
    about = "Passive per-packet capture logger with a live HTTP dashboard"
)]
pub struct Cli {
    /// Interface to perform capture on
    #[arg(short = 'i', long = "if", default_value = "br0")]
    pub interface: String,

    /// Batch capacity for sink shipments and the packet-queue capacity
    #[arg(long, default_value_t = 10_000, value_parser = validate_buffer)]
    pub buffer: usize,

    /// Base URL of the destination InfluxDB for packet data; unset disables shipping
    #[arg(long)]
    pub influx: Option<String>,

    /// Username for the InfluxDB sink
    #[arg(long, default_value = "caplog")]
    pub influx_user: String,

    /// Password for the InfluxDB sink
    #[arg(long, default_value = "freshbeans")]
    pub influx_password: String,

    /// Database name for the InfluxDB sink
    #[arg(long, default_value = "caplog")]
    pub influx_db: String,

    /// Serving port for the dashboard and /vars
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Additional netblock of routable addresses to consider local
    /// (fd00::/8, 10/8, 192.168/16, etc are all automatically local)
    #[arg(long)]
    pub localnet: Option<String>,
}

impl Cli {
    /// Returns the sink base URL if one was configured and non-empty.
    pub fn sink_url(&self) -> Option<&str> {
        self.influx.as_deref().filter(|s| !s.is_empty())
    }
}

fn validate_buffer(s: &str) -> Result<usize, String> {
    let val: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid integer"))?;
    if val < 1 {
        Err("buffer must be at least 1".to_string())
    } else if val > 1_000_000 {
        Err("buffer must be at most 1000000".to_string())
    } else {
        Ok(val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    fn parsed(args: &[&str]) -> Cli {
        parse(args).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parsed(&["wirelog"]);
        assert_eq!(cli.interface, "br0");
        assert_eq!(cli.buffer, 10_000);
        assert_eq!(cli.port, 8080);
        assert!(cli.influx.is_none());
        assert!(cli.sink_url().is_none());
        assert!(cli.localnet.is_none());
    }

    #[test]
    fn test_interface_short_and_long() {
        let cli = parsed(&["wirelog", "-i", "eth0"]);
        assert_eq!(cli.interface, "eth0");
        let cli = parsed(&["wirelog", "--if", "wlan1"]);
        assert_eq!(cli.interface, "wlan1");
    }

    #[test]
    fn test_buffer_valid() {
        let cli = parsed(&["wirelog", "--buffer", "500"]);
        assert_eq!(cli.buffer, 500);
    }

    #[test]
    fn test_buffer_zero_rejected() {
        assert!(parse(&["wirelog", "--buffer", "0"]).is_err());
    }

    #[test]
    fn test_buffer_too_large() {
        assert!(parse(&["wirelog", "--buffer", "2000000"]).is_err());
    }

    #[test]
    fn test_influx_url() {
        let cli = parsed(&["wirelog", "--influx", "http://db.example:8086/"]);
        assert_eq!(cli.sink_url(), Some("http://db.example:8086/"));
    }

    #[test]
    fn test_empty_influx_disables_sink() {
        let cli = parsed(&["wirelog", "--influx", ""]);
        assert!(cli.sink_url().is_none());
    }

    #[test]
    fn test_influx_credentials_default() {
        let cli = parsed(&["wirelog"]);
        assert_eq!(cli.influx_user, "caplog");
        assert_eq!(cli.influx_password, "freshbeans");
        assert_eq!(cli.influx_db, "caplog");
    }

    #[test]
    fn test_influx_credentials_override() {
        let cli = parsed(&[
            "wirelog",
            "--influx-user",
            "ops",
            "--influx-password",
            "s3cret",
            "--influx-db",
            "traffic",
        ]);
        assert_eq!(cli.influx_user, "ops");
        assert_eq!(cli.influx_password, "s3cret");
        assert_eq!(cli.influx_db, "traffic");
    }

    #[test]
    fn test_localnet_flag() {
        let cli = parsed(&["wirelog", "--localnet", "203.0.113.0/24"]);
        assert_eq!(cli.localnet.as_deref(), Some("203.0.113.0/24"));
    }

    #[test]
    fn test_port_flag() {
        let cli = parsed(&["wirelog", "--port", "9090"]);
        assert_eq!(cli.port, 9090);
    }

    #[test]
    fn test_all_flags_combined() {
        let cli = parsed(&[
            "wirelog",
            "-i",
            "en0",
            "--buffer",
            "3",
            "--influx",
            "http://127.0.0.1:8086/",
            "--port",
            "8888",
            "--localnet",
            "100.64.0.0/10",
        ]);
        assert_eq!(cli.interface, "en0");
        assert_eq!(cli.buffer, 3);
        assert_eq!(cli.port, 8888);
        assert_eq!(cli.sink_url(), Some("http://127.0.0.1:8086/"));
        assert_eq!(cli.localnet.as_deref(), Some("100.64.0.0/10"));
    }
}
