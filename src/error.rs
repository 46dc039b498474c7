#[derive(Debug, thiserror::Error)]
pub enum WirelogError {
    #[error("cannot open capture on {iface}: {source}")]
    CaptureOpen {
        iface: String,
        #[source]
        source: pcap::Error,
    },
    #[error("cannot install filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },
    #[error("cannot bind dashboard port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("DNS parse error at offset {offset}: {detail}")]
    DnsParse { offset: usize, detail: String },
    #[error("invalid netblock {0:?}")]
    Netblock(String),
    #[error("invalid sink URL {url:?}: {detail}")]
    SinkUrl { url: String, detail: String },
    #[error("fatal: {0}")]
    Fatal(String),
}
