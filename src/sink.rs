// Ships metadata batches to an InfluxDB-style series endpoint.

use std::io::{self, Read};
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use reqwest::blocking::{Body, Client};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;

use crate::decode::Metadata;
use crate::error::WirelogError;

/// Total number of POST attempts per batch.
pub const RETRY_LIMIT: usize = 5;

/// Initial backoff after a failed attempt; doubles per failure, fuzzed by a
/// uniform factor in [1, 2).
const RETRY_BASE: Duration = Duration::from_millis(100);

/// Consumer of full (or residual) metadata batches.
///
/// `write` takes ownership of the batch and hands it back so the caller can
/// recycle it.
pub trait BatchWriter: Send + Sync {
    fn write(&self, batch: Vec<Metadata>) -> Vec<Metadata>;
}

/// Writes batches to an InfluxDB 0.8-style `/db/<db>/series` endpoint.
pub struct InfluxSink {
    url: Url,
    client: Client,
}

impl InfluxSink {
    /// Builds a sink from the base URL (`scheme://host:port/`) plus
    /// credentials and database name.
    pub fn new(base: &str, user: &str, password: &str, db: &str) -> Result<Self, WirelogError> {
        let mut url = Url::parse(base).map_err(|e| WirelogError::SinkUrl {
            url: base.to_string(),
            detail: e.to_string(),
        })?;
        url.set_path(&format!("db/{db}/series"));
        url.query_pairs_mut()
            .clear()
            .append_pair("u", user)
            .append_pair("p", password);

        // No per-request timeout: slow sinks surface as transport errors or
        // simply hold their own writer task, never the decode path.
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| WirelogError::Fatal(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { url, client })
    }

    /// The fully-assembled endpoint URL, credentials included.
    pub fn endpoint(&self) -> &str {
        self.url.as_str()
    }
}

impl BatchWriter for InfluxSink {
    fn write(&self, batch: Vec<Metadata>) -> Vec<Metadata> {
        if batch.is_empty() {
            return batch;
        }
        log::info!("writing {} points to sink", batch.len());

        // The batch is shared with the streaming body of each attempt and
        // recovered afterwards for recycling.
        let shared = Arc::new(batch);
        let mut wait = RETRY_BASE;
        for attempt in 1..=RETRY_LIMIT {
            let body = Body::new(PointsBody::new(Arc::clone(&shared)));
            match self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
            {
                Ok(resp) => {
                    // Any response ends the loop; resubmitting a payload the
                    // sink already rejected will not help.
                    log::info!("sink: {}", resp.status());
                    break;
                }
                Err(e) => {
                    log::warn!("sink write attempt {attempt}/{RETRY_LIMIT}: {e}");
                    if attempt < RETRY_LIMIT {
                        thread::sleep(fuzzed(wait));
                        wait *= 2;
                    } else {
                        log::warn!("sink: dropping batch of {} points", shared.len());
                    }
                }
            }
        }

        Arc::try_unwrap(shared).unwrap_or_default()
    }
}

/// `base * (1 + U)` with `U` uniform in [0, 1).
fn fuzzed(base: Duration) -> Duration {
    base.mul_f64(1.0 + rand::thread_rng().gen::<f64>())
}

fn ip_string(ip: Option<IpAddr>) -> String {
    ip.map(|ip| ip.to_string()).unwrap_or_default()
}

enum BodyStage {
    Header,
    Points,
    Footer,
    Done,
}

/// Streaming request body producing the series document incrementally, one
/// point per chunk, so batch size never inflates peak memory.
///
/// Shape:
/// `[{"name":"packet","columns":[...8 names...],"points":[[t_ms, ...], ...]}]`
struct PointsBody {
    batch: Arc<Vec<Metadata>>,
    next: usize,
    chunk: Vec<u8>,
    chunk_pos: usize,
    stage: BodyStage,
}

impl PointsBody {
    fn new(batch: Arc<Vec<Metadata>>) -> Self {
        Self {
            batch,
            next: 0,
            chunk: Vec::new(),
            chunk_pos: 0,
            stage: BodyStage::Header,
        }
    }

    /// Produces the next chunk; returns false once the document is complete.
    fn refill(&mut self) -> bool {
        self.chunk.clear();
        self.chunk_pos = 0;
        match self.stage {
            BodyStage::Header => {
                self.chunk.extend_from_slice(
                    br#"[{"name":"packet","columns":["time","src_ip","dst_ip","src_port","dst_port","src_name","dst_name","size"],"points":["#,
                );
                self.stage = if self.batch.is_empty() {
                    BodyStage::Footer
                } else {
                    BodyStage::Points
                };
                true
            }
            BodyStage::Points => {
                if self.next > 0 {
                    self.chunk.push(b',');
                }
                let m = &self.batch[self.next];
                let point = serde_json::json!([
                    m.timestamp,
                    ip_string(m.src_ip),
                    ip_string(m.dst_ip),
                    m.src_port,
                    m.dst_port,
                    m.src_name,
                    m.dst_name,
                    m.size,
                ]);
                self.chunk.extend_from_slice(point.to_string().as_bytes());
                self.next += 1;
                if self.next == self.batch.len() {
                    self.stage = BodyStage::Footer;
                }
                true
            }
            BodyStage::Footer => {
                self.chunk.extend_from_slice(b"]}]");
                self.stage = BodyStage::Done;
                true
            }
            BodyStage::Done => false,
        }
    }
}

impl Read for PointsBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.chunk_pos >= self.chunk.len() && !self.refill() {
            return Ok(0);
        }
        let n = (self.chunk.len() - self.chunk_pos).min(buf.len());
        buf[..n].copy_from_slice(&self.chunk[self.chunk_pos..self.chunk_pos + n]);
        self.chunk_pos += n;
        Ok(n)
    }
}
