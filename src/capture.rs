// Core packet capturing logic: live source, bounded packet queue, and the
// decoder worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};

use crate::accounting::Values;
use crate::buffer::BufferPool;
use crate::classify::LocalNets;
use crate::decode::{FrameDecoder, Metadata};
use crate::error::WirelogError;
use crate::revdns::ReverseDnsMap;
use crate::sink::BatchWriter;
use crate::vars::VarRegistry;

/// Snap length for the live capture.
const SNAPLEN: i32 = 1600;

/// Kernel-level filter; everything else never leaves the kernel.
const FILTER: &str = "tcp or udp";

/// Read timeout for the live handle. Note: not 0. A zero timeout does
/// undesirable things on some platforms, and a finite one lets the pump
/// notice shutdown on a quiet wire.
const READ_TIMEOUT_MS: i32 = 500;

/// Global shutdown flag, set by signal handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Shared state of the pipeline: counters, the learned reverse-DNS map, and
/// the local-address classifier. One instance per process, owned explicitly
/// and shared by reference with the workers and the dashboard.
pub struct Core {
    pub values: Values,
    pub revdns: ReverseDnsMap,
    pub locals: LocalNets,
}

impl Core {
    pub fn new(locals: LocalNets) -> Self {
        Self {
            values: Values::default(),
            revdns: ReverseDnsMap::new(),
            locals,
        }
    }
}

/// One frame as pulled off the wire: capture metadata plus the raw bytes.
pub struct RawFrame {
    /// Capture time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Original length on the wire (may exceed the captured bytes).
    pub wire_len: u32,
    pub data: Vec<u8>,
}

/// Handles decoding packets and feeding the accumulator and the sink.
pub struct Capture {
    pub core: Arc<Core>,
    pub interface: String,
    /// Batch capacity for sink shipments and the packet-queue capacity.
    pub buffer_size: usize,
    pub workers: usize,
    pub writer: Option<Arc<dyn BatchWriter>>,
    pub vars: Arc<VarRegistry>,
}

struct Pipeline {
    frame_tx: Sender<RawFrame>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Pipeline {
    /// Closes the packet queue and waits for the workers to drain it.
    fn join(self) {
        drop(self.frame_tx);
        for h in self.handles {
            let _ = h.join();
        }
    }
}

impl Capture {
    /// Runs a live packet capture on the interface until EOF or interrupt.
    pub fn run_live(&self) -> Result<(), WirelogError> {
        let mut cap = pcap::Capture::from_device(self.interface.as_str())
            .map(|c| c.promisc(true).snaplen(SNAPLEN).timeout(READ_TIMEOUT_MS))
            .and_then(|c| c.open())
            .map_err(|e| WirelogError::CaptureOpen {
                iface: self.interface.clone(),
                source: e,
            })?;
        cap.filter(FILTER, true).map_err(|e| WirelogError::Filter {
            filter: FILTER.to_string(),
            source: e,
        })?;

        let pipeline = self.start_workers()?;
        log::info!(
            "capture running on {} with {} decoders",
            self.interface,
            self.workers
        );

        loop {
            if shutdown_requested() {
                log::info!("interrupt received, stopping...");
                break;
            }
            match cap.next_packet() {
                Ok(packet) => {
                    let frame = RawFrame {
                        timestamp: timeval_millis(&packet.header.ts),
                        wire_len: packet.header.len,
                        data: packet.data.to_vec(),
                    };
                    if !send_frame(&pipeline.frame_tx, frame) {
                        break;
                    }
                }
                // Quiet wire; loop around and re-check the shutdown flag.
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => break,
                Err(e) => {
                    log::warn!("error capturing packet: {e}");
                    continue;
                }
            }
        }

        log::info!("capture draining");
        pipeline.join();
        log::info!("capture stopped");
        Ok(())
    }

    /// Runs the worker pipeline over an in-memory sequence of frames,
    /// returning once every frame is decoded and residual batches are
    /// flushed. This is the capture path minus the live source.
    pub fn process_frames(
        &self,
        frames: impl IntoIterator<Item = RawFrame>,
    ) -> Result<(), WirelogError> {
        let pipeline = self.start_workers()?;
        for frame in frames {
            if pipeline.frame_tx.send(frame).is_err() {
                break;
            }
        }
        pipeline.join();
        Ok(())
    }

    /// Builds the packet queue and the recycle pool, registers their
    /// telemetry probes, and launches the decoder workers.
    fn start_workers(&self) -> Result<Pipeline, WirelogError> {
        let (frame_tx, frame_rx) = bounded::<RawFrame>(self.buffer_size);
        let pool = BufferPool::new(self.buffer_size);

        let queue = frame_rx.clone();
        self.vars
            .register("packet-queue-len", move || queue.len().to_string());
        let probe_pool = pool.clone();
        self.vars
            .register("buffer-pool-len", move || probe_pool.len().to_string());
        let probe_core = Arc::clone(&self.core);
        self.vars.register("reverse-dns-map-size", move || {
            probe_core.revdns.len().to_string()
        });

        let mut handles = Vec::with_capacity(self.workers);
        for num in 0..self.workers {
            let rx = frame_rx.clone();
            let core = Arc::clone(&self.core);
            let writer = self.writer.clone();
            let pool = pool.clone();
            let handle = thread::Builder::new()
                .name(format!("wirelog-decode-{num}"))
                .spawn(move || decoder_loop(num, &rx, &core, writer, &pool))
                .map_err(|e| WirelogError::Fatal(format!("spawn decoder thread: {e}")))?;
            handles.push(handle);
        }

        Ok(Pipeline { frame_tx, handles })
    }
}

/// Sends one frame to the packet queue, re-checking the shutdown flag while
/// the queue is full so an interrupt is never blocked by backpressure.
/// Returns false when the pump should stop.
fn send_frame(tx: &Sender<RawFrame>, frame: RawFrame) -> bool {
    let mut frame = frame;
    loop {
        match tx.send_timeout(frame, Duration::from_millis(100)) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(f)) => {
                if shutdown_requested() {
                    log::info!("interrupt received, stopping...");
                    return false;
                }
                frame = f;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Decoder worker: decodes frames from the queue, teaches the reverse-DNS
/// map, accounts every packet, and batches metadata for the sink.
fn decoder_loop(
    num: usize,
    rx: &Receiver<RawFrame>,
    core: &Arc<Core>,
    writer: Option<Arc<dyn BatchWriter>>,
    pool: &BufferPool,
) {
    log::info!("decoder {num}: starting");

    let mut decoder = FrameDecoder::new();
    let mut batch = writer.as_ref().map(|_| pool.acquire());
    let batch_capacity = pool.batch_capacity();

    for frame in rx.iter() {
        let (decoded, issue) = decoder.decode(&frame.data);
        if let Some(issue) = issue {
            log::debug!("decoder {num}: {issue}");
        }

        // A DNS answer names itself: teach the map before resolving names
        // for the very frame that carried it.
        if let Some(dns) = &decoded.dns {
            core.revdns.add(dns);
        }

        let (src_name, dst_name) = match (decoded.src_ip, decoded.dst_ip) {
            (Some(src), Some(dst)) => core.revdns.names(src, dst),
            _ => (String::new(), String::new()),
        };

        let m = Metadata {
            timestamp: frame.timestamp,
            size: frame.wire_len as u64,
            src_ip: decoded.src_ip,
            dst_ip: decoded.dst_ip,
            src_port: decoded.src_port,
            dst_port: decoded.dst_port,
            src_name,
            dst_name,
            v6: decoded.v6,
        };

        core.values.add_packet(&m, &core.locals);

        if let (Some(writer), Some(batch)) = (&writer, &mut batch) {
            batch.push(m);
            if batch.len() >= batch_capacity {
                let full = std::mem::replace(batch, pool.acquire());
                ship(Arc::clone(writer), pool.clone(), full);
            }
        }
    }

    // The queue is closed and drained; flush the residual batch before
    // terminating.
    if let (Some(writer), Some(batch)) = (writer, batch) {
        pool.release(writer.write(batch));
    }
    log::info!("decoder {num}: stopping");
}

/// Fire-and-forget shipment so a slow sink never blocks the decode path.
fn ship(writer: Arc<dyn BatchWriter>, pool: BufferPool, batch: Vec<Metadata>) {
    let spawned = thread::Builder::new()
        .name("wirelog-ship".into())
        .spawn(move || pool.release(writer.write(batch)));
    if let Err(e) = spawned {
        log::warn!("cannot spawn shipper thread, dropping batch: {e}");
    }
}

fn timeval_millis(ts: &libc::timeval) -> u64 {
    (ts.tv_sec.max(0) as u64)
        .saturating_mul(1000)
        .saturating_add((ts.tv_usec.max(0) as u64) / 1000)
}
