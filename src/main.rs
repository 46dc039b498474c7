use std::sync::Arc;

use clap::Parser;

use wirelog::capture::{self, Capture, Core};
use wirelog::classify::{self, LocalNets};
use wirelog::cli::Cli;
use wirelog::dashboard;
use wirelog::error::WirelogError;
use wirelog::sink::{BatchWriter, InfluxSink};
use wirelog::vars::VarRegistry;

extern "C" fn signal_handler(_sig: libc::c_int) {
    capture::request_shutdown();
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

fn exit_code(err: &WirelogError) -> i32 {
    match err {
        WirelogError::CaptureOpen { .. } | WirelogError::Filter { .. } => 2,
        WirelogError::Bind { .. } => 3,
        _ => 4,
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<(), WirelogError> {
    install_signal_handlers();

    // An invalid extra netblock is reported but never fatal; capture still
    // starts with the hard-wired ranges.
    let extra = cli.localnet.as_deref().and_then(|s| {
        classify::parse_netblock(s)
            .map_err(|e| log::warn!("--localnet ignored: {e}"))
            .ok()
    });

    let core = Arc::new(Core::new(LocalNets::new(extra)));
    let vars = Arc::new(VarRegistry::new());

    // Bind before anything else so a busy port fails fast.
    let listener = dashboard::bind(cli.port)?;
    log::info!("dashboard listening on :{}", cli.port);
    dashboard::serve(listener, Arc::clone(&core), Arc::clone(&vars))?;

    let writer: Option<Arc<dyn BatchWriter>> = match cli.sink_url() {
        Some(base) => {
            let sink = InfluxSink::new(
                base,
                &cli.influx_user,
                &cli.influx_password,
                &cli.influx_db,
            )?;
            Some(Arc::new(sink))
        }
        None => None,
    };

    let capture = Capture {
        core,
        interface: cli.interface.clone(),
        buffer_size: cli.buffer,
        workers: num_cpus::get(),
        writer,
        vars,
    };
    capture.run_live()
}
