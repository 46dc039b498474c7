// Named runtime probes, served as JSON at /vars.

use std::collections::BTreeMap;
use std::sync::Mutex;

type Probe = Box<dyn Fn() -> String + Send + Sync>;

/// Registry of string-valued telemetry probes.
///
/// Probes are registered once at startup (queue lengths, map sizes) and
/// evaluated on every `/vars` request. Registering an existing key replaces
/// the probe.
pub struct VarRegistry {
    probes: Mutex<BTreeMap<String, Probe>>,
}

impl VarRegistry {
    /// Creates a registry pre-populated with runtime probes.
    pub fn new() -> Self {
        let reg = Self {
            probes: Mutex::new(BTreeMap::new()),
        };
        reg.register("num-cpu", || num_cpus::get().to_string());
        reg.register("version", || env!("CARGO_PKG_VERSION").to_string());
        reg
    }

    pub fn register(&self, key: &str, probe: impl Fn() -> String + Send + Sync + 'static) {
        let mut probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
        probes.insert(key.to_string(), Box::new(probe));
    }

    /// Evaluates every probe into a name → value map.
    pub fn evaluate(&self) -> BTreeMap<String, String> {
        let probes = self.probes.lock().unwrap_or_else(|e| e.into_inner());
        probes.iter().map(|(k, p)| (k.clone(), p())).collect()
    }
}

impl Default for VarRegistry {
    fn default() -> Self {
        Self::new()
    }
}
