use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// A single service definition. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub name: String,
    pub command: String,
    pub run_once: bool,
    pub deps: Vec<String>,
    pub checks: HealthCheckSpec,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn run_once(mut self, run_once: bool) -> Self {
        self.run_once = run_once;
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_checks(mut self, checks: HealthCheckSpec) -> Self {
        self.checks = checks;
        self
    }
}

/// Liveness probes for a running service. Every field is optional and an
/// empty set of checks always passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HealthCheckSpec {
    pub command: Option<String>,
    pub tcp_ports: Vec<u16>,
    pub udp_ports: Vec<u16>,
}

impl HealthCheckSpec {
    pub fn is_trivial(&self) -> bool {
        self.command.is_none() && self.tcp_ports.is_empty() && self.udp_ports.is_empty()
    }
}

/// The full set of services, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Procfile {
    services: BTreeMap<String, ServiceSpec>,
}

impl Procfile {
    pub async fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(content: &str) -> crate::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: BTreeMap<String, ServiceSpecRaw> = serde_yaml_bw::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse Procfile: {}", e)))?;
        Self::from_raw(raw)
    }

    pub fn from_json_str(content: &str) -> crate::Result<Self> {
        let raw: BTreeMap<String, ServiceSpecRaw> = serde_json::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse Procfile: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: BTreeMap<String, ServiceSpecRaw>) -> crate::Result<Self> {
        let services = raw
            .into_iter()
            .map(|(name, raw)| raw.into_spec(name).map(|spec| (spec.name.clone(), spec)))
            .collect::<crate::Result<_>>()?;
        Ok(Self { services })
    }

    pub fn get(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn services(&self) -> impl Iterator<Item = &ServiceSpec> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn into_services(self) -> Vec<ServiceSpec> {
        self.services.into_values().collect()
    }
}

// On-disk shape. Optional fields accept both "missing" and explicit null.
#[derive(Debug, Deserialize)]
struct ServiceSpecRaw {
    cmd: Option<String>,
    run_once: Option<bool>,
    deps: Option<Vec<String>>,
    checks: Option<HealthCheckSpecRaw>,
}

#[derive(Debug, Deserialize)]
struct HealthCheckSpecRaw {
    cmd: Option<String>,
    tcp_ports: Option<Vec<u16>>,
    udp_ports: Option<Vec<u16>>,
}

impl ServiceSpecRaw {
    fn into_spec(self, name: String) -> crate::Result<ServiceSpec> {
        if name.trim().is_empty() {
            return Err(crate::Error::Config("Service name cannot be empty".to_string()));
        }

        let command = match self.cmd {
            Some(cmd) if !cmd.trim().is_empty() => cmd,
            Some(_) => {
                return Err(crate::Error::Config(format!(
                    "Service '{}': field `cmd` cannot be empty",
                    name
                )));
            }
            None => {
                return Err(crate::Error::Config(format!(
                    "Service '{}': missing required field `cmd`",
                    name
                )));
            }
        };

        Ok(ServiceSpec {
            name,
            command,
            run_once: self.run_once.unwrap_or(false),
            deps: self.deps.unwrap_or_default(),
            checks: self.checks.map(Into::into).unwrap_or_default(),
        })
    }
}

impl From<HealthCheckSpecRaw> for HealthCheckSpec {
    fn from(raw: HealthCheckSpecRaw) -> Self {
        Self {
            command: raw.cmd.filter(|cmd| !cmd.trim().is_empty()),
            tcp_ports: raw.tcp_ports.unwrap_or_default(),
            udp_ports: raw.udp_ports.unwrap_or_default(),
        }
    }
}

/// Runtime knobs for the supervision engine.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub check_interval: Duration,
    pub check_timeout: Duration,
    pub shell: String,
    pub launch_backoff: BackoffConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(50),
            check_timeout: Duration::from_secs(1),
            shell: "bash".to_string(),
            launch_backoff: BackoffConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 30000,
            multiplier: 2.0,
            jitter: 0.3,
            max_attempts: None,
        }
    }
}
