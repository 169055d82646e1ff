use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::{Result, ShepherdError};
use crate::install::Install;

/// JVM flags passed to every server unless overridden.
pub const DEFAULT_JVM_FLAGS: &[&str] = &[
    "-server",
    "-Xmx256m",
    "-Dzookeeper.serverCnxnFactory=org.apache.zookeeper.server.NettyServerCnxnFactory",
];

/// Fixed JMX properties; the `jmxremote.port` property is appended
/// separately with the configured port.
pub const DEFAULT_JMX_ARGS: &[&str] = &[
    "-Dcom.sun.management.jmxremote=true",
    "-Dcom.sun.management.jmxremote.local.only=false",
    "-Dcom.sun.management.jmxremote.authenticate=false",
    "-Dcom.sun.management.jmxremote.ssl=false",
];

/// Entry point class inside the ZooKeeper server jar.
pub const QUORUM_MAIN: &str = "org.apache.zookeeper.server.quorum.QuorumPeerMain";

/// Keys whose values are written as the literal tokens `yes`/`no`.
const YES_NO_KEYS: &[&str] = &["forceSync", "leaderServes", "skipACL"];

/// Where instance state goes when nothing else is configured.
pub fn default_base_dir() -> PathBuf {
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("zookeeper")
}

/// Configuration for a single ZooKeeper server instance.
///
/// Covers the zoo.cfg keys the server understands plus the launch-side
/// settings (JVM flags, JMX, instance identity). No sanity checking is done
/// on the values; the server itself is the authority on what is legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root for all instance-local state; every derived path lives under it.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Overrides the default `<base_dir>/data` snapshot directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Dedicated transaction-log device; unset means the server reuses the
    /// data directory.
    #[serde(default)]
    pub data_log_dir: Option<PathBuf>,

    /// Port the server listens on for client connections.
    #[serde(default = "default_client_port")]
    pub client_port: u16,

    /// Maximum number of simultaneous client connections.
    #[serde(default = "default_max_client_cnxns")]
    pub max_client_cnxns: u32,

    /// Basic time unit in milliseconds.
    #[serde(default = "default_tick_time")]
    pub tick_time: u32,

    /// Ticks allowed for followers to connect and sync to a leader.
    #[serde(default = "default_init_limit")]
    pub init_limit: u32,

    /// Ticks a follower may lag before it is dropped.
    #[serde(default = "default_sync_limit")]
    pub sync_limit: u32,

    /// Numeric identity of this instance within an ensemble.
    #[serde(default = "default_myid")]
    pub myid: u32,

    /// Transactions between snapshots; unset leaves the server default.
    #[serde(default)]
    pub snap_count: Option<u32>,

    /// Cap on outstanding client requests; unset leaves the server default.
    #[serde(default)]
    pub global_outstanding_limit: Option<u32>,

    /// Transaction log preallocation block size in kilobytes.
    #[serde(default)]
    pub pre_alloc_size: Option<u32>,

    /// Address to bind the client port to; unset binds every interface.
    #[serde(default)]
    pub client_port_address: Option<String>,

    /// Minimum negotiable session timeout in milliseconds.
    #[serde(default)]
    pub min_session_timeout: Option<u32>,

    /// Maximum negotiable session timeout in milliseconds.
    #[serde(default)]
    pub max_session_timeout: Option<u32>,

    /// Whether snapshots fsync before being acknowledged. Dangerous to turn
    /// off for anything but throwaway test data. Unset stays out of the
    /// rendered config entirely.
    #[serde(default)]
    pub force_sync: Option<bool>,

    /// Whether the leader also serves clients. Tri-state like `force_sync`.
    #[serde(default)]
    pub leader_serves: Option<bool>,

    /// Whether ACL checks are skipped. Tri-state like `force_sync`.
    #[serde(default)]
    pub skip_acl: Option<bool>,

    /// Raw key/value pairs merged into the rendered config last; keys are
    /// written as-is, so they should already be camel-cased. Ensemble peer
    /// rows (`server.N`) travel here.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,

    /// Flags handed to the JVM ahead of the classpath.
    #[serde(default = "default_jvm_flags")]
    pub jvm_flags: Vec<String>,

    /// Enables the fixed (auth-free) JMX block in the command line.
    #[serde(default)]
    pub enable_jmx: bool,

    /// Port substituted into the JMX block when `enable_jmx` is set.
    #[serde(default = "default_jmx_port")]
    pub jmx_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            data_dir: None,
            data_log_dir: None,
            client_port: default_client_port(),
            max_client_cnxns: default_max_client_cnxns(),
            tick_time: default_tick_time(),
            init_limit: default_init_limit(),
            sync_limit: default_sync_limit(),
            myid: default_myid(),
            snap_count: None,
            global_outstanding_limit: None,
            pre_alloc_size: None,
            client_port_address: None,
            min_session_timeout: None,
            max_session_timeout: None,
            force_sync: None,
            leader_serves: None,
            skip_acl: None,
            extra: BTreeMap::new(),
            jvm_flags: default_jvm_flags(),
            enable_jmx: false,
            jmx_port: default_jmx_port(),
        }
    }
}

fn default_client_port() -> u16 {
    2181
}

fn default_max_client_cnxns() -> u32 {
    100
}

fn default_tick_time() -> u32 {
    2000
}

fn default_init_limit() -> u32 {
    5
}

fn default_sync_limit() -> u32 {
    2
}

fn default_myid() -> u32 {
    1
}

fn default_jmx_port() -> u16 {
    22222
}

fn default_jvm_flags() -> Vec<String> {
    DEFAULT_JVM_FLAGS.iter().map(|s| s.to_string()).collect()
}

impl ServerConfig {
    /// A config rooted at `base_dir` with every other field at its default.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Effective snapshot directory: the override if set, else
    /// `<base_dir>/data`.
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("data"))
    }

    /// Rendered configuration file location.
    pub fn zoo_cfg_path(&self) -> PathBuf {
        self.base_dir.join("zoo.cfg")
    }

    /// Identity file location. Always under `<base_dir>/data`, matching
    /// what the launch scaffolding writes.
    pub fn myid_path(&self) -> PathBuf {
        self.base_dir.join("data").join("myid")
    }

    /// Location the logging template is copied to.
    pub fn log4j_props_path(&self) -> PathBuf {
        self.base_dir.join("log4j.properties")
    }

    /// Directory the server writes its logs into.
    pub fn log_dir(&self) -> PathBuf {
        self.base_dir.join("log")
    }

    /// File the child's stdout/stderr are captured in.
    pub fn stdio_redirect_path(&self) -> PathBuf {
        self.log_dir().join("zookeeper.out")
    }

    /// Classpath handed to the JVM: server jar, logging jar, then the base
    /// directory itself so `log4j.properties` is picked up.
    pub fn classpath(&self, install: &Install) -> String {
        [
            install.zk_jar().display().to_string(),
            install.log4j_jar().display().to_string(),
            self.base_dir.display().to_string(),
        ]
        .join(":")
    }

    /// Full argv for launching this instance. Flag ordering matters to the
    /// JVM: system properties and JVM flags must precede the
    /// classpath/main-class tail.
    pub fn command_args(&self, install: &Install) -> Vec<String> {
        let mut cmd = vec![install.java().display().to_string()];
        cmd.push(format!("-Dzookeeper.log.dir={}", self.log_dir().display()));
        cmd.push("-Dzookeeper.root.logger=INFO,CONSOLE".to_string());
        if self.enable_jmx {
            cmd.extend(DEFAULT_JMX_ARGS.iter().map(|s| s.to_string()));
            cmd.push(format!(
                "-Dcom.sun.management.jmxremote.port={}",
                self.jmx_port
            ));
        }
        cmd.extend(self.jvm_flags.iter().cloned());
        cmd.push("-classpath".to_string());
        cmd.push(self.classpath(install));
        cmd.push(QUORUM_MAIN.to_string());
        cmd.push(self.zoo_cfg_path().display().to_string());
        cmd
    }

    /// Renders the zoo.cfg text: built-ins merged with `extra` (overrides
    /// win), unset keys dropped, the boolean-valued keys written as
    /// `yes`/`no`, entries sorted by key. Re-rendering the same config is
    /// byte-identical.
    pub fn render_config_file(&self) -> String {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();

        entries.insert("dataDir".into(), self.data_dir().display().to_string());
        entries.insert("tickTime".into(), self.tick_time.to_string());
        entries.insert("initLimit".into(), self.init_limit.to_string());
        entries.insert("syncLimit".into(), self.sync_limit.to_string());
        entries.insert("clientPort".into(), self.client_port.to_string());
        entries.insert(
            "maxClientCnxns".into(),
            self.max_client_cnxns.to_string(),
        );

        if let Some(dir) = &self.data_log_dir {
            entries.insert("dataLogDir".into(), dir.display().to_string());
        }
        if let Some(v) = self.snap_count {
            entries.insert("snapCount".into(), v.to_string());
        }
        if let Some(v) = self.global_outstanding_limit {
            entries.insert("globalOutstandingLimit".into(), v.to_string());
        }
        if let Some(v) = self.pre_alloc_size {
            entries.insert("preAllocSize".into(), v.to_string());
        }
        if let Some(addr) = &self.client_port_address {
            entries.insert("clientPortAddress".into(), addr.clone());
        }
        if let Some(v) = self.min_session_timeout {
            entries.insert("minSessionTimeout".into(), v.to_string());
        }
        if let Some(v) = self.max_session_timeout {
            entries.insert("maxSessionTimeout".into(), v.to_string());
        }
        if let Some(v) = self.force_sync {
            entries.insert("forceSync".into(), yes_no(v).to_string());
        }
        if let Some(v) = self.leader_serves {
            entries.insert("leaderServes".into(), yes_no(v).to_string());
        }
        if let Some(v) = self.skip_acl {
            entries.insert("skipACL".into(), yes_no(v).to_string());
        }

        for (key, value) in &self.extra {
            let value = if YES_NO_KEYS.contains(&key.as_str()) {
                normalize_yes_no(value).to_string()
            } else {
                value.clone()
            };
            entries.insert(key.clone(), value);
        }

        entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Loads a config from a YAML file; absent keys take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ShepherdError::Config(format!("Failed to read config file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ShepherdError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Writes the config as YAML, atomically via a temporary file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| ShepherdError::Config(format!("Failed to serialize config: {}", e)))?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ShepherdError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Write atomically using a temporary file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, yaml)
            .map_err(|e| ShepherdError::Config(format!("Failed to write config: {}", e)))?;

        fs::rename(&temp_path, path)
            .map_err(|e| ShepherdError::Config(format!("Failed to save config: {}", e)))?;

        Ok(())
    }
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "yes"
    } else {
        "no"
    }
}

/// Raw override values for the yes/no keys: only explicit negatives render
/// as `no`, anything else counts as enabled.
fn normalize_yes_no(value: &str) -> &'static str {
    match value {
        "no" | "false" => "no",
        _ => "yes",
    }
}
