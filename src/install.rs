use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, ShepherdError};

/// Logging template written next to each instance's zoo.cfg when no
/// site-specific one is supplied.
pub const LOG4J_TEMPLATE: &str = include_str!("log4j.properties");

/// Locations of the artifacts needed to launch a server: a JVM, the
/// server jar and its log4j companion, plus an optional logging template.
#[derive(Debug, Clone)]
pub struct Install {
    java: PathBuf,
    zk_jar: PathBuf,
    log4j_jar: PathBuf,
    log4j_template: Option<PathBuf>,
}

impl Install {
    /// Builds an install from explicit paths. Nothing is checked here;
    /// callers that want validation go through [`Install::from_env`].
    pub fn new(
        java: impl Into<PathBuf>,
        zk_jar: impl Into<PathBuf>,
        log4j_jar: impl Into<PathBuf>,
    ) -> Self {
        Self {
            java: java.into(),
            zk_jar: zk_jar.into(),
            log4j_jar: log4j_jar.into(),
            log4j_template: None,
        }
    }

    /// Uses `path` as the log4j template instead of the embedded one.
    pub fn with_log4j_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.log4j_template = Some(path.into());
        self
    }

    /// Resolves the install from the environment: `ZK_SERVER_JAR` and
    /// `ZK_LOG4J_JAR` must name existing files, the JVM comes from
    /// `ZK_JAVA` or a `PATH` lookup, and `ZK_LOG4J_PROPS` may point at a
    /// logging template.
    pub fn from_env() -> Result<Self> {
        let zk_jar = required_file_from_env("ZK_SERVER_JAR")?;
        let log4j_jar = required_file_from_env("ZK_LOG4J_JAR")?;

        let java = match env::var_os("ZK_JAVA") {
            Some(v) => PathBuf::from(v),
            None => which("java").ok_or_else(|| {
                ShepherdError::config("no java executable on PATH; set ZK_JAVA to point at one")
            })?,
        };

        let mut install = Install::new(java, zk_jar, log4j_jar);
        if let Some(template) = env::var_os("ZK_LOG4J_PROPS") {
            install = install.with_log4j_template(PathBuf::from(template));
        }
        Ok(install)
    }

    pub fn java(&self) -> &Path {
        &self.java
    }

    pub fn zk_jar(&self) -> &Path {
        &self.zk_jar
    }

    pub fn log4j_jar(&self) -> &Path {
        &self.log4j_jar
    }

    /// Site-specific template, if one was configured.
    pub fn log4j_template(&self) -> Option<&Path> {
        self.log4j_template.as_deref()
    }
}

fn required_file_from_env(var: &str) -> Result<PathBuf> {
    let value =
        env::var_os(var).ok_or_else(|| ShepherdError::config(format!("{} is not set", var)))?;
    let path = PathBuf::from(value);
    if !path.is_file() {
        return Err(ShepherdError::config(format!(
            "{} points at {}, which does not exist",
            var,
            path.display()
        )));
    }
    Ok(path)
}

/// Finds `name` on the `PATH`, returning the first hit.
pub fn which(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
