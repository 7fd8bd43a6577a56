// Copyright 2024-2026 The jitdiff authors

//! The YAML configuration file.
//!
//! Read once at startup, before any component is built. Any string value
//! beginning with `$` is replaced by the named environment variable, so
//! campaign configs can be shared between machines. Existence checks for
//! toolchain binaries live in the adapter constructors, not here; this module
//! only validates shape and ranges.

use std::collections::BTreeMap;
use std::env;
use std::fs::read_to_string;

use anyhow::{bail, Context};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::Result;

/// Mutation policies Artemis understands.
const POLICIES: &[&str] = &["artemis"];

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Number of worker threads, each owning a VM handle.
    pub num_proc: usize,
    /// Wall-clock deadline in seconds for one reference run; mutants get twice this.
    pub prog_timeout: u64,
    /// Root seed; every trial derives its own RNG from this plus its index.
    pub rand_seed: u64,
    /// Mutants to execute successfully per reference (K).
    pub num_mutation: usize,
    /// Whether to persist timeout buckets, which can be voluminous.
    pub save_timeouts: bool,
    /// Existing directory receiving the persisted layout.
    pub out_dir: Utf8PathBuf,
    pub java: JavaConfig,
    pub jvm: JvmConfig,
    pub generator: GeneratorConfig,
    pub artemis: ArtemisConfig,
}

/// The host JDK used by the mutator and the ART compile path.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JavaConfig {
    pub home: Utf8PathBuf,
    #[serde(default)]
    pub classpath: Vec<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum JvmConfig {
    Hotspot {
        java_home: Utf8PathBuf,
        #[serde(default)]
        classpath: Vec<String>,
        #[serde(default)]
        options: Vec<String>,
    },
    Openj9 {
        java_home: Utf8PathBuf,
        #[serde(default)]
        classpath: Vec<String>,
        #[serde(default)]
        options: Vec<String>,
    },
    Graal {
        java_home: Utf8PathBuf,
        #[serde(default)]
        classpath: Vec<String>,
        #[serde(default)]
        options: Vec<String>,
    },
    HostArt {
        host_home: Utf8PathBuf,
        min_api: u32,
        #[serde(default)]
        options: Vec<String>,
    },
    TargetArt {
        android_home: Utf8PathBuf,
        build_tools: String,
        serial_no: String,
        app_process: bool,
        min_api: u32,
        #[serde(default)]
        options: Vec<String>,
    },
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "name")]
pub enum GeneratorConfig {
    /// The random fuzzer; `conf: none` selects its bundled default config.
    #[serde(rename = "Java*Fuzzer")]
    JavaFuzzer {
        out_dir: Utf8PathBuf,
        #[serde(default)]
        conf: Option<String>,
    },
    #[serde(rename = "JFuzz")]
    JFuzz {
        out_dir: Utf8PathBuf,
        #[serde(default = "default_expr_depth")]
        max_expr_depth: u32,
        max_stmt_list_size: u32,
        max_nested_branch: u32,
        max_nested_loop: u32,
        max_nested_try_catch: u32,
    },
    #[serde(rename = "ExistingTests")]
    ExistingTests {
        out_dir: Utf8PathBuf,
        exist_dir: Utf8PathBuf,
    },
}

fn default_expr_depth() -> u32 {
    5
}

impl GeneratorConfig {
    pub fn out_dir(&self) -> &Utf8Path {
        match self {
            GeneratorConfig::JavaFuzzer { out_dir, .. }
            | GeneratorConfig::JFuzz { out_dir, .. }
            | GeneratorConfig::ExistingTests { out_dir, .. } => out_dir,
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtemisConfig {
    pub jar: Utf8PathBuf,
    pub code_bricks: Utf8PathBuf,
    pub policy: String,
    pub min_loop_trip: u32,
    pub max_loop_trip: u32,
    #[serde(default)]
    pub extra_opts: BTreeMap<String, String>,
}

impl Config {
    pub fn read_file(path: &Utf8Path) -> Result<Config> {
        let yaml = read_to_string(path).with_context(|| format!("read config {path:?}"))?;
        Config::from_str(&yaml)
    }

    fn from_str(yaml: &str) -> Result<Config> {
        let mut value: serde_yaml::Value =
            serde_yaml::from_str(yaml).context("parse yaml config")?;
        resolve_env_vars(&mut value, "")?;
        let config: Config =
            serde_yaml::from_value(value).context("interpret yaml config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.num_proc == 0 {
            bail!(".num_proc must be at least 1");
        }
        if !self.out_dir.is_dir() {
            bail!(".out_dir does not exist or is not a directory: {}", self.out_dir);
        }
        if !POLICIES.contains(&self.artemis.policy.as_str()) {
            bail!(".artemis.policy does not support {}", self.artemis.policy);
        }
        if self.artemis.min_loop_trip > self.artemis.max_loop_trip {
            bail!(".artemis loop trips must satisfy min <= max");
        }
        Ok(())
    }
}

/// Replace every string scalar starting with `$` by the environment variable
/// it names. `key_path` tracks the position for error messages.
fn resolve_env_vars(value: &mut serde_yaml::Value, key_path: &str) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) if s.starts_with('$') => {
            let var = &s[1..];
            let resolved = env::var(var).with_context(|| {
                format!("{key_path}'s environment variable ${var} is not set")
            })?;
            *s = resolved;
        }
        serde_yaml::Value::Mapping(map) => {
            for (key, child) in map.iter_mut() {
                let name = key.as_str().unwrap_or("?");
                resolve_env_vars(child, &format!("{key_path}.{name}"))?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for (i, child) in seq.iter_mut().enumerate() {
                resolve_env_vars(child, &format!("{key_path}[{i}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use indoc::{formatdoc, indoc};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn minimal_yaml(out_dir: &str) -> String {
        formatdoc! {r#"
            num_proc: 4
            prog_timeout: 10
            rand_seed: 42
            num_mutation: 3
            save_timeouts: false
            out_dir: {out_dir}
            java:
              home: /opt/jdk
            jvm:
              type: hotspot
              java_home: /opt/jdk
              options: ["-XX:+PrintCompilation"]
            generator:
              name: "Java*Fuzzer"
              out_dir: {out_dir}
              conf: none
            artemis:
              jar: /opt/artemis/artemis.jar
              code_bricks: /opt/artemis/bricks
              policy: artemis
              min_loop_trip: 32
              max_loop_trip: 256
        "#}
    }

    #[test]
    fn parses_minimal_hotspot_config() {
        let out_dir = TempDir::new().unwrap();
        let config = Config::from_str(&minimal_yaml(out_dir.path().to_str().unwrap())).unwrap();
        assert_eq!(config.num_proc, 4);
        assert_eq!(config.prog_timeout, 10);
        assert_eq!(config.rand_seed, 42);
        assert!(!config.save_timeouts);
        match &config.jvm {
            JvmConfig::Hotspot { java_home, options, .. } => {
                assert_eq!(java_home, "/opt/jdk");
                assert_eq!(options, &["-XX:+PrintCompilation"]);
            }
            other => panic!("unexpected jvm config {other:?}"),
        }
        match &config.generator {
            GeneratorConfig::JavaFuzzer { conf, .. } => assert_eq!(conf.as_deref(), Some("none")),
            other => panic!("unexpected generator config {other:?}"),
        }
    }

    #[test]
    fn parses_target_art_variant() {
        let out_dir = TempDir::new().unwrap();
        let yaml = minimal_yaml(out_dir.path().to_str().unwrap()).replace(
            indoc! {"
                jvm:
                  type: hotspot
                  java_home: /opt/jdk
                  options: [\"-XX:+PrintCompilation\"]
            "},
            indoc! {"
                jvm:
                  type: target-art
                  android_home: /opt/android
                  build_tools: '34.0.0'
                  serial_no: emulator-5554
                  app_process: true
                  min_api: 24
            "},
        );
        let config = Config::from_str(&yaml).unwrap();
        match &config.jvm {
            JvmConfig::TargetArt {
                serial_no,
                app_process,
                min_api,
                ..
            } => {
                assert_eq!(serial_no, "emulator-5554");
                assert!(app_process);
                assert_eq!(*min_api, 24);
            }
            other => panic!("unexpected jvm config {other:?}"),
        }
    }

    #[test]
    fn resolves_environment_references() {
        let out_dir = TempDir::new().unwrap();
        std::env::set_var("JITDIFF_TEST_JDK", "/env/jdk");
        let yaml = minimal_yaml(out_dir.path().to_str().unwrap())
            .replace("home: /opt/jdk", "home: $JITDIFF_TEST_JDK");
        let config = Config::from_str(&yaml).unwrap();
        assert_eq!(config.java.home, "/env/jdk");
    }

    #[test]
    fn unset_environment_reference_is_an_error() {
        let out_dir = TempDir::new().unwrap();
        let yaml = minimal_yaml(out_dir.path().to_str().unwrap())
            .replace("home: /opt/jdk", "home: $JITDIFF_TEST_UNSET_VAR");
        let err = Config::from_str(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("JITDIFF_TEST_UNSET_VAR"));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let out_dir = TempDir::new().unwrap();
        let yaml = minimal_yaml(out_dir.path().to_str().unwrap())
            .replace("policy: artemis", "policy: shuffle");
        let err = Config::from_str(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("policy"));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let out_dir = TempDir::new().unwrap();
        let yaml = format!(
            "{}\nnum_widgets: 3\n",
            minimal_yaml(out_dir.path().to_str().unwrap())
        );
        assert!(Config::from_str(&yaml).is_err());
    }

    #[test]
    fn missing_out_dir_is_rejected() {
        let err = Config::from_str(&minimal_yaml("/definitely/not/a/dir")).unwrap_err();
        assert!(format!("{err:#}").contains("out_dir"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let out_dir = TempDir::new().unwrap();
        let yaml = minimal_yaml(out_dir.path().to_str().unwrap())
            .replace("num_proc: 4", "num_proc: 0");
        let err = Config::from_str(&yaml).unwrap_err();
        assert!(format!("{err:#}").contains("num_proc"));
    }
}
