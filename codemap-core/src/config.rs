//! Configuration file support (spec §10.3).
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.codemaprc.json` in project root
//! 3. `codemap.config.json` in project root
//! 4. `"codemap"` key in `package.json`
//!
//! All fields are optional. CLI flags take precedence over config file values.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::impact::MAX_DEPTH;
use crate::orchestrator::BATCH_SIZE;
use crate::scanner::DEFAULT_MAX_FILE_SIZE;

/// codemap configuration loaded from a JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodemapConfig {
    /// Cap on scanned file size in bytes (default: 1 MiB, spec §4.A).
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,

    /// Extra ignore globs layered on top of the fixed always-ignore set.
    #[serde(default)]
    pub extra_ignore_globs: Vec<String>,

    /// Impact analyzer's BFS depth cap (default: 3, spec §4.H).
    #[serde(default)]
    pub impact_depth_cap: Option<u32>,

    /// Overridable risk-band thresholds (spec §4.H).
    #[serde(default)]
    pub risk_thresholds: Option<RiskThresholdConfig>,

    /// Changeset applier's commit-batch size (default: 50, spec §4.F).
    #[serde(default)]
    pub commit_batch_size: Option<usize>,
}

/// Risk classification thresholds, keyed by the bucket each pair admits
/// (spec §4.H's `(file_count, symbol_count)` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskThresholdConfig {
    pub low_max_files: Option<usize>,
    pub low_max_symbols: Option<usize>,
    pub medium_max_files: Option<usize>,
    pub medium_max_symbols: Option<usize>,
    pub high_max_files: Option<usize>,
    pub high_max_symbols: Option<usize>,
}

/// Resolved configuration, defaults applied.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub max_file_size_bytes: u64,
    pub extra_ignore_globs: GlobSet,
    pub impact_depth_cap: u32,
    pub risk_thresholds: ResolvedRiskThresholds,
    pub commit_batch_size: usize,
    /// Path the config was loaded from (`None` if defaults).
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolvedRiskThresholds {
    pub low_max_files: usize,
    pub low_max_symbols: usize,
    pub medium_max_files: usize,
    pub medium_max_symbols: usize,
    pub high_max_files: usize,
    pub high_max_symbols: usize,
}

impl Default for ResolvedRiskThresholds {
    fn default() -> Self {
        ResolvedRiskThresholds {
            low_max_files: 2,
            low_max_symbols: 5,
            medium_max_files: 5,
            medium_max_symbols: 15,
            high_max_files: 10,
            high_max_symbols: 30,
        }
    }
}

impl CodemapConfig {
    /// Validate the configuration for logical errors.
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_file_size_bytes {
            if max == 0 {
                anyhow::bail!("max_file_size_bytes must be positive (got {max})");
            }
        }

        if let Some(depth) = self.impact_depth_cap {
            if depth == 0 {
                anyhow::bail!("impact_depth_cap must be positive (got {depth})");
            }
        }

        if let Some(batch) = self.commit_batch_size {
            if batch == 0 {
                anyhow::bail!("commit_batch_size must be positive (got {batch})");
            }
        }

        if let Some(ref t) = self.risk_thresholds {
            let low_f = t.low_max_files.unwrap_or(2);
            let med_f = t.medium_max_files.unwrap_or(5);
            let high_f = t.high_max_files.unwrap_or(10);
            if low_f >= med_f {
                anyhow::bail!(
                    "risk_thresholds.low_max_files ({low_f}) must be less than medium_max_files ({med_f})"
                );
            }
            if med_f >= high_f {
                anyhow::bail!(
                    "risk_thresholds.medium_max_files ({med_f}) must be less than high_max_files ({high_f})"
                );
            }

            let low_s = t.low_max_symbols.unwrap_or(5);
            let med_s = t.medium_max_symbols.unwrap_or(15);
            let high_s = t.high_max_symbols.unwrap_or(30);
            if low_s >= med_s {
                anyhow::bail!(
                    "risk_thresholds.low_max_symbols ({low_s}) must be less than medium_max_symbols ({med_s})"
                );
            }
            if med_s >= high_s {
                anyhow::bail!(
                    "risk_thresholds.medium_max_symbols ({med_s}) must be less than high_max_symbols ({high_s})"
                );
            }
        }

        for pattern in &self.extra_ignore_globs {
            Glob::new(pattern).with_context(|| format!("invalid ignore glob: {pattern}"))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let mut builder = GlobSetBuilder::new();
        for pattern in &self.extra_ignore_globs {
            builder.add(Glob::new(pattern)?);
        }
        let extra_ignore_globs = builder.build()?;

        let risk_thresholds = match &self.risk_thresholds {
            Some(t) => ResolvedRiskThresholds {
                low_max_files: t.low_max_files.unwrap_or(2),
                low_max_symbols: t.low_max_symbols.unwrap_or(5),
                medium_max_files: t.medium_max_files.unwrap_or(5),
                medium_max_symbols: t.medium_max_symbols.unwrap_or(15),
                high_max_files: t.high_max_files.unwrap_or(10),
                high_max_symbols: t.high_max_symbols.unwrap_or(30),
            },
            None => ResolvedRiskThresholds::default(),
        };

        Ok(ResolvedConfig {
            max_file_size_bytes: self.max_file_size_bytes.unwrap_or(DEFAULT_MAX_FILE_SIZE),
            extra_ignore_globs,
            impact_depth_cap: self.impact_depth_cap.unwrap_or(MAX_DEPTH),
            risk_thresholds,
            commit_batch_size: self.commit_batch_size.unwrap_or(BATCH_SIZE),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file).
    pub fn defaults() -> Result<Self> {
        CodemapConfig::default().resolve()
    }

    /// Whether `path` matches one of the extra ignore globs layered on
    /// top of the fixed always-ignore set.
    pub fn is_extra_ignored(&self, path: &Path) -> bool {
        self.extra_ignore_globs.is_match(path.to_string_lossy().as_ref())
    }
}

/// Discover and load a config file from the project root.
///
/// Search order:
/// 1. `.codemaprc.json`
/// 2. `codemap.config.json`
/// 3. `"codemap"` key in `package.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(CodemapConfig, PathBuf)>> {
    let rc_path = project_root.join(".codemaprc.json");
    if rc_path.exists() {
        let config = load_config_file(&rc_path)?;
        return Ok(Some((config, rc_path)));
    }

    let config_path = project_root.join("codemap.config.json");
    if config_path.exists() {
        let config = load_config_file(&config_path)?;
        return Ok(Some((config, config_path)));
    }

    let pkg_path = project_root.join("package.json");
    if pkg_path.exists() {
        if let Some(config) = load_from_package_json(&pkg_path)? {
            return Ok(Some((config, pkg_path)));
        }
    }

    Ok(None)
}

/// Load config from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<CodemapConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: CodemapConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load codemap config from the "codemap" key in package.json.
fn load_from_package_json(path: &Path) -> Result<Option<CodemapConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let pkg: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    match pkg.get("codemap") {
        Some(value) => {
            let config: CodemapConfig = serde_json::from_value(value.clone())
                .with_context(|| format!("invalid codemap config in {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid codemap config in {}", path.display()))?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

/// Load and resolve config for a project.
///
/// If `config_path` is provided, loads from that file. Otherwise,
/// discovers config from the project root. Returns default config if
/// nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (CodemapConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
