//! Static profile extraction from source text
//!
//! Counts, per source unit:
//! - import lines, and the root module each one pulls in
//! - control flow (`if/for/while/match/try`, weight 1), `async/await`
//!   (weight 2) and type constructs (`class/struct/impl`, weight 3)
//! - dependencies found in the ML, DB and heavy dependency tables

use crate::error::ModelResult;
use crate::profile::{FunctionProfile, ModuleType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named piece of source code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Function or module name
    pub name: String,
    /// Source text
    pub source: String,
    /// Deployment package size, if known; defaults to the source length
    #[serde(default)]
    pub package_bytes: Option<u64>,
}

impl SourceUnit {
    /// Unit with unknown package size
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            package_bytes: None,
        }
    }
}

/// Dependency tables and weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Machine-learning libraries
    pub ml_deps: Vec<String>,
    /// Database drivers and ORMs
    pub db_deps: Vec<String>,
    /// Other libraries with expensive initialization
    pub heavy_deps: Vec<String>,
    /// Weight of an ML dependency
    pub ml_weight: f64,
    /// Weight of a DB dependency
    pub db_weight: f64,
    /// Weight of a heavy dependency
    pub heavy_weight: f64,
    /// Weight of any other dependency
    pub base_weight: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(|s| (*s).to_string()).collect();
        Self {
            ml_deps: owned(&[
                "tensorflow", "torch", "sklearn", "keras", "transformers", "xgboost", "lightgbm",
                "onnxruntime", "candle", "tch",
            ]),
            db_deps: owned(&[
                "psycopg2", "sqlalchemy", "pymongo", "redis", "mysql", "sqlite3", "sqlx",
                "diesel", "postgres", "mongodb",
            ]),
            heavy_deps: owned(&[
                "pandas", "numpy", "scipy", "boto3", "matplotlib", "cv2", "pyspark", "polars",
                "arrow", "tokio",
            ]),
            ml_weight: 3.0,
            db_weight: 1.5,
            heavy_weight: 2.0,
            base_weight: 0.5,
        }
    }
}

/// Builds [`FunctionProfile`]s from [`SourceUnit`]s
#[derive(Debug, Clone)]
pub struct ProfileExtractor {
    config: ExtractorConfig,
    ml: HashSet<String>,
    db: HashSet<String>,
    heavy: HashSet<String>,
    import_line: Regex,
    control_flow: Regex,
    async_construct: Regex,
    type_construct: Regex,
}

impl ProfileExtractor {
    /// Compile patterns for a dependency configuration
    ///
    /// # Errors
    /// Returns `ModelError::Pattern` if a pattern fails to compile
    pub fn new(config: ExtractorConfig) -> ModelResult<Self> {
        let lower = |names: &[String]| names.iter().map(|s| s.to_ascii_lowercase()).collect();
        Ok(Self {
            ml: lower(&config.ml_deps),
            db: lower(&config.db_deps),
            heavy: lower(&config.heavy_deps),
            config,
            import_line: Regex::new(
                r#"(?m)^\s*(?:from\s+([A-Za-z_][\w.]*)\s+import\b|import\s+([A-Za-z_][\w.]*)|use\s+([A-Za-z_]\w*)|(?:const|let|var)\s+\w+\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\))"#,
            )?,
            control_flow: Regex::new(r"\b(?:if|elif|for|while|match|try|except|catch|switch)\b")?,
            async_construct: Regex::new(r"\b(?:async|await)\b")?,
            type_construct: Regex::new(r"\b(?:class|struct|impl|trait|interface)\b")?,
        })
    }

    /// Extractor with the default dependency tables
    ///
    /// # Errors
    /// Returns `ModelError::Pattern` if a pattern fails to compile
    pub fn with_defaults() -> ModelResult<Self> {
        Self::new(ExtractorConfig::default())
    }

    /// Root modules imported by `source`, in order of appearance
    #[must_use]
    pub fn imports(&self, source: &str) -> Vec<String> {
        self.import_line
            .captures_iter(source)
            .filter_map(|caps| (1..=4).find_map(|i| caps.get(i)))
            .map(|m| {
                let path = m.as_str();
                let root = path.split(['.', '/', ':']).find(|s| !s.is_empty()).unwrap_or(path);
                root.to_ascii_lowercase()
            })
            .collect()
    }

    /// Weighted construct count
    #[must_use]
    pub fn complexity(&self, source: &str) -> f64 {
        let count = |re: &Regex| {
            #[allow(clippy::cast_precision_loss)]
            let n = re.find_iter(source).count() as f64;
            n
        };
        count(&self.control_flow) + 2.0 * count(&self.async_construct) + 3.0 * count(&self.type_construct)
    }

    /// Profile one unit
    #[must_use]
    pub fn extract(&self, unit: &SourceUnit) -> FunctionProfile {
        let imports = self.imports(&unit.source);
        let unique: HashSet<&str> = imports.iter().map(String::as_str).collect();

        let mut dependency_weight = 0.0;
        let (mut ml, mut db, mut heavy) = (false, false, false);
        for dep in &unique {
            if self.ml.contains(*dep) {
                ml = true;
                dependency_weight += self.config.ml_weight;
            } else if self.db.contains(*dep) {
                db = true;
                dependency_weight += self.config.db_weight;
            } else if self.heavy.contains(*dep) {
                heavy = true;
                dependency_weight += self.config.heavy_weight;
            } else {
                dependency_weight += self.config.base_weight;
            }
        }

        FunctionProfile {
            name: unit.name.clone(),
            size_bytes: unit.package_bytes.unwrap_or(unit.source.len() as u64),
            import_count: u32::try_from(imports.len()).unwrap_or(u32::MAX),
            dependency_weight,
            complexity_score: self.complexity(&unit.source),
            has_ml_deps: ml,
            has_db_deps: db,
            has_heavy_deps: heavy,
            module_type: ModuleType::infer(&unit.name),
        }
    }

    /// Profile many units
    #[must_use]
    pub fn extract_all(&self, units: &[SourceUnit]) -> Vec<FunctionProfile> {
        units.iter().map(|u| self.extract(u)).collect()
    }
}
