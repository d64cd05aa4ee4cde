//! Function profiles and their feature vectors

use serde::{Deserialize, Serialize};

/// Role of the module a function lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    /// Request handler
    Handler,
    /// Long-lived service logic
    Service,
    /// Background worker
    Worker,
    /// Shared library code
    Library,
    /// One-off script
    Script,
}

impl ModuleType {
    /// Every module type, in one-hot order
    pub const ALL: [Self; 5] = [
        Self::Handler,
        Self::Service,
        Self::Worker,
        Self::Library,
        Self::Script,
    ];

    /// Guess from a unit name (`*_handler`, `*service*`, ...)
    #[must_use]
    pub fn infer(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("handler") || lower.contains("api") || lower.contains("view") {
            Self::Handler
        } else if lower.contains("service") {
            Self::Service
        } else if lower.contains("worker") || lower.contains("task") || lower.contains("job") {
            Self::Worker
        } else if lower.contains("script") || lower.contains("cli") {
            Self::Script
        } else {
            Self::Library
        }
    }

    fn one_hot(self) -> [f64; 5] {
        let mut v = [0.0; 5];
        if let Some(i) = Self::ALL.iter().position(|m| *m == self) {
            v[i] = 1.0;
        }
        v
    }
}

/// Names of the entries of [`FunctionProfile::features`]
pub const FEATURE_NAMES: [&str; 12] = [
    "size_mb",
    "import_count",
    "dependency_weight",
    "complexity_score",
    "has_ml_deps",
    "has_db_deps",
    "has_heavy_deps",
    "module_handler",
    "module_service",
    "module_worker",
    "module_library",
    "module_script",
];

/// Static description of a deployable function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionProfile {
    /// Function or module name
    pub name: String,
    /// Deployment package size
    pub size_bytes: u64,
    /// Import statements
    pub import_count: u32,
    /// Weighted dependency load
    pub dependency_weight: f64,
    /// Weighted count of control-flow, async and type constructs
    pub complexity_score: f64,
    /// Imports a machine-learning library
    pub has_ml_deps: bool,
    /// Imports a database driver
    pub has_db_deps: bool,
    /// Imports another heavyweight library
    pub has_heavy_deps: bool,
    /// Module role
    pub module_type: ModuleType,
}

impl FunctionProfile {
    /// Package size in MiB
    #[must_use]
    pub fn size_mb(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let bytes = self.size_bytes as f64;
        bytes / (1024.0 * 1024.0)
    }

    /// Numeric feature vector, ordered as [`FEATURE_NAMES`]
    #[must_use]
    pub fn features(&self) -> Vec<f64> {
        let mut v = Vec::with_capacity(FEATURE_NAMES.len());
        v.push(self.size_mb());
        v.push(f64::from(self.import_count));
        v.push(self.dependency_weight);
        v.push(self.complexity_score);
        v.push(flag(self.has_ml_deps));
        v.push(flag(self.has_db_deps));
        v.push(flag(self.has_heavy_deps));
        v.extend_from_slice(&self.module_type.one_hot());
        v
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_vector_layout() {
        let p = FunctionProfile {
            name: "ingest_worker".into(),
            size_bytes: 2 * 1024 * 1024,
            import_count: 7,
            dependency_weight: 3.5,
            complexity_score: 12.0,
            has_ml_deps: true,
            has_db_deps: false,
            has_heavy_deps: true,
            module_type: ModuleType::Worker,
        };
        let f = p.features();
        assert_eq!(f.len(), FEATURE_NAMES.len());
        assert_eq!(&f[..7], &[2.0, 7.0, 3.5, 12.0, 1.0, 0.0, 1.0]);
        assert_eq!(&f[7..], &[0.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn infer_module_type() {
        assert_eq!(ModuleType::infer("orders_handler"), ModuleType::Handler);
        assert_eq!(ModuleType::infer("BillingService"), ModuleType::Service);
        assert_eq!(ModuleType::infer("nightly_job"), ModuleType::Worker);
        assert_eq!(ModuleType::infer("migrate_script"), ModuleType::Script);
        assert_eq!(ModuleType::infer("utils"), ModuleType::Library);
    }
}
