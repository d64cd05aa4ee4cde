//! Slow-function diagnosis
//!
//! Each [`Issue`] is a threshold rule over a profile with a matching
//! suggestion and an improvement factor. The estimated saving of a
//! function is its predicted cold start times the sum of its matched
//! factors, capped at [`MAX_IMPROVEMENT`].

use crate::profile::FunctionProfile;
use serde::{Deserialize, Serialize};

/// Upper bound on the fraction of a cold start any set of fixes can save
pub const MAX_IMPROVEMENT: f64 = 0.7;

/// Thresholds above which a profile property counts as an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisThresholds {
    /// Package size, MiB
    pub large_package_mb: f64,
    /// Import statements
    pub many_imports: u32,
    /// Weighted dependency load
    pub heavy_dependency_weight: f64,
    /// Complexity score
    pub high_complexity: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            large_package_mb: 10.0,
            many_imports: 30,
            heavy_dependency_weight: 15.0,
            high_complexity: 80.0,
        }
    }
}

/// A cold-start cost driver found in a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Issue {
    /// Imports a machine-learning framework
    MlDependencies,
    /// Imports another heavyweight library
    HeavyDependencies,
    /// Package above the size threshold
    LargePackage,
    /// Too many import statements
    ManyImports,
    /// Dependency weight above threshold
    DependencyWeight,
    /// Complexity above threshold
    HighComplexity,
    /// Opens database drivers at load time
    DatabaseDependencies,
}

impl Issue {
    /// Every rule, in reporting order
    pub const ALL: [Self; 7] = [
        Self::MlDependencies,
        Self::HeavyDependencies,
        Self::LargePackage,
        Self::ManyImports,
        Self::DependencyWeight,
        Self::HighComplexity,
        Self::DatabaseDependencies,
    ];

    /// Whether the rule fires for `profile`
    #[must_use]
    pub fn matches(self, profile: &FunctionProfile, t: &AnalysisThresholds) -> bool {
        match self {
            Self::MlDependencies => profile.has_ml_deps,
            Self::HeavyDependencies => profile.has_heavy_deps,
            Self::LargePackage => profile.size_mb() > t.large_package_mb,
            Self::ManyImports => profile.import_count > t.many_imports,
            Self::DependencyWeight => profile.dependency_weight > t.heavy_dependency_weight,
            Self::HighComplexity => profile.complexity_score > t.high_complexity,
            Self::DatabaseDependencies => profile.has_db_deps,
        }
    }

    /// Share of the cold start this fix is expected to save
    #[must_use]
    pub fn improvement_factor(self) -> f64 {
        match self {
            Self::MlDependencies => 0.3,
            Self::HeavyDependencies => 0.25,
            Self::LargePackage => 0.2,
            Self::ManyImports | Self::DependencyWeight => 0.15,
            Self::HighComplexity | Self::DatabaseDependencies => 0.1,
        }
    }

    /// Human-readable issue
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::MlDependencies => "loads machine-learning frameworks at startup",
            Self::HeavyDependencies => "imports heavyweight libraries",
            Self::LargePackage => "large deployment package",
            Self::ManyImports => "many import statements",
            Self::DependencyWeight => "high weighted dependency load",
            Self::HighComplexity => "high code complexity",
            Self::DatabaseDependencies => "initializes database drivers",
        }
    }

    /// Matching remediation
    #[must_use]
    pub fn suggestion(self) -> &'static str {
        match self {
            Self::MlDependencies => "load models lazily or move inference to a warm pool",
            Self::HeavyDependencies => "import heavy libraries inside the code paths that need them",
            Self::LargePackage => "strip unused assets and split the deployment package",
            Self::ManyImports => "consolidate imports and drop unused modules",
            Self::DependencyWeight => "replace heavy dependencies with lighter alternatives",
            Self::HighComplexity => "split the function into smaller units",
            Self::DatabaseDependencies => "reuse pooled connections across invocations",
        }
    }
}

/// Rules that fire for `profile`, in reporting order
#[must_use]
pub fn diagnose(profile: &FunctionProfile, thresholds: &AnalysisThresholds) -> Vec<Issue> {
    Issue::ALL
        .into_iter()
        .filter(|i| i.matches(profile, thresholds))
        .collect()
}

/// `predicted_ms * min(sum of factors, MAX_IMPROVEMENT)`
#[must_use]
pub fn estimated_improvement_ms(predicted_ms: f64, issues: &[Issue]) -> f64 {
    let factor: f64 = issues.iter().map(|i| i.improvement_factor()).sum();
    predicted_ms * factor.min(MAX_IMPROVEMENT)
}

/// Diagnosis of one slow function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowFunctionReport {
    /// Function name
    pub name: String,
    /// Model prediction
    pub predicted_ms: f64,
    /// Matched rules
    pub issues: Vec<Issue>,
    /// Descriptions of the matched rules
    pub main_issues: Vec<String>,
    /// One suggestion per matched rule
    pub optimization_suggestions: Vec<String>,
    /// Expected saving if every suggestion is applied
    pub estimated_improvement_ms: f64,
}

impl SlowFunctionReport {
    /// Build from a profile and its prediction
    #[must_use]
    pub fn new(profile: &FunctionProfile, predicted_ms: f64, thresholds: &AnalysisThresholds) -> Self {
        let issues = diagnose(profile, thresholds);
        Self {
            name: profile.name.clone(),
            predicted_ms,
            main_issues: issues.iter().map(|i| i.description().to_string()).collect(),
            optimization_suggestions: issues.iter().map(|i| i.suggestion().to_string()).collect(),
            estimated_improvement_ms: estimated_improvement_ms(predicted_ms, &issues),
            issues,
        }
    }
}
