//! Complexity assessment driving dynamic phase selection.
//!
//! The AI assessment (through the agent) is preferred; the heuristic
//! analyzer here is the fallback and also feeds the preflight scoper's
//! complexity score.

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::artifact::COMPLEXITY_ASSESSMENT_FILENAME;
use crate::error::Result;
use crate::index::ProjectIndex;
use crate::types::{ComplexityLevel, Requirements};

/// Assessment of task complexity and the phases it warrants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityAssessment {
    pub complexity: ComplexityLevel,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default)]
    pub needs_research: bool,
    #[serde(default)]
    pub needs_self_critique: bool,
    #[serde(default)]
    pub estimated_files: u32,
    #[serde(default)]
    pub estimated_services: u32,
    #[serde(default)]
    pub external_integrations: bool,
    #[serde(default)]
    pub infrastructure_changes: bool,
}

impl ComplexityAssessment {
    /// Ordered phases for this complexity level.
    ///
    /// The fixed prelude (discovery through complexity assessment) is
    /// included; the orchestrator filters out the phases it has already
    /// run.
    #[must_use]
    pub fn phases_to_run(&self) -> Vec<&'static str> {
        let mut phases = vec!["discovery", "requirements", "preflight", "senior_review"];

        match self.complexity {
            ComplexityLevel::Simple => {
                phases.extend(["context", "spec_writing", "planning", "validation"]);
            }
            ComplexityLevel::Medium => {
                phases.extend([
                    "historical_context",
                    "context",
                    "spec_writing",
                    "planning",
                    "validation",
                ]);
            }
            ComplexityLevel::Complex => {
                phases.extend([
                    "historical_context",
                    "research",
                    "context",
                    "spec_writing",
                    "self_critique",
                    "planning",
                    "validation",
                ]);
            }
        }

        if self.needs_research && !phases.contains(&"research") {
            let at = phases
                .iter()
                .position(|p| *p == "context")
                .unwrap_or(phases.len());
            phases.insert(at, "research");
        }
        if self.needs_self_critique && !phases.contains(&"self_critique") {
            let at = phases
                .iter()
                .position(|p| *p == "planning")
                .unwrap_or(phases.len());
            phases.insert(at, "self_critique");
        }
        phases
    }
}

const EXTERNAL_INTEGRATION_KEYWORDS: &[&str] = &[
    "api", "webhook", "oauth", "third-party", "integration", "external service", "sdk",
];

const INFRASTRUCTURE_KEYWORDS: &[&str] = &[
    "docker", "kubernetes", "terraform", "ci", "pipeline config", "deploy", "infrastructure",
    "migration",
];

const BROAD_SCOPE_KEYWORDS: &[&str] =
    &["refactor", "all ", "every ", "across", "rewrite", "overhaul"];

/// Heuristic complexity analyzer over the project index.
pub struct ComplexityAnalyzer {
    index: ProjectIndex,
}

impl ComplexityAnalyzer {
    #[must_use]
    pub fn new(index: ProjectIndex) -> Self {
        Self { index }
    }

    /// Estimate complexity from the task description and requirements.
    #[must_use]
    pub fn analyze(
        &self,
        task_description: &str,
        requirements: Option<&Requirements>,
    ) -> ComplexityAssessment {
        let description = task_description.to_lowercase();

        let estimated_files = self.estimate_files(&description, requirements);
        let estimated_services = self.estimate_services(&description, requirements);
        let external_integrations = EXTERNAL_INTEGRATION_KEYWORDS
            .iter()
            .any(|kw| description.contains(kw));
        let infrastructure_changes = INFRASTRUCTURE_KEYWORDS
            .iter()
            .any(|kw| description.contains(kw));

        let score = complexity_score(
            estimated_files,
            estimated_services,
            external_integrations,
            infrastructure_changes,
        );
        let complexity = level_for_score(score);

        let reasoning = format!(
            "~{estimated_files} file(s), {estimated_services} service(s), \
             integrations={external_integrations}, infra={infrastructure_changes} (score {score})"
        );

        ComplexityAssessment {
            complexity,
            confidence: 0.6,
            reasoning,
            needs_research: external_integrations,
            needs_self_critique: complexity == ComplexityLevel::Complex,
            estimated_files,
            estimated_services,
            external_integrations,
            infrastructure_changes,
        }
    }

    fn estimate_files(&self, description: &str, requirements: Option<&Requirements>) -> u32 {
        if let Some(files) = requirements.and_then(|r| r.files_to_modify.as_ref()) {
            if !files.is_empty() {
                return files.len() as u32;
            }
        }
        if BROAD_SCOPE_KEYWORDS.iter().any(|kw| description.contains(kw)) {
            return 8;
        }
        // Count explicit file mentions (tokens with an extension).
        let mentioned = description
            .split_whitespace()
            .filter(|token| {
                token.rsplit_once('.').is_some_and(|(stem, ext)| {
                    !stem.is_empty() && ext.len() <= 4 && ext.chars().all(char::is_alphanumeric)
                })
            })
            .count() as u32;
        mentioned.max(1)
    }

    fn estimate_services(&self, description: &str, requirements: Option<&Requirements>) -> u32 {
        if let Some(services) = requirements.map(|r| &r.services_involved) {
            if !services.is_empty() {
                return services.len() as u32;
            }
        }
        let touched = self
            .index
            .services
            .keys()
            .filter(|name| description.contains(&name.to_lowercase()))
            .count() as u32;
        touched.max(1)
    }
}

/// Score: 1-3 from file count, +1 multi-service, +2 external integrations,
/// +2 infrastructure changes.
#[must_use]
pub fn complexity_score(
    estimated_files: u32,
    estimated_services: u32,
    external_integrations: bool,
    infrastructure_changes: bool,
) -> u32 {
    let mut score = if estimated_files <= 2 {
        1
    } else if estimated_files <= 6 {
        2
    } else {
        3
    };
    if estimated_services > 1 {
        score += 1;
    }
    if external_integrations {
        score += 2;
    }
    if infrastructure_changes {
        score += 2;
    }
    score
}

/// Level thresholds: simple <= 2, medium <= 5, complex above.
#[must_use]
pub fn level_for_score(score: u32) -> ComplexityLevel {
    if score <= 2 {
        ComplexityLevel::Simple
    } else if score <= 5 {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::Complex
    }
}

/// Persist an assessment to the spec directory.
pub fn save_assessment(spec_dir: &Utf8Path, assessment: &ComplexityAssessment) -> Result<()> {
    crate::artifact::save_json(&spec_dir.join(COMPLEXITY_ASSESSMENT_FILENAME), assessment)
}

/// Load a persisted assessment, if present.
#[must_use]
pub fn load_assessment(spec_dir: &Utf8Path) -> Option<ComplexityAssessment> {
    crate::artifact::load_json(&spec_dir.join(COMPLEXITY_ASSESSMENT_FILENAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_thresholds() {
        assert_eq!(complexity_score(1, 1, false, false), 1);
        assert_eq!(complexity_score(4, 1, false, false), 2);
        assert_eq!(complexity_score(9, 1, false, false), 3);
        assert_eq!(complexity_score(9, 2, false, false), 4);
        assert_eq!(complexity_score(9, 2, true, true), 8);
    }

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for_score(2), ComplexityLevel::Simple);
        assert_eq!(level_for_score(3), ComplexityLevel::Medium);
        assert_eq!(level_for_score(5), ComplexityLevel::Medium);
        assert_eq!(level_for_score(6), ComplexityLevel::Complex);
    }

    #[test]
    fn test_simple_phases() {
        let assessment = ComplexityAssessment {
            complexity: ComplexityLevel::Simple,
            confidence: 1.0,
            reasoning: String::new(),
            needs_research: false,
            needs_self_critique: false,
            estimated_files: 1,
            estimated_services: 1,
            external_integrations: false,
            infrastructure_changes: false,
        };
        let phases = assessment.phases_to_run();
        assert!(phases.contains(&"spec_writing"));
        assert!(!phases.contains(&"research"));
        assert!(!phases.contains(&"self_critique"));
    }

    #[test]
    fn test_complex_phases_include_research_and_critique() {
        let assessment = ComplexityAssessment {
            complexity: ComplexityLevel::Complex,
            confidence: 1.0,
            reasoning: String::new(),
            needs_research: false,
            needs_self_critique: false,
            estimated_files: 9,
            estimated_services: 2,
            external_integrations: true,
            infrastructure_changes: true,
        };
        let phases = assessment.phases_to_run();
        assert!(phases.contains(&"research"));
        assert!(phases.contains(&"self_critique"));
    }

    #[test]
    fn test_needs_research_forces_phase() {
        let assessment = ComplexityAssessment {
            complexity: ComplexityLevel::Simple,
            confidence: 1.0,
            reasoning: String::new(),
            needs_research: true,
            needs_self_critique: false,
            estimated_files: 1,
            estimated_services: 1,
            external_integrations: false,
            infrastructure_changes: false,
        };
        let phases = assessment.phases_to_run();
        let research_at = phases.iter().position(|p| *p == "research").unwrap();
        let context_at = phases.iter().position(|p| *p == "context").unwrap();
        assert!(research_at < context_at);
    }

    #[test]
    fn test_analyzer_broad_scope_is_complex_leaning() {
        let analyzer = ComplexityAnalyzer::new(ProjectIndex::default());
        let assessment = analyzer.analyze("Refactor error handling across the backend", None);
        assert!(assessment.estimated_files >= 8);
    }

    #[test]
    fn test_analyzer_uses_requirements_files() {
        let analyzer = ComplexityAnalyzer::new(ProjectIndex::default());
        let requirements = Requirements {
            files_to_modify: Some(vec!["a.rs".into(), "b.rs".into(), "c.rs".into()]),
            ..Default::default()
        };
        let assessment = analyzer.analyze("small tweak", Some(&requirements));
        assert_eq!(assessment.estimated_files, 3);
    }

    #[test]
    fn test_analyzer_integration_keywords() {
        let analyzer = ComplexityAnalyzer::new(ProjectIndex::default());
        let assessment = analyzer.analyze("Add webhook integration for payment provider", None);
        assert!(assessment.external_integrations);
        assert!(assessment.needs_research);
    }
}
