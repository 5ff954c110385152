use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound of the brand alignment scale used across the deployment.
pub const ALIGNMENT_SCALE_MAX: f64 = 10.0;
pub const OVERLAP_MAX: f64 = 100.0;

pub const DEFAULT_ALIGNMENT: f64 = 7.5;
pub const DEFAULT_OVERLAP: f64 = 65.0;
pub const DEFAULT_ROI: f64 = 150.0;

pub const DEFAULT_KEY_RISKS: [&str; 2] = ["Market volatility", "Brand alignment challenges"];
pub const DEFAULT_RECOMMENDATIONS: [&str; 2] = ["Conduct pilot program", "Monitor brand perception"];

/// Coarse risk classification of a partnership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown risk level: {0}")]
pub struct UnknownRiskLevel(pub String);

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "moderate" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(UnknownRiskLevel(other.to_string())),
        }
    }
}

/// Narrative insights, one entry per named facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketInsights {
    pub brand_synergy: String,
    pub audience_analysis: String,
    pub competitive_landscape: String,
    pub execution_strategy: String,
}

impl MarketInsights {
    pub const FACETS: [&'static str; 4] = [
        "brand_synergy",
        "audience_analysis",
        "competitive_landscape",
        "execution_strategy",
    ];

    pub fn facet_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "brand_synergy" => Some(&mut self.brand_synergy),
            "audience_analysis" => Some(&mut self.audience_analysis),
            "competitive_landscape" => Some(&mut self.competitive_landscape),
            "execution_strategy" => Some(&mut self.execution_strategy),
            _ => None,
        }
    }
}

impl Default for MarketInsights {
    fn default() -> Self {
        Self {
            brand_synergy: "Complementary brand positioning".to_string(),
            audience_analysis: "Strong demographic overlap".to_string(),
            competitive_landscape: "Favorable market conditions".to_string(),
            execution_strategy: "Phased partnership approach".to_string(),
        }
    }
}

/// Structured assessment of a partnership scenario.
///
/// This is an insight, not domain state: it is attached to the job that
/// produced it and never mutates the scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// On the `0..=ALIGNMENT_SCALE_MAX` scale.
    pub brand_alignment_score: f64,

    /// Percentage in `0..=100`.
    pub audience_overlap_percentage: f64,

    /// Projected ROI percentage, never negative.
    pub roi_projection: f64,

    pub risk_level: RiskLevel,
    pub key_risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub market_insights: MarketInsights,

    /// Fields filled with a default because the source did not provide a usable value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaulted_fields: Vec<String>,
}

impl AnalysisResult {
    /// Enforce every field domain, recording any field that had to be replaced.
    pub fn normalized(mut self) -> Self {
        self.brand_alignment_score = self.bounded(
            "brand_alignment_score",
            self.brand_alignment_score,
            ALIGNMENT_SCALE_MAX,
            DEFAULT_ALIGNMENT,
        );
        self.audience_overlap_percentage = self.bounded(
            "audience_overlap_percentage",
            self.audience_overlap_percentage,
            OVERLAP_MAX,
            DEFAULT_OVERLAP,
        );
        self.roi_projection = self.bounded("roi_projection", self.roi_projection, f64::INFINITY, DEFAULT_ROI);

        self.key_risks = tidy(std::mem::take(&mut self.key_risks));
        if self.key_risks.is_empty() {
            self.key_risks = DEFAULT_KEY_RISKS.iter().map(|s| s.to_string()).collect();
            self.mark_defaulted("key_risks");
        }

        self.recommendations = tidy(std::mem::take(&mut self.recommendations));
        if self.recommendations.is_empty() {
            self.recommendations = DEFAULT_RECOMMENDATIONS.iter().map(|s| s.to_string()).collect();
            self.mark_defaulted("recommendations");
        }

        self
    }

    pub fn mark_defaulted(&mut self, field: &str) {
        if !self.defaulted_fields.iter().any(|f| f == field) {
            self.defaulted_fields.push(field.to_string());
        }
    }

    fn bounded(&mut self, field: &str, value: f64, max: f64, default: f64) -> f64 {
        if value.is_finite() {
            value.clamp(0.0, max)
        } else {
            self.mark_defaulted(field);
            default
        }
    }
}

fn tidy(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Which path produced an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The external language model answered.
    External,
    /// The local rule-based generator stood in for it.
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::External => "external",
            Self::Fallback => "fallback",
        }
    }
}

impl FromStr for Provenance {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "external" => Ok(Self::External),
            "fallback" => Ok(Self::Fallback),
            other => Err(AiError::Internal(format!("unknown provenance: {other}"))),
        }
    }
}

/// How the external model's answer was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// A JSON object was found and read field by field.
    Structured,
    /// No usable JSON; values were inferred from the prose.
    Heuristic,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Heuristic => "heuristic",
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "structured" => Ok(Self::Structured),
            "heuristic" => Ok(Self::Heuristic),
            other => Err(AiError::Internal(format!("unknown response format: {other}"))),
        }
    }
}

/// An analysis plus the facts about how it was obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub provenance: Provenance,
    pub model: Option<String>,
    pub tokens_used: u32,
    /// Wall-clock seconds spent in the external call; zero for fallback.
    pub analysis_duration: f64,
    pub response_format: Option<ResponseFormat>,
    /// Why the external path was abandoned. For operators only.
    pub diagnostic: Option<String>,
}

impl AnalysisOutcome {
    pub fn fallback(result: AnalysisResult, diagnostic: impl Into<String>) -> Self {
        Self {
            result,
            provenance: Provenance::Fallback,
            model: None,
            tokens_used: 0,
            analysis_duration: 0.0,
            response_format: None,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AiError {
    #[error("invalid analysis input: {0}")]
    InvalidInput(String),

    #[error("external model unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> AnalysisResult {
        AnalysisResult {
            brand_alignment_score: 8.0,
            audience_overlap_percentage: 50.0,
            roi_projection: 120.0,
            risk_level: RiskLevel::Medium,
            key_risks: vec!["Execution".into()],
            recommendations: vec!["Pilot".into()],
            market_insights: MarketInsights::default(),
            defaulted_fields: Vec::new(),
        }
    }

    #[test]
    fn normalized_clamps_out_of_range_values() {
        let r = AnalysisResult {
            brand_alignment_score: 14.0,
            audience_overlap_percentage: -3.0,
            roi_projection: -50.0,
            ..result()
        }
        .normalized();

        assert_eq!(r.brand_alignment_score, ALIGNMENT_SCALE_MAX);
        assert_eq!(r.audience_overlap_percentage, 0.0);
        assert_eq!(r.roi_projection, 0.0);
        assert!(r.defaulted_fields.is_empty());
    }

    #[test]
    fn normalized_replaces_non_finite_values_and_empty_lists() {
        let r = AnalysisResult {
            brand_alignment_score: f64::NAN,
            key_risks: vec!["  ".into()],
            recommendations: Vec::new(),
            ..result()
        }
        .normalized();

        assert_eq!(r.brand_alignment_score, DEFAULT_ALIGNMENT);
        assert_eq!(r.key_risks.len(), DEFAULT_KEY_RISKS.len());
        assert_eq!(r.recommendations.len(), DEFAULT_RECOMMENDATIONS.len());
        assert_eq!(
            r.defaulted_fields,
            vec!["brand_alignment_score", "key_risks", "recommendations"]
        );
    }

    #[test]
    fn risk_level_accepts_common_spellings() {
        assert_eq!(" HIGH ".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!("moderate".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("severe".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn provenance_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Provenance::Fallback).unwrap(), "fallback");
    }
}
