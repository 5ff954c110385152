use serde::Deserialize;
use serde_json::json;

use partnerlens_core::Scenario;
use partnerlens_infra::jobs::{Job, JobStatusView, StoredAnalysis};

// -------------------------
// Request DTOs
// -------------------------

// Scenario creation deserializes straight into `partnerlens_core::NewScenario`.

#[derive(Debug, Deserialize)]
pub struct PartnerSuggestionsRequest {
    pub brand_name: Option<String>,
    pub industry: Option<String>,
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn scenario_to_json(s: Scenario) -> serde_json::Value {
    json!({
        "id": s.id.to_string(),
        "brand_a": s.brand_a,
        "brand_b": s.brand_b,
        "partnership_type": s.partnership_type,
        "target_audience": s.target_audience,
        "budget_range": s.budget_range,
        "status": s.status.as_str(),
        "created_at": s.created_at.to_rfc3339(),
        "updated_at": s.updated_at.to_rfc3339(),
    })
}

fn job_fields(job: &Job) -> serde_json::Map<String, serde_json::Value> {
    let mut fields = serde_json::Map::new();
    fields.insert("job_id".into(), json!(job.id.to_string()));
    fields.insert("scenario_id".into(), json!(job.scenario_id.to_string()));
    fields.insert("status".into(), json!(job.status.as_str()));
    fields.insert("progress".into(), json!(job.progress));
    if let Some(error) = &job.error {
        fields.insert("error".into(), json!(error));
    }
    fields.insert("created_at".into(), json!(job.created_at.to_rfc3339()));
    fields.insert("started_at".into(), json!(job.started_at.map(|t| t.to_rfc3339())));
    fields.insert("completed_at".into(), json!(job.completed_at.map(|t| t.to_rfc3339())));
    fields
}

/// The analysis payload as callers see it. The internal diagnostic stays in storage.
pub fn analysis_to_json(stored: StoredAnalysis) -> serde_json::Value {
    let outcome = stored.outcome;
    let r = outcome.result;
    let mut value = json!({
        "brand_alignment_score": r.brand_alignment_score,
        "audience_overlap_percentage": r.audience_overlap_percentage,
        "roi_projection": r.roi_projection,
        "risk_level": r.risk_level.as_str(),
        "key_risks": r.key_risks,
        "recommendations": r.recommendations,
        "market_insights": r.market_insights,
        "service_used": outcome.provenance.as_str(),
        "model": outcome.model,
        "tokens_used": outcome.tokens_used,
        "analysis_duration": outcome.analysis_duration,
        "created_at": stored.created_at.to_rfc3339(),
    });
    if !r.defaulted_fields.is_empty() {
        value["defaulted_fields"] = json!(r.defaulted_fields);
    }
    value
}

pub fn job_view_to_json(view: JobStatusView) -> serde_json::Value {
    let mut fields = job_fields(&view.job);
    if let Some(analysis) = view.analysis {
        fields.insert("analysis".into(), analysis_to_json(analysis));
    }
    serde_json::Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use partnerlens_ai::{AnalysisOutcome, AnalysisResult, MarketInsights, RiskLevel};
    use partnerlens_core::{ScenarioId, UserId};

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            brand_alignment_score: 8.0,
            audience_overlap_percentage: 70.0,
            roi_projection: 120.0,
            risk_level: RiskLevel::Low,
            key_risks: vec!["Dilution".into()],
            recommendations: vec!["Pilot".into()],
            market_insights: MarketInsights {
                brand_synergy: "a".into(),
                audience_analysis: "b".into(),
                competitive_landscape: "c".into(),
                execution_strategy: "d".into(),
            },
            defaulted_fields: Vec::new(),
        }
    }

    #[test]
    fn pending_job_has_no_error_or_analysis() {
        let job = Job::new(ScenarioId::new(), UserId::new(), Utc::now());
        let value = job_view_to_json(JobStatusView { job, analysis: None });

        assert_eq!(value["status"], "pending");
        assert_eq!(value["progress"], 0);
        assert!(value.get("error").is_none());
        assert!(value.get("analysis").is_none());
        assert!(value["started_at"].is_null());
    }

    #[test]
    fn analysis_hides_diagnostic() {
        let job = Job::new(ScenarioId::new(), UserId::new(), Utc::now());
        let stored = StoredAnalysis {
            job_id: job.id,
            scenario_id: job.scenario_id,
            outcome: AnalysisOutcome::fallback(sample_result(), "provider timed out"),
            created_at: Utc::now(),
        };

        let value = analysis_to_json(stored);

        assert_eq!(value["service_used"], "fallback");
        assert_eq!(value["risk_level"], "low");
        assert_eq!(value["tokens_used"], 0);
        assert!(value.get("diagnostic").is_none());
        assert!(!value.to_string().contains("timed out"));
        assert!(value.get("defaulted_fields").is_none());
    }

    #[test]
    fn defaulted_fields_are_reported() {
        let job = Job::new(ScenarioId::new(), UserId::new(), Utc::now());
        let mut result = sample_result();
        result.mark_defaulted("roi_projection");
        let stored = StoredAnalysis {
            job_id: job.id,
            scenario_id: job.scenario_id,
            outcome: AnalysisOutcome::fallback(result, "unused"),
            created_at: Utc::now(),
        };

        let value = analysis_to_json(stored);

        assert_eq!(value["defaulted_fields"], json!(["roi_projection"]));
    }
}
