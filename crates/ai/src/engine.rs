use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use partnerlens_core::Scenario;

use crate::fallback::FallbackEngine;
use crate::parse::parse_analysis_response;
use crate::prompt::{
    ANALYST_SYSTEM_PROMPT, STRATEGIST_SYSTEM_PROMPT, build_analysis_prompt, build_suggestions_prompt,
};
use crate::provider::{AiProvider, Completion, CompletionRequest, ProviderError};
use crate::result::{AiError, AnalysisOutcome, Provenance};

/// Produces an analysis for a scenario. The job runner's only view of the AI subsystem.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, scenario: &Scenario) -> Result<AnalysisOutcome, AiError>;
}

/// Knobs for the external calls.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard bound on one external call, independent of the HTTP client timeout.
    pub call_timeout: Duration,
    pub suggestion_temperature: f32,
    pub suggestion_max_tokens: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            call_timeout: Duration::from_secs(30),
            suggestion_temperature: 0.7,
            suggestion_max_tokens: 1500,
        }
    }
}

/// Free-form partner ideas for a single brand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartnerSuggestions {
    pub brand_name: String,
    pub suggestions: String,
    pub model: String,
    pub tokens_used: u32,
}

/// External model first, local fallback second.
///
/// The only hard failure is an invalid scenario; every external failure
/// degrades to a fallback-provenance result carrying a diagnostic.
pub struct AnalysisEngine {
    provider: Option<Arc<dyn AiProvider>>,
    fallback: FallbackEngine,
    settings: AnalysisSettings,
}

impl AnalysisEngine {
    pub fn new(provider: Option<Arc<dyn AiProvider>>, fallback: FallbackEngine) -> Self {
        Self {
            provider,
            fallback,
            settings: AnalysisSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn has_external_provider(&self) -> bool {
        self.provider.is_some()
    }

    async fn call_external(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let provider = self.provider.as_ref().ok_or(ProviderError::MissingCredential)?;
        let limit = self.settings.call_timeout;
        match tokio::time::timeout(limit, provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(limit)),
        }
    }

    pub async fn analyze(&self, scenario: &Scenario) -> Result<AnalysisOutcome, AiError> {
        let missing = scenario.missing_fields();
        if !missing.is_empty() {
            return Err(AiError::InvalidInput(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let request = CompletionRequest {
            system_prompt: ANALYST_SYSTEM_PROMPT.to_string(),
            user_prompt: build_analysis_prompt(scenario),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let started = Instant::now();
        match self.call_external(request).await {
            Ok(completion) => {
                let parsed = parse_analysis_response(&completion.text);
                let analysis_duration = started.elapsed().as_secs_f64();
                info!(
                    scenario_id = %scenario.id,
                    tokens_used = completion.tokens_used,
                    format = ?parsed.format,
                    defaulted = parsed.result.defaulted_fields.len(),
                    "external analysis completed"
                );
                Ok(AnalysisOutcome {
                    result: parsed.result,
                    provenance: Provenance::External,
                    model: Some(self.settings.model.clone()),
                    tokens_used: completion.tokens_used,
                    analysis_duration,
                    response_format: Some(parsed.format),
                    diagnostic: None,
                })
            }
            Err(err) => {
                if matches!(err, ProviderError::MissingCredential) {
                    debug!(scenario_id = %scenario.id, "no external provider configured, using fallback");
                } else {
                    warn!(scenario_id = %scenario.id, error = %err, "external analysis failed, using fallback");
                }
                let result = self.fallback.analyze(scenario).await;
                Ok(AnalysisOutcome::fallback(result, err.to_string()))
            }
        }
    }

    /// Partner ideas straight from the external model. No fallback.
    pub async fn suggest_partners(
        &self,
        brand_name: &str,
        industry: Option<&str>,
    ) -> Result<PartnerSuggestions, AiError> {
        let brand_name = brand_name.trim();
        if brand_name.is_empty() {
            return Err(AiError::InvalidInput("brand_name is required".to_string()));
        }
        let industry = industry.map(str::trim).filter(|i| !i.is_empty());

        let request = CompletionRequest {
            system_prompt: STRATEGIST_SYSTEM_PROMPT.to_string(),
            user_prompt: build_suggestions_prompt(brand_name, industry),
            model: self.settings.model.clone(),
            temperature: self.settings.suggestion_temperature,
            max_tokens: self.settings.suggestion_max_tokens,
        };

        let completion = self.call_external(request).await.map_err(|err| {
            warn!(brand_name, error = %err, "partner suggestions failed");
            AiError::ExternalUnavailable(err.to_string())
        })?;

        Ok(PartnerSuggestions {
            brand_name: brand_name.to_string(),
            suggestions: completion.text,
            model: self.settings.model.clone(),
            tokens_used: completion.tokens_used,
        })
    }
}

#[async_trait]
impl Analyzer for AnalysisEngine {
    async fn analyze(&self, scenario: &Scenario) -> Result<AnalysisOutcome, AiError> {
        AnalysisEngine::analyze(self, scenario).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResponseFormat;
    use chrono::Utc;
    use partnerlens_core::{NewScenario, UserId};

    struct Answering(&'static str);

    #[async_trait]
    impl AiProvider for Answering {
        fn name(&self) -> &str {
            "answering"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Ok(Completion {
                text: self.0.to_string(),
                tokens_used: 321,
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl AiProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Err(ProviderError::Status {
                status: 502,
                body: "bad gateway".into(),
            })
        }
    }

    struct Hanging;

    #[async_trait]
    impl AiProvider for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(ProviderError::EmptyResponse)
        }
    }

    fn scenario() -> Scenario {
        NewScenario {
            brand_a: Some("Louis Vuitton".into()),
            brand_b: Some("Supreme".into()),
            partnership_type: Some("co-branding".into()),
            ..Default::default()
        }
        .into_scenario(UserId::new(), Utc::now())
        .unwrap()
    }

    fn engine(provider: Option<Arc<dyn AiProvider>>) -> AnalysisEngine {
        AnalysisEngine::new(provider, FallbackEngine::new())
    }

    #[tokio::test]
    async fn external_answer_is_tagged_external() {
        let e = engine(Some(Arc::new(Answering(r#"{"brand_alignment_score": 9.1, "risk_level": "low"}"#))));
        let out = e.analyze(&scenario()).await.unwrap();

        assert_eq!(out.provenance, Provenance::External);
        assert_eq!(out.tokens_used, 321);
        assert_eq!(out.result.brand_alignment_score, 9.1);
        assert_eq!(out.response_format, Some(ResponseFormat::Structured));
        assert_eq!(out.model.as_deref(), Some("gpt-4"));
        assert!(out.diagnostic.is_none());
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_fallback_with_diagnostic() {
        let out = engine(Some(Arc::new(Failing))).analyze(&scenario()).await.unwrap();

        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.tokens_used, 0);
        assert_eq!(out.analysis_duration, 0.0);
        assert!(out.diagnostic.unwrap().contains("502"));
        assert_eq!(out.result, FallbackEngine::new().generate(&scenario()));
    }

    #[tokio::test]
    async fn missing_provider_degrades_to_fallback() {
        let out = engine(None).analyze(&scenario()).await.unwrap();
        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.diagnostic.as_deref(), Some("no API credential configured"));
    }

    #[tokio::test]
    async fn slow_provider_is_cut_off_by_call_timeout() {
        let e = engine(Some(Arc::new(Hanging))).with_settings(AnalysisSettings {
            call_timeout: Duration::from_millis(50),
            ..AnalysisSettings::default()
        });

        let started = Instant::now();
        let out = e.analyze(&scenario()).await.unwrap();

        assert_eq!(out.provenance, Provenance::Fallback);
        assert!(out.diagnostic.unwrap().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn blank_required_field_is_a_hard_failure() {
        let mut s = scenario();
        s.brand_b = "  ".into();

        let err = engine(None).analyze(&s).await.unwrap_err();
        assert!(matches!(err, AiError::InvalidInput(msg) if msg.contains("brand_b")));
    }

    #[tokio::test]
    async fn suggestions_require_an_external_provider() {
        let err = engine(None).suggest_partners("Gucci", None).await.unwrap_err();
        assert!(matches!(err, AiError::ExternalUnavailable(_)));

        let ok = engine(Some(Arc::new(Answering("[]"))))
            .suggest_partners(" Gucci ", Some("hospitality"))
            .await
            .unwrap();
        assert_eq!(ok.brand_name, "Gucci");
        assert_eq!(ok.tokens_used, 321);
    }
}
