use partnerlens_core::Scenario;

pub const ANALYST_SYSTEM_PROMPT: &str = "You are an expert luxury brand partnership analyst with deep knowledge of \
luxury market dynamics and consumer behavior, brand positioning and alignment strategies, partnership ROI \
calculation and risk assessment, and audience segmentation and overlap analysis. Provide detailed, actionable \
insights for luxury brand partnerships.";

pub const STRATEGIST_SYSTEM_PROMPT: &str = "You are a luxury brand partnership strategist.";

/// User prompt asking for the structured analysis JSON.
pub fn build_analysis_prompt(scenario: &Scenario) -> String {
    let unknown = "Unknown";
    format!(
        r#"Analyze this luxury brand partnership scenario and provide detailed insights:

**Partnership Details:**
- Brand A: {brand_a}
- Brand B: {brand_b}
- Partnership Type: {partnership_type}
- Target Audience: {audience}
- Budget Range: {budget}

Please provide your analysis in the following JSON format:
{{
    "brand_alignment_score": <float between 0-10>,
    "audience_overlap_percentage": <float between 0-100>,
    "roi_projection": <float representing percentage ROI>,
    "risk_level": "<low|medium|high>",
    "key_risks": ["Risk factor 1", "Risk factor 2", "Risk factor 3"],
    "recommendations": ["Recommendation 1", "Recommendation 2", "Recommendation 3"],
    "market_insights": {{
        "brand_synergy": "How well the brands complement each other",
        "audience_analysis": "Audience overlap and expansion opportunities",
        "competitive_landscape": "Market positioning and competitive advantages",
        "execution_strategy": "Recommended approach for partnership execution"
    }}
}}

Focus on luxury market dynamics, brand prestige considerations, and high-net-worth consumer behavior.
"#,
        brand_a = scenario.brand_a,
        brand_b = scenario.brand_b,
        partnership_type = scenario.partnership_type,
        audience = scenario.target_audience.as_deref().unwrap_or(unknown),
        budget = scenario.budget_range.as_deref().unwrap_or(unknown),
    )
}

/// User prompt asking for partner ideas for a single brand.
pub fn build_suggestions_prompt(brand_name: &str, industry: Option<&str>) -> String {
    let focus = industry
        .map(|i| format!("Focus on {i} industry connections.\n"))
        .unwrap_or_default();
    format!(
        "Suggest 5 potential luxury brand partnership opportunities for {brand_name}.\n\
         Consider brand alignment, market positioning, and audience synergies.\n\
         {focus}\n\
         Provide suggestions in JSON format with partner names, partnership types, and rationale.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use partnerlens_core::{NewScenario, UserId};

    #[test]
    fn analysis_prompt_names_both_brands_and_unknown_optionals() {
        let s = NewScenario {
            brand_a: Some("Hermès".into()),
            brand_b: Some("Kith".into()),
            partnership_type: Some("collaboration".into()),
            ..Default::default()
        }
        .into_scenario(UserId::new(), Utc::now())
        .unwrap();

        let prompt = build_analysis_prompt(&s);
        assert!(prompt.contains("Brand A: Hermès"));
        assert!(prompt.contains("Brand B: Kith"));
        assert!(prompt.contains("Target Audience: Unknown"));
        assert!(prompt.contains("\"market_insights\""));
    }

    #[test]
    fn suggestions_prompt_mentions_industry_only_when_given() {
        assert!(build_suggestions_prompt("Gucci", Some("hospitality")).contains("hospitality industry"));
        assert!(!build_suggestions_prompt("Gucci", None).contains("industry connections"));
    }
}
