//! Turning free-form model output into a validated [`AnalysisResult`].
//!
//! Two strategies, tried in order:
//! 1. **Structured**: the span between the first `{` and the last `}` is read
//!    as a JSON object and each field is coerced, clamped, or defaulted.
//! 2. **Heuristic**: keyword sentiment over the prose drives the numeric
//!    fields. Used when no JSON object can be read.

use serde_json::{Map, Value};

use crate::result::{
    ALIGNMENT_SCALE_MAX, AnalysisResult, DEFAULT_ALIGNMENT, DEFAULT_OVERLAP, DEFAULT_ROI,
    MarketInsights, ResponseFormat, RiskLevel,
};
use crate::seed::{Seed, round1};

const POSITIVE_WORDS: [&str; 8] = [
    "excellent",
    "strong",
    "good",
    "positive",
    "successful",
    "promising",
    "synergy",
    "complementary",
];

const NEGATIVE_WORDS: [&str; 7] = [
    "poor",
    "weak",
    "challenging",
    "difficult",
    "risky",
    "problematic",
    "conflicting",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub result: AnalysisResult,
    pub format: ResponseFormat,
}

pub fn parse_analysis_response(text: &str) -> ParsedAnalysis {
    match extract_json_object(text) {
        Some(object) => ParsedAnalysis {
            result: from_object(&object),
            format: ResponseFormat::Structured,
        },
        None => {
            tracing::debug!(length = text.len(), "no JSON object in model response, using heuristic extraction");
            ParsedAnalysis {
                result: from_text(text),
                format: ResponseFormat::Heuristic,
            }
        }
    }
}

fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn from_object(object: &Map<String, Value>) -> AnalysisResult {
    let mut defaulted: Vec<String> = Vec::new();
    let mut or_default = |field: &str, value: Option<f64>, default: f64| {
        value.unwrap_or_else(|| {
            defaulted.push(field.to_string());
            default
        })
    };

    let brand_alignment_score = or_default(
        "brand_alignment_score",
        object.get("brand_alignment_score").and_then(as_number).map(rescale_alignment),
        DEFAULT_ALIGNMENT,
    );
    let audience_overlap_percentage = or_default(
        "audience_overlap_percentage",
        object.get("audience_overlap_percentage").and_then(as_number),
        DEFAULT_OVERLAP,
    );
    let roi_projection = or_default(
        "roi_projection",
        object.get("roi_projection").and_then(as_number),
        DEFAULT_ROI,
    );

    let risk_level = object
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<RiskLevel>().ok())
        .unwrap_or_else(|| {
            defaulted.push("risk_level".to_string());
            RiskLevel::Medium
        });

    // Empty lists are defaulted (and recorded) by `normalized`.
    let key_risks = object.get("key_risks").and_then(as_string_list).unwrap_or_default();
    let recommendations = object
        .get("recommendations")
        .and_then(as_string_list)
        .unwrap_or_default();

    let market_insights = read_insights(object.get("market_insights"), &mut defaulted);

    AnalysisResult {
        brand_alignment_score,
        audience_overlap_percentage,
        roi_projection,
        risk_level,
        key_risks,
        recommendations,
        market_insights,
        defaulted_fields: defaulted,
    }
    .normalized()
}

/// Models occasionally answer on a 0-100 scale despite the prompt.
fn rescale_alignment(value: f64) -> f64 {
    if value > ALIGNMENT_SCALE_MAX && value <= 100.0 {
        value / 10.0
    } else {
        value
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn as_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn as_string_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::String(_) => as_text(value).into_iter().collect(),
        _ => return None,
    };
    (!items.is_empty()).then_some(items)
}

fn read_insights(value: Option<&Value>, defaulted: &mut Vec<String>) -> MarketInsights {
    let mut insights = MarketInsights::default();
    let mut provided: Vec<&str> = Vec::new();

    match value {
        Some(Value::Object(map)) => {
            for facet in MarketInsights::FACETS {
                if let Some(text) = map.get(facet).and_then(as_text) {
                    if let Some(slot) = insights.facet_mut(facet) {
                        *slot = text;
                        provided.push(facet);
                    }
                }
            }
        }
        Some(Value::Array(items)) => {
            for (facet, text) in MarketInsights::FACETS.into_iter().zip(items.iter().filter_map(as_text)) {
                if let Some(slot) = insights.facet_mut(facet) {
                    *slot = text;
                    provided.push(facet);
                }
            }
        }
        Some(v) if v.is_string() => {
            if let Some(text) = as_text(v) {
                insights.brand_synergy = text;
                provided.push("brand_synergy");
            }
        }
        _ => {}
    }

    for facet in MarketInsights::FACETS {
        if !provided.contains(&facet) {
            defaulted.push(format!("market_insights.{facet}"));
        }
    }
    insights
}

/// Keyword-sentiment estimate for prose answers.
///
/// A small jitter derived from the text keeps different answers from
/// collapsing onto identical scores while staying reproducible.
pub fn from_text(text: &str) -> AnalysisResult {
    let lower = text.to_lowercase();
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let sentiment = (positive - negative) / (positive + negative).max(1.0);

    let seed = Seed::of(&lower);
    let alignment = round1((5.0 + sentiment * 3.0 + seed.signed(0)).clamp(1.0, ALIGNMENT_SCALE_MAX));
    let overlap = round1((40.0 + sentiment * 30.0 + seed.within(1, -10.0, 15.0)).clamp(0.0, 100.0));
    let roi = round1((100.0 + sentiment * 100.0 + seed.within(2, -30.0, 50.0)).max(0.0));

    let risk_level = if alignment >= 8.0 && overlap >= 70.0 {
        RiskLevel::Low
    } else if alignment <= 4.0 || overlap <= 30.0 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };

    let mut recommendations = Vec::new();
    if lower.contains("co-branding") {
        recommendations.push("Develop co-branded product line".to_string());
    }
    if lower.contains("event") || lower.contains("experience") {
        recommendations.push("Create exclusive brand experiences".to_string());
    }
    if lower.contains("digital") || lower.contains("social") {
        recommendations.push("Leverage digital marketing synergies".to_string());
    }
    if recommendations.is_empty() {
        recommendations = vec![
            "Conduct detailed market research".to_string(),
            "Develop pilot partnership program".to_string(),
            "Monitor brand perception metrics".to_string(),
        ];
    }

    AnalysisResult {
        brand_alignment_score: alignment,
        audience_overlap_percentage: overlap,
        roi_projection: roi,
        risk_level,
        key_risks: vec![
            "Market positioning challenges".to_string(),
            "Brand dilution concerns".to_string(),
            "Execution complexity".to_string(),
        ],
        recommendations,
        market_insights: MarketInsights {
            brand_synergy: "Estimated from the narrative assessment of both brands".to_string(),
            audience_analysis: format!("Estimated {overlap:.1}% audience overlap with growth potential"),
            competitive_landscape: "Dynamic market conditions require careful positioning".to_string(),
            execution_strategy: "Phased approach recommended for optimal results".to_string(),
        },
        defaulted_fields: Vec::new(),
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"Here is my assessment:
    {
        "brand_alignment_score": 8.2,
        "audience_overlap_percentage": 71,
        "roi_projection": "185%",
        "risk_level": "Low",
        "key_risks": ["Brand dilution", ""],
        "recommendations": ["Limited capsule drop", "Invite-only launch"],
        "market_insights": {
            "brand_synergy": "Heritage meets hype",
            "audience_analysis": "Young affluent collectors",
            "competitive_landscape": "Few comparable pairings",
            "execution_strategy": "Two-phase rollout"
        }
    }
    Let me know if you need more."#;

    #[test]
    fn reads_json_embedded_in_prose() {
        let parsed = parse_analysis_response(FULL);
        let r = parsed.result;

        assert_eq!(parsed.format, ResponseFormat::Structured);
        assert_eq!(r.brand_alignment_score, 8.2);
        assert_eq!(r.audience_overlap_percentage, 71.0);
        assert_eq!(r.roi_projection, 185.0);
        assert_eq!(r.risk_level, RiskLevel::Low);
        assert_eq!(r.key_risks, vec!["Brand dilution"]);
        assert_eq!(r.market_insights.execution_strategy, "Two-phase rollout");
        assert!(r.defaulted_fields.is_empty());
    }

    #[test]
    fn missing_fields_are_defaulted_and_recorded() {
        let r = parse_analysis_response(r#"{"brand_alignment_score": 6}"#).result;

        assert_eq!(r.brand_alignment_score, 6.0);
        assert_eq!(r.audience_overlap_percentage, DEFAULT_OVERLAP);
        assert_eq!(r.roi_projection, DEFAULT_ROI);
        assert_eq!(r.risk_level, RiskLevel::Medium);
        assert!(!r.key_risks.is_empty());
        assert!(!r.recommendations.is_empty());
        for field in [
            "audience_overlap_percentage",
            "roi_projection",
            "risk_level",
            "key_risks",
            "recommendations",
            "market_insights.brand_synergy",
        ] {
            assert!(r.defaulted_fields.iter().any(|f| f == field), "{field} not recorded");
        }
        assert!(!r.defaulted_fields.iter().any(|f| f == "brand_alignment_score"));
    }

    #[test]
    fn out_of_domain_values_are_clamped() {
        let r = parse_analysis_response(
            r#"{"brand_alignment_score": 85, "audience_overlap_percentage": 140, "roi_projection": -20}"#,
        )
        .result;

        assert_eq!(r.brand_alignment_score, 8.5);
        assert_eq!(r.audience_overlap_percentage, 100.0);
        assert_eq!(r.roi_projection, 0.0);

        let r = parse_analysis_response(r#"{"brand_alignment_score": 400}"#).result;
        assert_eq!(r.brand_alignment_score, ALIGNMENT_SCALE_MAX);
    }

    #[test]
    fn insight_lists_fill_facets_in_order() {
        let r = parse_analysis_response(r#"{"market_insights": ["Synergy text", "Audience text"]}"#).result;

        assert_eq!(r.market_insights.brand_synergy, "Synergy text");
        assert_eq!(r.market_insights.audience_analysis, "Audience text");
        assert!(r.defaulted_fields.iter().any(|f| f == "market_insights.execution_strategy"));
        assert!(!r.defaulted_fields.iter().any(|f| f == "market_insights.brand_synergy"));
    }

    #[test]
    fn broken_json_falls_back_to_heuristic() {
        let parsed = parse_analysis_response("{ this is not json }");
        assert_eq!(parsed.format, ResponseFormat::Heuristic);
    }

    #[test]
    fn heuristic_tracks_sentiment_and_is_reproducible() {
        let upbeat = "An excellent, promising pairing with strong synergy and complementary positioning.";
        let gloomy = "A risky, problematic and conflicting pairing with weak and poor fit.";

        let good = parse_analysis_response(upbeat).result;
        let bad = parse_analysis_response(gloomy).result;

        assert!(good.brand_alignment_score > bad.brand_alignment_score);
        assert!(good.roi_projection > bad.roi_projection);
        assert_eq!(parse_analysis_response(upbeat).result, good);
    }

    #[test]
    fn heuristic_recommendations_follow_keywords() {
        let r = parse_analysis_response("A co-branding deal anchored by a digital campaign.").result;
        assert!(r.recommendations.contains(&"Develop co-branded product line".to_string()));
        assert!(r.recommendations.contains(&"Leverage digital marketing synergies".to_string()));
        assert_eq!(r.key_risks.len(), 3);
    }
}
