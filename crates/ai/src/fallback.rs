//! Local, rule-based analysis used when the external model is unavailable.
//!
//! Model:
//! - Hash the normalized brand pair into three stable pseudo-random words.
//! - Map them onto category-dependent ranges (luxury, streetwear, other).
//! - Scale alignment and ROI by a partnership-type multiplier.
//! - Derive risk level, risks and recommendations from thresholds.

use core::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use partnerlens_core::Scenario;

use crate::result::{ALIGNMENT_SCALE_MAX, AiError, AnalysisResult, MarketInsights, RiskLevel};
use crate::seed::{Seed, round1};

/// Upper bound on the simulated latency, whatever the configuration says.
pub const MAX_SIMULATED_DELAY: Duration = Duration::from_secs(10);

const LUXURY_BRANDS: [&str; 6] = ["louis vuitton", "gucci", "chanel", "hermès", "prada", "dior"];
const STREETWEAR_BRANDS: [&str; 5] = ["supreme", "off-white", "bape", "kith", "fear of god"];

const BASE_RISKS: [&str; 4] = [
    "Brand dilution concerns",
    "Market reception uncertainty",
    "Production complexity",
    "Pricing strategy conflicts",
];

const BASE_RECOMMENDATIONS: [&str; 4] = [
    "Conduct comprehensive market research",
    "Develop clear brand guidelines",
    "Create limited edition collections",
    "Implement strategic marketing campaign",
];

const LANDSCAPE_NOTES: [&str; 4] = [
    "Luxury-streetwear collaborations show higher engagement than solo launches",
    "Limited edition releases create urgency and drive sales velocity",
    "Cross-brand partnerships expand market reach into adjacent segments",
    "Consumer appetite for brand collaborations continues to grow",
];

/// Whether repeated analyses of the same scenario may differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Identical inputs always yield identical results.
    #[default]
    Deterministic,
    /// A per-engine call counter is mixed into the hash.
    Varied,
}

impl FromStr for FallbackMode {
    type Err = AiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deterministic" => Ok(Self::Deterministic),
            "varied" => Ok(Self::Varied),
            other => Err(AiError::InvalidInput(format!("unknown fallback mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BrandCategory {
    Luxury,
    Streetwear,
    Other,
}

fn categorize(brand: &str) -> BrandCategory {
    if LUXURY_BRANDS.contains(&brand) {
        BrandCategory::Luxury
    } else if STREETWEAR_BRANDS.contains(&brand) {
        BrandCategory::Streetwear
    } else {
        BrandCategory::Other
    }
}

fn normalize_brand(brand: &str) -> String {
    brand.trim().to_lowercase()
}

fn normalize_partnership_type(partnership_type: &str) -> String {
    partnership_type
        .trim()
        .to_lowercase()
        .replace([' ', '_'], "-")
}

/// Multiplier applied to alignment and ROI for a partnership type.
pub fn partnership_multiplier(partnership_type: &str) -> f64 {
    match normalize_partnership_type(partnership_type).as_str() {
        "co-branding" | "cobranding" => 1.15,
        "collaboration" => 1.10,
        "licensing" => 1.05,
        "sponsorship" => 0.95,
        "event" => 0.90,
        _ => 1.0,
    }
}

/// Both high → low risk, both low → high risk, anything else → medium.
pub fn classify_risk(alignment: f64, overlap: f64) -> RiskLevel {
    if alignment >= 7.5 && overlap >= 60.0 {
        RiskLevel::Low
    } else if alignment < 5.5 && overlap < 45.0 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

#[derive(Debug)]
pub struct FallbackEngine {
    mode: FallbackMode,
    delay: Duration,
    calls: AtomicU64,
}

impl Default for FallbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackEngine {
    /// Deterministic engine without simulated latency.
    pub fn new() -> Self {
        Self {
            mode: FallbackMode::Deterministic,
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_mode(mut self, mode: FallbackMode) -> Self {
        self.mode = mode;
        self
    }

    /// Simulated latency, capped at [`MAX_SIMULATED_DELAY`].
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay.min(MAX_SIMULATED_DELAY);
        self
    }

    pub fn mode(&self) -> FallbackMode {
        self.mode
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the simulated latency, then generate.
    pub async fn analyze(&self, scenario: &Scenario) -> AnalysisResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.generate(scenario)
    }

    /// Produce an analysis without waiting. Total for any scenario.
    pub fn generate(&self, scenario: &Scenario) -> AnalysisResult {
        let brand_a = normalize_brand(&scenario.brand_a);
        let brand_b = normalize_brand(&scenario.brand_b);

        let key = match self.mode {
            FallbackMode::Deterministic => format!("{brand_a}|{brand_b}"),
            FallbackMode::Varied => {
                let n = self.calls.fetch_add(1, Ordering::Relaxed);
                format!("{brand_a}|{brand_b}#{n}")
            }
        };
        let seed = Seed::of(&key);

        let categories = (categorize(&brand_a), categorize(&brand_b));
        let (low, high) = match categories {
            (BrandCategory::Luxury, BrandCategory::Streetwear)
            | (BrandCategory::Streetwear, BrandCategory::Luxury) => (7.5, 9.5),
            (BrandCategory::Luxury, BrandCategory::Luxury) => (6.0, 8.5),
            _ => (4.0, 8.0),
        };

        let multiplier = partnership_multiplier(&scenario.partnership_type);
        let alignment = round1((seed.within(0, low, high) * multiplier).clamp(0.0, ALIGNMENT_SCALE_MAX));
        let overlap = round1(seed.within(1, 25.0, 85.0));
        let roi = round1(seed.within(2, 110.0, 200.0) * multiplier);
        let risk_level = classify_risk(alignment, overlap);

        let facts = Facts {
            scenario,
            categories,
            multiplier,
            alignment,
            overlap,
            risk_level,
            seed,
        };

        AnalysisResult {
            brand_alignment_score: alignment,
            audience_overlap_percentage: overlap,
            roi_projection: roi,
            risk_level,
            key_risks: facts.risks(),
            recommendations: facts.recommendations(),
            market_insights: facts.insights(),
            defaulted_fields: Vec::new(),
        }
        .normalized()
    }
}

struct Facts<'a> {
    scenario: &'a Scenario,
    categories: (BrandCategory, BrandCategory),
    multiplier: f64,
    alignment: f64,
    overlap: f64,
    risk_level: RiskLevel,
    seed: Seed,
}

impl Facts<'_> {
    fn involves(&self, category: BrandCategory) -> bool {
        self.categories.0 == category || self.categories.1 == category
    }

    fn pick<'p>(&self, pool: &[&'p str], word: usize) -> &'p str {
        let index = (self.seed.unit(word) * pool.len() as f64) as usize;
        pool[index.min(pool.len() - 1)]
    }

    fn risks(&self) -> Vec<String> {
        let s = self.scenario;
        let mut risks = vec![self.pick(&BASE_RISKS, 3).to_string()];

        if self.alignment < 6.5 {
            risks.push(format!(
                "Brand positioning mismatch may confuse core customers of {} and {}",
                s.brand_a, s.brand_b
            ));
        }
        if self.overlap < 45.0 {
            risks.push("Limited shared audience may slow early adoption".to_string());
        } else if self.overlap >= 70.0 {
            risks.push("Heavy audience overlap limits reach into new segments".to_string());
        }
        if self.involves(BrandCategory::Luxury) {
            risks.push("Exclusivity perception risk".to_string());
        }
        if self.involves(BrandCategory::Streetwear) {
            risks.push("Hype cycle dependency".to_string());
        }
        if self.multiplier < 1.0 {
            risks.push(format!(
                "Returns hinge on the visibility window of the {}",
                s.partnership_type.to_lowercase()
            ));
        }
        if let Some(budget) = &s.budget_range {
            risks.push(format!("Cost overruns against the {budget} budget"));
        }
        risks
    }

    fn recommendations(&self) -> Vec<String> {
        let s = self.scenario;
        let mut recs: Vec<String> = match normalize_partnership_type(&s.partnership_type).as_str() {
            "co-branding" | "cobranding" => vec![
                "Establish co-design process".to_string(),
                "Define revenue sharing model".to_string(),
            ],
            "collaboration" => vec![
                "Plan exclusive launch events".to_string(),
                "Leverage social media influencers".to_string(),
            ],
            "sponsorship" => vec!["Negotiate category exclusivity for the sponsorship term".to_string()],
            "event" => vec!["Design an invitation-only launch experience".to_string()],
            "licensing" => vec!["Set quality-control clauses for licensed products".to_string()],
            _ => Vec::new(),
        };

        if self.risk_level == RiskLevel::High {
            recs.push("Run a small pilot before committing the full budget".to_string());
        }
        if self.overlap < 45.0 {
            recs.push("Commission audience research to find shared segments".to_string());
        }
        if let Some(audience) = &s.target_audience {
            recs.push(format!("Validate campaign messaging with {audience}"));
        }
        if let Some(budget) = &s.budget_range {
            recs.push(format!("Phase spend across the {budget} range with review gates"));
        }
        recs.push(self.pick(&BASE_RECOMMENDATIONS, 0).to_string());
        recs
    }

    fn insights(&self) -> MarketInsights {
        let s = self.scenario;
        let pairing = match self.categories {
            (BrandCategory::Luxury, BrandCategory::Streetwear)
            | (BrandCategory::Streetwear, BrandCategory::Luxury) => "Heritage luxury meets streetwear culture",
            (BrandCategory::Luxury, BrandCategory::Luxury) => "Two luxury houses with overlapping heritage",
            (BrandCategory::Streetwear, BrandCategory::Streetwear) => "Two streetwear labels sharing a drop culture",
            _ => "A cross-category pairing",
        };
        let audience = s
            .target_audience
            .as_deref()
            .map(|a| format!(" within {a}"))
            .unwrap_or_default();
        let execution = match self.risk_level {
            RiskLevel::Low => "Proceed with a full launch supported by joint marketing",
            RiskLevel::Medium => "Phased rollout with checkpoints on brand perception",
            RiskLevel::High => "Start with a limited pilot and expand on measured results",
        };

        MarketInsights {
            brand_synergy: format!(
                "{pairing}: the {} between {} and {} scores {:.1}/10 on alignment",
                s.partnership_type.to_lowercase(),
                s.brand_a,
                s.brand_b,
                self.alignment
            ),
            audience_analysis: format!("Estimated {:.1}% shared audience{audience}", self.overlap),
            competitive_landscape: self.pick(&LANDSCAPE_NOTES, 1).to_string(),
            execution_strategy: execution.to_string(),
        }
    }
}
