//! Brand partnership scenarios: the input record of every analysis.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::{ScenarioId, UserId};

pub const MAX_BRAND_LEN: usize = 100;
pub const MAX_PARTNERSHIP_TYPE_LEN: usize = 50;
pub const MAX_BUDGET_RANGE_LEN: usize = 50;

/// Lifecycle marker of a scenario.
///
/// Informational only: the analysis job is the source of truth for pipeline
/// state. Re-analysis moves a finished scenario back to `Analyzing`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioStatus {
    Draft,
    Analyzing,
    Completed,
    Failed,
}

impl ScenarioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for ScenarioStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "analyzing" => Ok(Self::Analyzing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::validation(format!("unknown scenario status: {other}"))),
        }
    }
}

/// A user-owned description of a proposed partnership between two brands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: ScenarioId,
    pub owner_id: UserId,
    pub brand_a: String,
    pub brand_b: String,
    pub partnership_type: String,
    pub target_audience: Option<String>,
    pub budget_range: Option<String>,
    pub status: ScenarioStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Unvalidated scenario input as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewScenario {
    pub brand_a: Option<String>,
    pub brand_b: Option<String>,
    pub partnership_type: Option<String>,
    pub target_audience: Option<String>,
    pub budget_range: Option<String>,
}

impl NewScenario {
    /// Names of required fields that are absent or blank, in declaration order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("brand_a", &self.brand_a),
            ("brand_b", &self.brand_b),
            ("partnership_type", &self.partnership_type),
        ]
        .into_iter()
        .filter(|(_, value)| non_blank(value.as_deref()).is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Validate the input and build a `Draft` scenario owned by `owner_id`.
    ///
    /// All missing required fields are reported together.
    pub fn into_scenario(self, owner_id: UserId, now: DateTime<Utc>) -> DomainResult<Scenario> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(DomainError::missing_fields(missing));
        }

        let brand_a = required(self.brand_a.as_deref(), "brand_a", MAX_BRAND_LEN)?;
        let brand_b = required(self.brand_b.as_deref(), "brand_b", MAX_BRAND_LEN)?;
        let partnership_type = required(
            self.partnership_type.as_deref(),
            "partnership_type",
            MAX_PARTNERSHIP_TYPE_LEN,
        )?;
        let budget_range = non_blank(self.budget_range.as_deref())
            .map(|v| bounded(v, "budget_range", MAX_BUDGET_RANGE_LEN))
            .transpose()?;

        Ok(Scenario {
            id: ScenarioId::new(),
            owner_id,
            brand_a,
            brand_b,
            partnership_type,
            target_audience: non_blank(self.target_audience.as_deref()).map(str::to_string),
            budget_range,
            status: ScenarioStatus::Draft,
            created_at: now,
            updated_at: now,
        })
    }
}

impl Scenario {
    /// Required fields that are blank on an already-built record.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("brand_a", self.brand_a.as_str()),
            ("brand_b", self.brand_b.as_str()),
            ("partnership_type", self.partnership_type.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn required(value: Option<&str>, field: &'static str, max_len: usize) -> DomainResult<String> {
    let value = non_blank(value).ok_or_else(|| DomainError::missing_fields([field]))?;
    bounded(value, field, max_len)
}

fn bounded(value: &str, field: &'static str, max_len: usize) -> DomainResult<String> {
    if value.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}
