//! Typed stage payloads.
//!
//! Stage inputs and outputs travel as JSON records in the stage collaborator's
//! camelCase wire format. Stored inputs sometimes wrap the real payload under an
//! `input` key and outputs carry their consumer-facing fields under `summary`.
//! Both wrappers are removed here, once, so the gate, scorer and orchestrator
//! only ever see the typed records below.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::StageCode;

/// Integer cents. Wire values may be JSON integers or integer strings.
pub type Cents = i64;

const MAX_HORIZON_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("stage {stage} payload is invalid: {message}")]
    Invalid { stage: StageCode, message: String },
    #[error("stage {stage} payload has an invalid_money value")]
    InvalidMoney { stage: StageCode },
}

/// Rounds finite numbers and accepts `-?\d+` strings; anything else is rejected.
pub fn normalize_money(value: &Value) -> Option<Cents> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite())
                .map(|float| float.round() as i64)
        }),
        Value::String(raw) => {
            let trimmed = raw.trim();
            let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
            if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
                return None;
            }
            trimmed.parse::<i64>().ok()
        }
        _ => None,
    }
}

pub(crate) mod money {
    use super::{normalize_money, Cents};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub(crate) fn required<'de, D>(deserializer: D) -> Result<Cents, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Value::deserialize(deserializer)?;
        normalize_money(&raw).ok_or_else(|| serde::de::Error::custom("invalid_money"))
    }

    pub(crate) fn optional<'de, D>(deserializer: D) -> Result<Option<Cents>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        match raw {
            None | Some(Value::Null) => Ok(None),
            Some(value) => normalize_money(&value)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("invalid_money")),
        }
    }

    /// Summary variant of [`optional`]: unreadable values become `None`.
    pub(crate) fn lenient<'de, D>(deserializer: D) -> Result<Option<Cents>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.as_ref().and_then(normalize_money))
    }
}

pub(crate) mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Reads an optional summary field; a value of the wrong type becomes `None`.
    pub(crate) fn field<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(raw.and_then(|value| T::deserialize(value).ok()))
    }
}

/// Removes a single `{ "input": { .. } }` wrapper when present.
pub fn normalize_input(value: &Value) -> &Value {
    match value.get("input") {
        Some(inner @ Value::Object(_)) => inner,
        _ => value,
    }
}

/// Secondary scenario record stored alongside an input.
pub fn scenario_of(value: &Value) -> Option<&Value> {
    value.get("scenario").filter(|scenario| !scenario.is_null())
}

/// Consumer-facing part of an output: the nested `summary` when present,
/// otherwise the record itself.
pub fn summary_value(output: &Value) -> &Value {
    match output.get("summary") {
        Some(inner @ Value::Object(_)) => inner,
        _ => output,
    }
}

/// Stage-M capture requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageMRequest {
    AmazonSearch {
        query: String,
        marketplace: String,
        #[serde(rename = "maxResults", default, skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
    },
    AmazonListing {
        url: String,
        marketplace: String,
    },
    TaobaoListing {
        url: String,
    },
}

impl StageMRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            StageMRequest::AmazonSearch { .. } => "amazon_search",
            StageMRequest::AmazonListing { .. } => "amazon_listing",
            StageMRequest::TaobaoListing { .. } => "taobao_listing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageAInput {
    #[serde(deserialize_with = "money::required")]
    pub sale_price_cents: Cents,
    #[serde(deserialize_with = "money::required")]
    pub unit_cost_cents: Cents,
    #[serde(deserialize_with = "money::required")]
    pub shipping_cost_cents: Cents,
    pub marketplace_fee_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBInput {
    pub units_planned: u32,
    pub unit_weight_grams: u32,
    #[serde(deserialize_with = "money::required")]
    pub freight_cost_cents: Cents,
    pub duty_rate_pct: f64,
    pub incoterm: String,
    pub lead_time_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCInput {
    #[serde(deserialize_with = "money::required")]
    pub sale_price_cents: Cents,
    #[serde(deserialize_with = "money::required")]
    pub landed_cost_per_unit_cents: Cents,
    pub marketplace_fee_pct: f64,
    #[serde(deserialize_with = "money::required")]
    pub fulfillment_fee_cents: Cents,
    #[serde(deserialize_with = "money::required")]
    pub ads_per_unit_cents: Cents,
    pub returns_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cashflow {
    pub day: u32,
    #[serde(deserialize_with = "money::required")]
    pub amount_cents: Cents,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageKInput {
    pub horizon_days: u32,
    pub cashflows: Vec<Cashflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_planned: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_sold_by_day: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_through_target_pct: Option<f64>,
    #[serde(
        default,
        deserialize_with = "money::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub salvage_value_cents: Option<Cents>,
}

impl StageKInput {
    fn validate(&self) -> Result<(), String> {
        if self.horizon_days == 0 || self.horizon_days > MAX_HORIZON_DAYS {
            return Err(format!(
                "horizonDays must be between 1 and {MAX_HORIZON_DAYS}"
            ));
        }
        if self.cashflows.is_empty() {
            return Err("cashflows must contain at least one entry".to_string());
        }
        if let Some(flow) = self.cashflows.iter().find(|flow| flow.day > MAX_HORIZON_DAYS) {
            return Err(format!("cashflow day {} exceeds {MAX_HORIZON_DAYS}", flow.day));
        }
        if let Some(pct) = self.sell_through_target_pct {
            if !(0.0..=1.0).contains(&pct) {
                return Err("sellThroughTargetPct must be within 0..=1".to_string());
            }
        }
        if self.units_planned == Some(0) {
            return Err("unitsPlanned must be positive".to_string());
        }
        Ok(())
    }
}

/// Input record for one stage, keyed by stage code.
#[derive(Debug, Clone, PartialEq)]
pub enum StageInput {
    M(StageMRequest),
    A(StageAInput),
    B(StageBInput),
    C(StageCInput),
    K(StageKInput),
    /// Stages without an engine-side schema pass through untouched.
    Opaque { stage: StageCode, payload: Value },
}

impl StageInput {
    pub fn stage(&self) -> StageCode {
        match self {
            StageInput::M(_) => StageCode::M,
            StageInput::A(_) => StageCode::A,
            StageInput::B(_) => StageCode::B,
            StageInput::C(_) => StageCode::C,
            StageInput::K(_) => StageCode::K,
            StageInput::Opaque { stage, .. } => *stage,
        }
    }

    /// Parses a stored or submitted record for `stage`, unwrapping a nested
    /// `input` key first.
    pub fn from_payload(stage: StageCode, payload: &Value) -> Result<Self, PayloadError> {
        let payload = normalize_input(payload);
        let input = match stage {
            StageCode::M => StageInput::M(parse(stage, payload)?),
            StageCode::A => StageInput::A(parse(stage, payload)?),
            StageCode::B => StageInput::B(parse(stage, payload)?),
            StageCode::C => StageInput::C(parse(stage, payload)?),
            StageCode::K => {
                let input: StageKInput = parse(stage, payload)?;
                input
                    .validate()
                    .map_err(|message| PayloadError::Invalid { stage, message })?;
                StageInput::K(input)
            }
            _ => StageInput::Opaque {
                stage,
                payload: payload.clone(),
            },
        };
        Ok(input)
    }

    /// Wire representation handed to the stage collaborator.
    pub fn to_payload(&self) -> Value {
        let encoded = match self {
            StageInput::M(request) => serde_json::to_value(request),
            StageInput::A(input) => serde_json::to_value(input),
            StageInput::B(input) => serde_json::to_value(input),
            StageInput::C(input) => serde_json::to_value(input),
            StageInput::K(input) => serde_json::to_value(input),
            StageInput::Opaque { payload, .. } => return payload.clone(),
        };
        encoded.unwrap_or(Value::Null)
    }
}

fn parse<T: DeserializeOwned>(stage: StageCode, payload: &Value) -> Result<T, PayloadError> {
    T::deserialize(payload).map_err(|err| {
        let message = err.to_string();
        if message.contains("invalid_money") {
            PayloadError::InvalidMoney { stage }
        } else {
            PayloadError::Invalid { stage, message }
        }
    })
}

/// Typed summary records read from stage outputs.
pub trait SummaryRecord: DeserializeOwned {
    const STAGE: StageCode;

    /// Lenient extraction: a summary that is not a record reads as absent, and
    /// each malformed field reads as absent without touching its siblings.
    fn from_output(output: &Value) -> Option<Self> {
        let summary = summary_value(output);
        if !summary.is_object() {
            return None;
        }
        Self::deserialize(summary).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageMSummary {
    #[serde(default, deserialize_with = "lenient::field")]
    pub listing_count: Option<u32>,
    #[serde(default, deserialize_with = "money::lenient")]
    pub median_price_cents: Option<Cents>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageASummary {
    #[serde(default, deserialize_with = "lenient::field")]
    pub action: Option<String>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub margin_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTSummary {
    #[serde(default, deserialize_with = "lenient::field")]
    pub decision: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSSummary {
    #[serde(default, deserialize_with = "lenient::field")]
    pub overall_risk: Option<String>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBSummary {
    #[serde(default, deserialize_with = "money::lenient")]
    pub landed_cost_per_unit_cents: Option<Cents>,
    #[serde(default, deserialize_with = "money::lenient")]
    pub total_landed_cost_cents: Option<Cents>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCSummary {
    #[serde(default, deserialize_with = "money::lenient")]
    pub contribution_per_unit_cents: Option<Cents>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub contribution_margin_pct: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageKSummary {
    #[serde(default, deserialize_with = "money::lenient")]
    pub peak_cash_outlay_cents: Option<Cents>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub payback_day: Option<i64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub sell_through_day: Option<i64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub annualized_capital_return_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub return_band: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRSummary {
    #[serde(default, deserialize_with = "lenient::field")]
    pub risk_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub risk_band: Option<String>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub effort_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub effort_band: Option<String>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub return_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub rank_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient::field")]
    pub next_action: Option<String>,
}

impl SummaryRecord for StageMSummary {
    const STAGE: StageCode = StageCode::M;
}
impl SummaryRecord for StageASummary {
    const STAGE: StageCode = StageCode::A;
}
impl SummaryRecord for StageTSummary {
    const STAGE: StageCode = StageCode::T;
}
impl SummaryRecord for StageSSummary {
    const STAGE: StageCode = StageCode::S;
}
impl SummaryRecord for StageBSummary {
    const STAGE: StageCode = StageCode::B;
}
impl SummaryRecord for StageCSummary {
    const STAGE: StageCode = StageCode::C;
}
impl SummaryRecord for StageKSummary {
    const STAGE: StageCode = StageCode::K;
}
impl SummaryRecord for StageRSummary {
    const STAGE: StageCode = StageCode::R;
}

/// Output summary for one stage, keyed by stage code.
#[derive(Debug, Clone, PartialEq)]
pub enum StageSummary {
    M(StageMSummary),
    A(StageASummary),
    T(StageTSummary),
    S(StageSSummary),
    B(StageBSummary),
    C(StageCSummary),
    K(StageKSummary),
    R(StageRSummary),
}

impl StageSummary {
    /// `None` for stages without a summary schema (N, D) or unreadable outputs.
    pub fn from_output(stage: StageCode, output: &Value) -> Option<Self> {
        match stage {
            StageCode::M => StageMSummary::from_output(output).map(StageSummary::M),
            StageCode::A => StageASummary::from_output(output).map(StageSummary::A),
            StageCode::T => StageTSummary::from_output(output).map(StageSummary::T),
            StageCode::S => StageSSummary::from_output(output).map(StageSummary::S),
            StageCode::B => StageBSummary::from_output(output).map(StageSummary::B),
            StageCode::C => StageCSummary::from_output(output).map(StageSummary::C),
            StageCode::K => StageKSummary::from_output(output).map(StageSummary::K),
            StageCode::R => StageRSummary::from_output(output).map(StageSummary::R),
            StageCode::N | StageCode::D => None,
        }
    }
}
