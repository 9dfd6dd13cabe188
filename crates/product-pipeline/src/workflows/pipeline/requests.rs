use url::Url;

use super::domain::LeadSnapshot;
use super::payload::{StageAInput, StageBInput, StageCInput, StageMRequest};

const SECONDARY_MARKETPLACE_DOMAINS: [&str; 3] = ["taobao.com", "tmall.com", "1688.com"];
const PRIMARY_MARKETPLACE_LABEL: &str = "amazon";
const PRIMARY_MARKETPLACE_SECOND_LEVELS: [&str; 2] = ["co", "com"];

fn parse_lead_url(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let with_host = |url: Url| url.host_str().is_some().then_some(url);
    Url::parse(trimmed)
        .ok()
        .and_then(with_host)
        .or_else(|| {
            Url::parse(&format!("https://{trimmed}"))
                .ok()
                .and_then(with_host)
        })
}

fn is_secondary_marketplace(host: &str) -> bool {
    SECONDARY_MARKETPLACE_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// `amazon.<tld>` with any subdomain, e.g. `www.amazon.de` or `amazon.co.uk`.
/// Only a country or generic TLD tail may follow the `amazon` label.
fn is_primary_marketplace(host: &str) -> bool {
    let labels: Vec<&str> = host.split('.').collect();
    let Some(position) = labels
        .iter()
        .position(|label| *label == PRIMARY_MARKETPLACE_LABEL)
    else {
        return false;
    };
    let is_tld = |label: &str| {
        !label.is_empty() && label.bytes().all(|byte| byte.is_ascii_lowercase())
    };
    match &labels[position + 1..] {
        [tld] => is_tld(*tld),
        [second, country] => {
            PRIMARY_MARKETPLACE_SECOND_LEVELS.contains(second)
                && country.len() == 2
                && is_tld(*country)
        }
        _ => false,
    }
}

/// Derives the stage-M capture request for a lead, or `None` when neither a
/// recognised marketplace URL nor a title is available.
pub fn stage_m_request_for(
    lead: &LeadSnapshot,
    default_marketplace: &str,
    max_results: Option<u32>,
) -> Option<StageMRequest> {
    if let Some(url) = lead.url.as_deref().and_then(parse_lead_url) {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if is_secondary_marketplace(&host) {
            return Some(StageMRequest::TaobaoListing {
                url: url.to_string(),
            });
        }
        if is_primary_marketplace(&host) {
            return Some(StageMRequest::AmazonListing {
                url: url.to_string(),
                marketplace: default_marketplace.to_string(),
            });
        }
    }

    let title = lead.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return None;
    }

    Some(StageMRequest::AmazonSearch {
        query: title.to_string(),
        marketplace: default_marketplace.to_string(),
        max_results,
    })
}

/// Synthetic sanity-check inputs used when a full evaluation runs a costing
/// stage without operator-provided figures.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultStageInputs {
    pub stage_a: StageAInput,
    pub stage_b: StageBInput,
    pub stage_c: StageCInput,
}

impl Default for DefaultStageInputs {
    fn default() -> Self {
        Self {
            stage_a: StageAInput {
                sale_price_cents: 2499,
                unit_cost_cents: 650,
                shipping_cost_cents: 250,
                marketplace_fee_pct: 0.15,
            },
            stage_b: StageBInput {
                units_planned: 500,
                unit_weight_grams: 350,
                freight_cost_cents: 90_000,
                duty_rate_pct: 0.04,
                incoterm: "FOB".to_string(),
                lead_time_days: 35,
            },
            stage_c: StageCInput {
                sale_price_cents: 2499,
                landed_cost_per_unit_cents: 900,
                marketplace_fee_pct: 0.15,
                fulfillment_fee_cents: 320,
                ads_per_unit_cents: 150,
                returns_rate_pct: 0.03,
            },
        }
    }
}
