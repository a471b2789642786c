//! Per-model daily quota tracking and purpose-based model routing (§4.7).

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::provider::Message;

/// Fixed Pacific offset (UTC-8, winter) for the daily reset boundary (§3).
/// `chrono-tz` is not used elsewhere in this engine's dependency stack, so
/// DST is intentionally not modeled.
const PACIFIC_OFFSET_SECONDS: i32 = -8 * 3600;

fn pacific() -> FixedOffset {
    FixedOffset::east_opt(PACIFIC_OFFSET_SECONDS).expect("valid fixed offset")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaLimits {
    pub rpm: u32,
    pub tpm: u32,
    pub rpd: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaUsage {
    pub tokens_used_today: u64,
    pub requests_today: u32,
    pub last_reset_day_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelQuota {
    pub model: String,
    pub limits: QuotaLimits,
    pub usage: QuotaUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPurpose {
    BulkProcessing,
    QuickSummary,
    StandardAnalysis,
    DetailedAnalysis,
    VisionAnalysis,
    CriticalTask,
}

/// Fixed recommendation tables (§4.7). Concrete model names are
/// configuration-layer substitutions over these four tiers.
fn recommendation_order(purpose: TaskPurpose) -> [&'static str; 3] {
    match purpose {
        TaskPurpose::BulkProcessing => ["cheap-fast-model", "exp-fast-model", "standard-fast-model"],
        TaskPurpose::QuickSummary => ["exp-fast-model", "standard-fast-model", "cheap-fast-model"],
        TaskPurpose::StandardAnalysis => ["standard-fast-model", "exp-fast-model", "premium-model"],
        TaskPurpose::DetailedAnalysis => ["premium-model", "exp-premium-model", "standard-fast-model"],
        TaskPurpose::VisionAnalysis => ["standard-fast-model", "premium-model", "exp-fast-model"],
        TaskPurpose::CriticalTask => ["premium-model", "exp-premium-model", "standard-fast-model"],
    }
}

/// Purpose inference from request content (§4.7), used only when no
/// explicit model is given and quota management is enabled.
pub fn infer_purpose(messages: &[Message]) -> TaskPurpose {
    let combined: String = messages
        .iter()
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let len = combined.len();

    if combined.contains("summarize") || combined.contains("summary") {
        return if len > 10_000 {
            TaskPurpose::BulkProcessing
        } else {
            TaskPurpose::QuickSummary
        };
    }
    if combined.contains("analyze") || combined.contains("analysis") {
        return if combined.contains("detailed") || combined.contains("comprehensive") {
            TaskPurpose::DetailedAnalysis
        } else {
            TaskPurpose::StandardAnalysis
        };
    }
    if combined.contains("critical") || combined.contains("important") {
        return TaskPurpose::CriticalTask;
    }

    if len > 20_000 {
        TaskPurpose::DetailedAnalysis
    } else if len < 5_000 {
        TaskPurpose::QuickSummary
    } else {
        TaskPurpose::StandardAnalysis
    }
}

struct State {
    quotas: HashMap<String, ModelQuota>,
}

/// Process-wide shared mutable quota tracker (§5). All read-modify-write
/// sequences go through this single mutex; callers must not read state
/// outside a locked operation.
pub struct QuotaManager {
    state: Mutex<State>,
}

impl QuotaManager {
    pub fn new(models: Vec<(String, QuotaLimits)>) -> Self {
        let quotas = models
            .into_iter()
            .map(|(model, limits)| {
                (
                    model.clone(),
                    ModelQuota {
                        model,
                        limits,
                        usage: QuotaUsage {
                            last_reset_day_key: current_day_key(),
                            ..Default::default()
                        },
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(State { quotas }),
        }
    }

    /// Invoked at the top of every public call (§4.7): resets all counters
    /// when the Pacific day-key has rolled over.
    fn check_and_reset_if_needed(&self, state: &mut State) {
        let today = current_day_key();
        for quota in state.quotas.values_mut() {
            if quota.usage.last_reset_day_key != today {
                quota.usage.tokens_used_today = 0;
                quota.usage.requests_today = 0;
                quota.usage.last_reset_day_key = today.clone();
            }
        }
    }

    pub fn has_available_quota(&self, model: &str, _estimated_tokens: u64) -> bool {
        let mut state = self.state.lock().unwrap();
        self.check_and_reset_if_needed(&mut state);
        match state.quotas.get(model) {
            Some(q) => q.usage.requests_today < q.limits.rpd,
            None => false,
        }
    }

    /// Walks the recommendation order for `purpose`; falls back to any
    /// known model; fails with `QuotaExhausted` carrying the next Pacific
    /// midnight if nothing is available (§4.7).
    pub fn select_model(&self, purpose: TaskPurpose, estimated_tokens: u64) -> CoreResult<String> {
        let mut state = self.state.lock().unwrap();
        self.check_and_reset_if_needed(&mut state);

        for tier in recommendation_order(purpose) {
            if let Some(q) = state.quotas.get(tier) {
                if q.usage.requests_today < q.limits.rpd {
                    return Ok(tier.to_string());
                }
            }
        }

        let mut models: Vec<&String> = state.quotas.keys().collect();
        models.sort();
        for model in models {
            let q = &state.quotas[model];
            if q.usage.requests_today < q.limits.rpd {
                return Ok(model.clone());
            }
        }

        let _ = estimated_tokens;
        Err(CoreError::QuotaExhausted {
            model: recommendation_order(purpose)[0].to_string(),
            next_reset_time: next_pacific_midnight_utc(),
        })
    }

    pub fn record_usage(&self, model: &str, tokens: u64) {
        let mut state = self.state.lock().unwrap();
        self.check_and_reset_if_needed(&mut state);
        if let Some(q) = state.quotas.get_mut(model) {
            q.usage.tokens_used_today += tokens;
            q.usage.requests_today += 1;
        }
    }

    pub fn snapshot(&self, model: &str) -> Option<ModelQuota> {
        let mut state = self.state.lock().unwrap();
        self.check_and_reset_if_needed(&mut state);
        state.quotas.get(model).cloned()
    }
}

fn current_day_key() -> String {
    Utc::now().with_timezone(&pacific()).format("%Y-%m-%d").to_string()
}

fn next_pacific_midnight_utc() -> DateTime<Utc> {
    let now_pacific = Utc::now().with_timezone(&pacific());
    let tomorrow = now_pacific.date_naive().succ_opt().unwrap_or(now_pacific.date_naive());
    let midnight = tomorrow.and_hms_opt(0, 0, 0).unwrap();
    pacific()
        .from_local_datetime(&midnight)
        .single()
        .unwrap_or_else(|| Utc::now().with_timezone(&pacific()))
        .with_timezone(&Utc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> QuotaManager {
        QuotaManager::new(vec![
            (
                "cheap-fast-model".to_string(),
                QuotaLimits { rpm: 60, tpm: 100_000, rpd: 2 },
            ),
            (
                "standard-fast-model".to_string(),
                QuotaLimits { rpm: 60, tpm: 100_000, rpd: 10 },
            ),
        ])
    }

    #[test]
    fn record_usage_increments_counters() {
        let m = manager();
        m.record_usage("cheap-fast-model", 100);
        let snap = m.snapshot("cheap-fast-model").unwrap();
        assert_eq!(snap.usage.requests_today, 1);
        assert_eq!(snap.usage.tokens_used_today, 100);
    }

    #[test]
    fn select_model_walks_recommendation_order() {
        let m = manager();
        let chosen = m.select_model(TaskPurpose::BulkProcessing, 10).unwrap();
        assert_eq!(chosen, "cheap-fast-model");
    }

    #[test]
    fn select_model_exhausts_to_quota_error() {
        let m = manager();
        m.record_usage("cheap-fast-model", 1);
        m.record_usage("cheap-fast-model", 1);
        // rpd = 2, exhausted; cheap-fast-model not in bulk tier's fallback
        // list beyond itself and exp-fast-model/standard-fast-model, which
        // aren't registered — falls through to last-resort scan.
        let chosen = m.select_model(TaskPurpose::BulkProcessing, 10).unwrap();
        assert_eq!(chosen, "standard-fast-model");
    }

    #[test]
    fn infer_purpose_detects_bulk_summary() {
        let long_text = "summarize ".repeat(2000);
        let messages = vec![Message::user(long_text)];
        assert_eq!(infer_purpose(&messages), TaskPurpose::BulkProcessing);
    }

    #[test]
    fn infer_purpose_detects_critical() {
        let messages = vec![Message::user("this is a critical task")];
        assert_eq!(infer_purpose(&messages), TaskPurpose::CriticalTask);
    }

    #[test]
    fn day_key_format_is_stable() {
        let dt = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        let key = dt.with_timezone(&pacific()).format("%Y-%m-%d").to_string();
        assert_eq!(key.len(), 10);
    }
}
