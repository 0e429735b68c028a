use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cache::CacheStats;
use crate::engine::{AggregationSnapshot, CountSource};
use crate::models::currency::format_currency;
use crate::reconcile::{ReconcileOutcome, ReconcileReport};

/// Trait for items that can be displayed as tables or JSON
pub trait OutputFormat {
    fn to_table(&self, decimal_places: u8, styled: bool) -> String;
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

/// Row for the snapshot summary table
#[derive(Tabled, Serialize, Debug)]
pub struct SnapshotSummaryRow {
    #[tabled(rename = "Conversations")]
    pub conversations: String,
    #[tabled(rename = "Segments")]
    pub segments: String,
    #[tabled(rename = "Accurate")]
    pub accurate: String,
    #[tabled(rename = "Estimated")]
    pub fallback: String,
    #[tabled(rename = "Total Cost")]
    pub total_cost: String,
}

/// Row for the per-conversation breakdown table
#[derive(Tabled, Serialize, Debug)]
pub struct ConversationRow {
    #[tabled(rename = "Conversation")]
    pub conversation: String,
    #[tabled(rename = "Segments")]
    pub segments: String,
    #[tabled(rename = "Source")]
    pub source: String,
}

#[derive(Tabled, Serialize, Debug)]
pub struct ReconcileRow {
    #[tabled(rename = "Outcome")]
    pub outcome: String,
    #[tabled(rename = "Completed")]
    pub completed: String,
    #[tabled(rename = "Cache Hits")]
    pub cache_hits: String,
    #[tabled(rename = "New")]
    pub new_calculations: String,
    #[tabled(rename = "Failed")]
    pub failed: String,
    #[tabled(rename = "Degraded Batches")]
    pub degraded_batches: String,
    #[tabled(rename = "Elapsed")]
    pub elapsed: String,
}

#[derive(Tabled, Serialize, Debug)]
pub struct CacheStatsRow {
    #[tabled(rename = "Tier")]
    pub tier: String,
    #[tabled(rename = "Entries")]
    pub entries: String,
}

impl SnapshotSummaryRow {
    pub fn from_snapshot(snapshot: &AggregationSnapshot, decimal_places: u8) -> Self {
        let mut total_cost = format_currency(snapshot.total_cost, &snapshot.currency, decimal_places);
        if !snapshot.cost_converted {
            total_cost.push_str(" (unconverted)");
        }
        Self {
            conversations: format_number(snapshot.conversation_count() as u64),
            segments: format_number(snapshot.total_segments),
            accurate: format!(
                "{} ({:.0}%)",
                format_number(snapshot.accurate_count as u64),
                snapshot.accuracy() * 100.0
            ),
            fallback: format_number(snapshot.fallback_count as u64),
            total_cost,
        }
    }
}

impl ReconcileRow {
    pub fn from_report(report: &ReconcileReport) -> Self {
        let progress = &report.progress;
        Self {
            outcome: outcome_label(&report.outcome).to_string(),
            completed: format!(
                "{}/{}",
                format_number(progress.completed as u64),
                format_number(progress.total as u64)
            ),
            cache_hits: format_number(progress.cache_hits as u64),
            new_calculations: format_number(progress.new_calculations as u64),
            failed: format_number(progress.failed as u64),
            degraded_batches: format_number(progress.degraded_batches as u64),
            elapsed: format!("{:.1}s", report.elapsed.as_secs_f64()),
        }
    }
}

impl OutputFormat for AggregationSnapshot {
    fn to_table(&self, decimal_places: u8, styled: bool) -> String {
        let summary = render(vec![SnapshotSummaryRow::from_snapshot(self, decimal_places)], styled);
        if self.per_conversation.is_empty() {
            return format!("{summary}\nNo conversations in range.");
        }

        let rows: Vec<ConversationRow> = self
            .per_conversation
            .iter()
            .map(|(id, segments)| ConversationRow {
                conversation: id.clone(),
                segments: format_number(u64::from(*segments)),
                source: self
                    .sources
                    .get(id)
                    .map(source_label)
                    .unwrap_or("-")
                    .to_string(),
            })
            .collect();

        format!("{summary}\n{}", render(rows, styled))
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for ReconcileReport {
    fn to_table(&self, _decimal_places: u8, styled: bool) -> String {
        let table = render(vec![ReconcileRow::from_report(self)], styled);
        match &self.outcome {
            ReconcileOutcome::Aborted { diagnostic } => format!("{table}\n{diagnostic}"),
            ReconcileOutcome::ConfigurationError { message } => format!("{table}\n{message}"),
            _ => table,
        }
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl OutputFormat for CacheStats {
    fn to_table(&self, _decimal_places: u8, styled: bool) -> String {
        let rows = vec![
            CacheStatsRow {
                tier: "authoritative".to_string(),
                entries: format_number(self.authoritative as u64),
            },
            CacheStatsRow {
                tier: "quick".to_string(),
                entries: format_number(self.quick as u64),
            },
        ];
        render(rows, styled)
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn render<T: Tabled>(rows: Vec<T>, styled: bool) -> String {
    let mut table = Table::new(rows);
    if styled {
        table.with(Style::rounded());
    }
    table.to_string()
}

fn outcome_label(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Completed => "completed",
        ReconcileOutcome::Cancelled => "cancelled",
        ReconcileOutcome::Aborted { .. } => "aborted",
        ReconcileOutcome::ConfigurationError { .. } => "configuration error",
    }
}

fn source_label(source: &CountSource) -> &'static str {
    match source {
        CountSource::Authoritative => "authoritative",
        CountSource::Quick => "quick",
        CountSource::Fallback => "estimated",
    }
}

/// Format a number with commas for thousands separator
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let len = s.len();
    let mut result = String::with_capacity(len + len / 3);

    for (i, ch) in s.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result
}
