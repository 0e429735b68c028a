use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::models::Conversation;
use crate::reconcile::ViewContext;

/// Date window requested on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowSpec {
    Today,
    Yesterday,
    /// The last `n` days, today included
    LastDays(u32),
    /// Inclusive calendar dates, either side open
    Range {
        since: Option<String>,
        until: Option<String>,
    },
    All,
}

/// Timezone-aware day boundaries
#[derive(Debug, Clone)]
pub struct TimezoneCalculator {
    timezone: Tz,
    daily_cutoff_hour: u8,
}

impl TimezoneCalculator {
    pub fn new(timezone_str: &str, daily_cutoff_hour: u8) -> Result<Self> {
        let timezone = Tz::from_str(timezone_str)
            .map_err(|e| anyhow::anyhow!("Invalid timezone '{}': {}", timezone_str, e))?;

        if daily_cutoff_hour > 23 {
            anyhow::bail!("Daily cutoff hour must be 0-23, got: {}", daily_cutoff_hour);
        }

        Ok(Self {
            timezone,
            daily_cutoff_hour,
        })
    }

    pub fn utc() -> Self {
        Self {
            timezone: Tz::UTC,
            daily_cutoff_hour: 0,
        }
    }

    /// Local calendar day `now` belongs to, honoring the cutoff hour
    pub fn current_day(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&self.timezone);
        let date = local.date_naive();
        if local.hour() < u32::from(self.daily_cutoff_hour) {
            date - Duration::days(1)
        } else {
            date
        }
    }

    /// Instant the given local day begins
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let naive = date
            .and_hms_opt(self.daily_cutoff_hour.into(), 0, 0)
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));

        // A start that falls in a DST gap is moved to the first valid instant
        match self.timezone.from_local_datetime(&naive) {
            chrono::LocalResult::Single(t) => t.with_timezone(&Utc),
            chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            chrono::LocalResult::None => self
                .timezone
                .from_local_datetime(&(naive + Duration::hours(1)))
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
        }
    }
}

/// Resolved `[since, until)` window and the view size it represents
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub context: ViewContext,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self {
            since: None,
            until: None,
            context: ViewContext::Unbounded,
        }
    }

    pub fn resolve(spec: &WindowSpec, calc: &TimezoneCalculator, now: DateTime<Utc>) -> Result<Self> {
        let today = calc.current_day(now);

        let window = match spec {
            WindowSpec::Today => Self {
                since: Some(calc.day_start(today)),
                until: Some(calc.day_start(today + Duration::days(1))),
                context: ViewContext::SingleDay,
            },
            WindowSpec::Yesterday => Self {
                since: Some(calc.day_start(today - Duration::days(1))),
                until: Some(calc.day_start(today)),
                context: ViewContext::SingleDay,
            },
            WindowSpec::LastDays(days) => {
                let days = (*days).max(1);
                Self {
                    since: Some(calc.day_start(today - Duration::days(i64::from(days) - 1))),
                    until: Some(calc.day_start(today + Duration::days(1))),
                    context: if days == 1 {
                        ViewContext::SingleDay
                    } else {
                        ViewContext::Days(days)
                    },
                }
            }
            WindowSpec::Range { since, until } => {
                let since_date = since.as_deref().map(parse_date).transpose()?;
                let until_date = until.as_deref().map(parse_date).transpose()?;

                // An open end runs through today
                let context = match since_date {
                    Some(start) => {
                        let end = until_date.unwrap_or(today);
                        if until_date.is_some() && end < start {
                            anyhow::bail!("--until {} is before --since {}", end, start);
                        }
                        days_context((end - start).num_days() + 1)
                    }
                    None => ViewContext::Unbounded,
                };

                Self {
                    since: since_date.map(|d| calc.day_start(d)),
                    until: until_date.map(|d| calc.day_start(d + Duration::days(1))),
                    context,
                }
            }
            WindowSpec::All => Self::all(),
        };

        Ok(window)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| at >= since) && self.until.is_none_or(|until| at < until)
    }

    /// Keep conversations that started inside the window
    pub fn filter(&self, conversations: Vec<Conversation>) -> Vec<Conversation> {
        conversations
            .into_iter()
            .filter(|c| self.contains(c.started_at))
            .collect()
    }
}

fn days_context(days: i64) -> ViewContext {
    match u32::try_from(days) {
        Ok(days) if days <= 1 => ViewContext::SingleDay,
        Ok(days) => ViewContext::Days(days),
        Err(_) if days < 1 => ViewContext::SingleDay,
        Err(_) => ViewContext::Unbounded,
    }
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))
}
