use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use thiserror::Error;

use crate::models::{Attempt, ChartSeries, DataSet};

const WEEK_DAYS: i64 = 7;
const MONTH_BUCKETS: i64 = 6;
const MONTH_BUCKET_DAYS: i64 = 5;
const YEAR_MONTHS: i32 = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChartError {
    #[error("unknown chart duration {0:?}; expected 1W, 1M, 1Y or ALL")]
    InvalidDuration(String),

    #[error("chart duration {0} is not implemented")]
    Unimplemented(ChartDuration),

    #[error("chart window falls outside the supported calendar range")]
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartDuration {
    Week,
    Month,
    Year,
    All,
}

impl ChartDuration {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartDuration::Week => "1W",
            ChartDuration::Month => "1M",
            ChartDuration::Year => "1Y",
            ChartDuration::All => "ALL",
        }
    }

    /// Earliest instant any bucket of this duration can count, so callers can
    /// fetch only the attempts the chart will use. `None` when buckets match
    /// by calendar label, which any past year can satisfy.
    pub fn covered_since<Tz: TimeZone>(
        &self,
        now: &DateTime<Tz>,
    ) -> Result<Option<DateTime<Utc>>, ChartError> {
        let windows = windows(*self, now)?;
        Ok(windows
            .iter()
            .map(|w| match w.bounds {
                Bounds::Range { start, .. } => Some(start),
                Bounds::LocalDay => None,
            })
            .min()
            .flatten())
    }
}

impl fmt::Display for ChartDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartDuration {
    type Err = ChartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1W" => Ok(ChartDuration::Week),
            "1M" => Ok(ChartDuration::Month),
            "1Y" => Ok(ChartDuration::Year),
            "ALL" => Ok(ChartDuration::All),
            other => Err(ChartError::InvalidDuration(other.to_string())),
        }
    }
}

/// A labelled bucket. Week buckets match on the local `MM/DD` of the
/// submission; month windows include their end instant, year windows do not.
struct Window {
    label: String,
    bounds: Bounds,
}

enum Bounds {
    LocalDay,
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        end_inclusive: bool,
    },
}

impl Window {
    fn contains<Tz: TimeZone>(&self, t: DateTime<Utc>, tz: &Tz) -> bool {
        match self.bounds {
            Bounds::LocalDay => {
                t.with_timezone(tz).date_naive().format("%m/%d").to_string() == self.label
            }
            Bounds::Range {
                start,
                end,
                end_inclusive,
            } => t >= start && (t < end || (end_inclusive && t == end)),
        }
    }
}

/// Buckets `attempts` by `timestamp_submitted` relative to `now`. The time
/// zone of `now` decides calendar days, months and label text.
///
/// Windows are built most recent first and each attempt is counted in the
/// first window that contains it; the result is then reversed so labels run
/// oldest to newest. Attempts outside every window are dropped.
pub fn to_data_set<Tz: TimeZone>(
    attempts: &[Attempt],
    duration: ChartDuration,
    now: &DateTime<Tz>,
) -> Result<DataSet, ChartError> {
    let windows = windows(duration, now)?;
    let tz = now.timezone();
    let mut dataset = vec![0u64; windows.len()];

    for attempt in attempts {
        if let Some(idx) = windows
            .iter()
            .position(|w| w.contains(attempt.timestamp_submitted, &tz))
        {
            dataset[idx] += 1;
        }
    }

    let mut labels: Vec<String> = windows.into_iter().map(|w| w.label).collect();
    labels.reverse();
    dataset.reverse();

    Ok(DataSet { labels, dataset })
}

/// Total, correct-only and incorrect-only series over one label axis.
pub fn attempt_series<Tz: TimeZone>(
    attempts: &[Attempt],
    duration: ChartDuration,
    now: &DateTime<Tz>,
) -> Result<ChartSeries, ChartError> {
    let (correct, incorrect): (Vec<Attempt>, Vec<Attempt>) =
        attempts.iter().cloned().partition(|a| a.is_correct);

    let total = to_data_set(attempts, duration, now)?;
    let success = to_data_set(&correct, duration, now)?;
    let failure = to_data_set(&incorrect, duration, now)?;

    Ok(ChartSeries {
        duration: duration.to_string(),
        labels: total.labels,
        total: total.dataset,
        success: success.dataset,
        failure: failure.dataset,
    })
}

fn windows<Tz: TimeZone>(duration: ChartDuration, now: &DateTime<Tz>) -> Result<Vec<Window>, ChartError> {
    match duration {
        ChartDuration::Week => Ok(week_windows(now)),
        ChartDuration::Month => Ok(month_windows(now)),
        ChartDuration::Year => year_windows(now),
        ChartDuration::All => Err(ChartError::Unimplemented(duration)),
    }
}

fn week_windows<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<Window> {
    let today = now.date_naive();

    (0..WEEK_DAYS)
        .map(|i| Window {
            label: (today - Duration::days(i)).format("%m/%d").to_string(),
            bounds: Bounds::LocalDay,
        })
        .collect()
}

fn month_windows<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<Window> {
    (0..MONTH_BUCKETS)
        .map(|i| {
            let start = now.clone() - Duration::days((i + 1) * MONTH_BUCKET_DAYS);
            let end = start.clone() + Duration::days(MONTH_BUCKET_DAYS);
            Window {
                label: start.naive_local().format("%m/%d").to_string(),
                bounds: Bounds::Range {
                    start: start.with_timezone(&Utc),
                    end: end.with_timezone(&Utc),
                    end_inclusive: true,
                },
            }
        })
        .collect()
}

fn year_windows<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Vec<Window>, ChartError> {
    let tz = now.timezone();
    let today = now.date_naive();

    (0..YEAR_MONTHS)
        .map(|i| {
            let first = first_of_month(today, i)?;
            let next = first_of_month(today, i - 1)?;
            Ok(Window {
                label: first.format("%m/%y").to_string(),
                bounds: Bounds::Range {
                    start: local_midnight(&tz, first)?,
                    end: local_midnight(&tz, next)?,
                    end_inclusive: false,
                },
            })
        })
        .collect()
}

/// First day of the month `months_back` months before `date`'s month.
fn first_of_month(date: NaiveDate, months_back: i32) -> Result<NaiveDate, ChartError> {
    let index = date.year() * 12 + date.month0() as i32 - months_back;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .ok_or(ChartError::OutOfRange)
}

/// Start of `day` in `tz`. Days whose midnight is skipped by a DST jump start
/// at the first valid instant after it.
fn local_midnight<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Result<DateTime<Utc>, ChartError> {
    let midnight = day.and_hms_opt(0, 0, 0).ok_or(ChartError::OutOfRange)?;
    let local = tz
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            tz.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .ok_or(ChartError::OutOfRange)?;
    Ok(local.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExamCategory;
    use chrono::FixedOffset;

    fn attempt_at(submitted: DateTime<Utc>, is_correct: bool) -> Attempt {
        Attempt {
            attempt_id: crate::utils::time::to_iso_millis(submitted),
            user_id: "u".to_string(),
            question_id: "q".to_string(),
            category: ExamCategory::Trauma,
            timestamp_started: submitted - Duration::seconds(30),
            timestamp_submitted: submitted,
            response_time_ms: 30_000,
            selected_choice_index: 0,
            is_correct,
            attempt_number_for_question: 1,
            reviewed_explanation_ms: None,
            retry_interval_hours: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_duration_tokens() {
        assert_eq!("1W".parse::<ChartDuration>(), Ok(ChartDuration::Week));
        assert_eq!("1M".parse::<ChartDuration>(), Ok(ChartDuration::Month));
        assert_eq!("1Y".parse::<ChartDuration>(), Ok(ChartDuration::Year));
        assert_eq!("ALL".parse::<ChartDuration>(), Ok(ChartDuration::All));
        assert_eq!(
            "2W".parse::<ChartDuration>(),
            Err(ChartError::InvalidDuration("2W".to_string()))
        );
        assert!("1w".parse::<ChartDuration>().is_err());
    }

    #[test]
    fn all_is_unimplemented() {
        let err = to_data_set(&[], ChartDuration::All, &now()).unwrap_err();
        assert_eq!(err, ChartError::Unimplemented(ChartDuration::All));
    }

    #[test]
    fn bucket_count_matches_mode() {
        let attempts: Vec<Attempt> = (0..40)
            .map(|d| attempt_at(now() - Duration::days(d * 9), d % 2 == 0))
            .collect();

        for (duration, buckets) in [
            (ChartDuration::Week, 7),
            (ChartDuration::Month, 6),
            (ChartDuration::Year, 12),
        ] {
            let data = to_data_set(&attempts, duration, &now()).unwrap();
            assert_eq!(data.labels.len(), data.dataset.len());
            assert_eq!(data.labels.len(), buckets);
        }
    }

    #[test]
    fn week_counts_recent_attempts_today() {
        let attempts: Vec<Attempt> = (1..=5)
            .map(|m| attempt_at(now() - Duration::minutes(m * 10), true))
            .collect();

        let data = to_data_set(&attempts, ChartDuration::Week, &now()).unwrap();
        assert_eq!(
            data.labels,
            vec!["10/12", "10/13", "10/14", "10/15", "10/16", "10/17", "10/18"]
        );
        assert_eq!(data.dataset, vec![0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn week_drops_attempts_outside_the_seven_days() {
        let attempts = vec![
            attempt_at(now() - Duration::days(7), true),
            attempt_at(now() + Duration::days(1), true),
            attempt_at(now() - Duration::days(6), true),
        ];

        let data = to_data_set(&attempts, ChartDuration::Week, &now()).unwrap();
        assert_eq!(data.dataset, vec![1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn week_matches_day_label_from_any_year() {
        let last_year = Utc.with_ymd_and_hms(2025, 10, 18, 8, 0, 0).unwrap();
        let last_week = Utc.with_ymd_and_hms(2025, 10, 11, 8, 0, 0).unwrap();
        let attempts = vec![attempt_at(last_year, true), attempt_at(last_week, true)];

        let data = to_data_set(&attempts, ChartDuration::Week, &now()).unwrap();
        assert_eq!(data.dataset, vec![0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(ChartDuration::Week.covered_since(&now()), Ok(None));
    }

    #[test]
    fn week_uses_local_calendar_day() {
        // 23:30 UTC on the 17th is already the 18th at UTC+2.
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = now().with_timezone(&plus_two);
        let late = Utc.with_ymd_and_hms(2026, 10, 17, 23, 30, 0).unwrap();

        let data = to_data_set(&[attempt_at(late, true)], ChartDuration::Week, &local_now).unwrap();
        assert_eq!(data.dataset[6], 1);

        let utc = to_data_set(&[attempt_at(late, true)], ChartDuration::Week, &now()).unwrap();
        assert_eq!(utc.dataset[5], 1);
    }

    #[test]
    fn month_places_three_day_old_attempts_in_latest_bucket() {
        let attempts: Vec<Attempt> = (0..3)
            .map(|s| attempt_at(now() - Duration::days(3) + Duration::seconds(s), false))
            .collect();

        let data = to_data_set(&attempts, ChartDuration::Month, &now()).unwrap();
        assert_eq!(data.dataset, vec![0, 0, 0, 0, 0, 3]);
        assert_eq!(data.dataset.iter().sum::<u64>(), 3);
        assert_eq!(
            data.labels,
            vec!["09/18", "09/23", "09/28", "10/03", "10/08", "10/13"]
        );
    }

    #[test]
    fn month_boundary_goes_to_the_more_recent_bucket() {
        // now - 5d is both the start of bucket 0 and the end of bucket 1.
        let boundary = attempt_at(now() - Duration::days(5), true);

        let data = to_data_set(&[boundary], ChartDuration::Month, &now()).unwrap();
        assert_eq!(data.dataset, vec![0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn month_conserves_counts_within_thirty_days() {
        let attempts: Vec<Attempt> = (0..=30)
            .map(|d| attempt_at(now() - Duration::days(d), true))
            .collect();

        let data = to_data_set(&attempts, ChartDuration::Month, &now()).unwrap();
        assert_eq!(data.dataset.iter().sum::<u64>(), attempts.len() as u64);
    }

    #[test]
    fn year_places_current_month_attempts_last() {
        let fifteenth = Utc.with_ymd_and_hms(2026, 10, 15, 9, 30, 0).unwrap();
        let attempts: Vec<Attempt> = (0..10)
            .map(|i| attempt_at(fifteenth + Duration::minutes(i), i % 3 == 0))
            .collect();

        let data = to_data_set(&attempts, ChartDuration::Year, &now()).unwrap();
        assert_eq!(data.labels.first().map(String::as_str), Some("11/25"));
        assert_eq!(data.labels.last().map(String::as_str), Some("10/26"));
        assert_eq!(data.dataset[11], 10);
        assert_eq!(data.dataset.iter().sum::<u64>(), 10);
    }

    #[test]
    fn year_conserves_counts_across_the_covered_range() {
        let since = ChartDuration::Year.covered_since(&now()).unwrap().unwrap();
        assert_eq!(since, Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap());

        let attempts: Vec<Attempt> = (0..50)
            .map(|i| attempt_at(since + Duration::days(i * 7), true))
            .filter(|a| a.timestamp_submitted <= now())
            .collect();

        let data = to_data_set(&attempts, ChartDuration::Year, &now()).unwrap();
        assert_eq!(data.dataset.iter().sum::<u64>(), attempts.len() as u64);
    }

    #[test]
    fn year_crosses_the_new_year() {
        let january = Utc.with_ymd_and_hms(2027, 1, 10, 0, 0, 0).unwrap();
        let december = attempt_at(Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap(), true);

        let data = to_data_set(&[december], ChartDuration::Year, &january).unwrap();
        assert_eq!(data.labels[10], "12/26");
        assert_eq!(data.labels[11], "01/27");
        assert_eq!(data.dataset[10], 1);
    }

    #[test]
    fn series_split_by_correctness() {
        let attempts = vec![
            attempt_at(now() - Duration::hours(1), true),
            attempt_at(now() - Duration::hours(2), false),
            attempt_at(now() - Duration::days(1), true),
        ];

        let series = attempt_series(&attempts, ChartDuration::Week, &now()).unwrap();
        assert_eq!(series.duration, "1W");
        assert_eq!(series.labels.len(), 7);
        assert_eq!(series.total, vec![0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(series.success, vec![0, 0, 0, 0, 0, 1, 1]);
        assert_eq!(series.failure, vec![0, 0, 0, 0, 0, 0, 1]);
    }
}
