use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    Timelike, Utc,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Running totals cached on the agent. The delivered orders remain the
/// source of truth; these buckets only make the dashboard cheap to read.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Earnings {
    pub total: Decimal,
    pub today: Decimal,
    pub week: Decimal,
    pub month: Decimal,
    pub last_credited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EarningsPeriod {
    Today,
    #[default]
    Week,
    Month,
    Year,
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsBucket {
    pub start: DateTime<Utc>,
    pub earnings: Decimal,
    pub orders: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub agent_id: Uuid,
    pub period: EarningsPeriod,
    pub from: Option<DateTime<Utc>>,
    pub to: DateTime<Utc>,
    pub total_earnings: Decimal,
    pub order_count: u64,
    pub average_per_order: Decimal,
    pub breakdown: Vec<EarningsBucket>,
}

/// Wall-clock window boundaries for a single configured UTC offset.
/// Weeks start on Monday.
#[derive(Debug, Clone, Copy)]
pub struct EarningsCalendar {
    offset: FixedOffset,
}

impl Default for EarningsCalendar {
    fn default() -> Self {
        Self { offset: Utc.fix() }
    }
}

impl EarningsCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let shift = TimeDelta::seconds(i64::from(self.offset.local_minus_utc()));
        DateTime::<Utc>::from_naive_utc_and_offset(local - shift, Utc)
    }

    pub fn day_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        self.to_utc(self.local_date(at).and_time(NaiveTime::MIN))
    }

    pub fn week_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(at);
        let monday = date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()));
        self.to_utc(monday.and_time(NaiveTime::MIN))
    }

    pub fn month_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(at);
        let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
        self.to_utc(first.and_time(NaiveTime::MIN))
    }

    pub fn year_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(at);
        let first = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
        self.to_utc(first.and_time(NaiveTime::MIN))
    }

    fn hour_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let local = at.with_timezone(&self.offset);
        let hour = NaiveTime::from_hms_opt(local.hour(), 0, 0).unwrap_or(NaiveTime::MIN);
        self.to_utc(local.date_naive().and_time(hour))
    }

    /// Start of the window `period` covers at `now`; `None` means unbounded.
    pub fn period_start(&self, period: EarningsPeriod, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match period {
            EarningsPeriod::Today => Some(self.day_start(now)),
            EarningsPeriod::Week => Some(self.week_start(now)),
            EarningsPeriod::Month => Some(self.month_start(now)),
            EarningsPeriod::Year => Some(self.year_start(now)),
            EarningsPeriod::All => None,
        }
    }

    /// Sub-period a completion falls into when breaking a period down:
    /// hours for today, days for week/month, months otherwise.
    pub fn bucket_start(&self, period: EarningsPeriod, at: DateTime<Utc>) -> DateTime<Utc> {
        match period {
            EarningsPeriod::Today => self.hour_start(at),
            EarningsPeriod::Week | EarningsPeriod::Month => self.day_start(at),
            EarningsPeriod::Year | EarningsPeriod::All => self.month_start(at),
        }
    }

    /// Buckets as they read at `now`: any window that started after the
    /// last credit is zeroed. `total` never resets.
    pub fn rolled_over(&self, earnings: &Earnings, now: DateTime<Utc>) -> Earnings {
        let mut view = earnings.clone();
        let Some(last) = earnings.last_credited_at else {
            return view;
        };

        if last < self.day_start(now) {
            view.today = Decimal::ZERO;
        }
        if last < self.week_start(now) {
            view.week = Decimal::ZERO;
        }
        if last < self.month_start(now) {
            view.month = Decimal::ZERO;
        }
        view
    }

    /// Adds `amount` to `total` and to every bucket whose window contains
    /// `at`. A credit older than the latest one never reopens a window that
    /// has already rolled over.
    pub fn credit(&self, earnings: &mut Earnings, amount: Decimal, at: DateTime<Utc>) {
        let latest = match earnings.last_credited_at {
            Some(last) if last > at => last,
            _ => at,
        };

        let mut next = self.rolled_over(earnings, latest);
        next.total += amount;
        if at >= self.day_start(latest) {
            next.today += amount;
        }
        if at >= self.week_start(latest) {
            next.week += amount;
        }
        if at >= self.month_start(latest) {
            next.month += amount;
        }
        next.last_credited_at = Some(latest);
        *earnings = next;
    }
}
