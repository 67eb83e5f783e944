use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

/// Retention class of a backup, chosen from the date it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Periodicity {
    Daily,
    Weekly,
    Monthly,
}

impl Periodicity {
    /// The first of the month is monthly, even on a Sunday; other Sundays are weekly.
    pub fn for_date(date: NaiveDate) -> Self {
        if date.day() == 1 {
            Periodicity::Monthly
        } else if date.weekday() == Weekday::Sun {
            Periodicity::Weekly
        } else {
            Periodicity::Daily
        }
    }

    /// Suffix used in archive filenames.
    pub fn code(&self) -> char {
        match self {
            Periodicity::Daily => 'D',
            Periodicity::Weekly => 'W',
            Periodicity::Monthly => 'M',
        }
    }

    /// Bucket prefix the archive is stored under.
    pub fn directory(&self) -> &'static str {
        match self {
            Periodicity::Daily => "daily",
            Periodicity::Weekly => "weekly",
            Periodicity::Monthly => "monthly",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_of_month_is_monthly() {
        // 2024-06-01 is a Saturday.
        assert_eq!(Periodicity::for_date(date(2024, 6, 1)), Periodicity::Monthly);
        // 2024-09-01 is a Sunday; the month still wins.
        assert_eq!(Periodicity::for_date(date(2024, 9, 1)), Periodicity::Monthly);
    }

    #[test]
    fn sunday_is_weekly() {
        assert_eq!(Periodicity::for_date(date(2024, 6, 2)), Periodicity::Weekly);
    }

    #[test]
    fn other_days_are_daily() {
        assert_eq!(Periodicity::for_date(date(2024, 6, 4)), Periodicity::Daily);
        assert_eq!(Periodicity::Daily.code(), 'D');
        assert_eq!(Periodicity::Weekly.directory(), "weekly");
    }
}
