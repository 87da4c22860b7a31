// src/grid/calendar.rs
use chrono::{Datelike, NaiveDate};

/// Time indices of one calendar month across every year of a time axis.
///
/// Always derived from the axis on demand, never persisted next to the grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarMonthGroup {
    pub month: u32,
    pub indices: Vec<usize>,
}

/// Groups time indices by month of year. Months with no time steps are left
/// out, and groups come back ordered January to December.
pub fn month_groups(times: &[NaiveDate]) -> Vec<CalendarMonthGroup> {
    let mut buckets: [Vec<usize>; 12] = Default::default();
    for (t, date) in times.iter().enumerate() {
        buckets[date.month0() as usize].push(t);
    }

    buckets
        .into_iter()
        .enumerate()
        .filter(|(_, indices)| !indices.is_empty())
        .map(|(m, indices)| CalendarMonthGroup {
            month: m as u32 + 1,
            indices,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    #[test]
    fn groups_follow_calendar_month() {
        let times = [d(2000, 1), d(2000, 2), d(2001, 1), d(2001, 2), d(2002, 1)];
        let groups = month_groups(&times);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].month, 1);
        assert_eq!(groups[0].indices, vec![0, 2, 4]);
        assert_eq!(groups[1].month, 2);
        assert_eq!(groups[1].indices, vec![1, 3]);
    }

    #[test]
    fn empty_axis_has_no_groups() {
        assert!(month_groups(&[]).is_empty());
    }
}
