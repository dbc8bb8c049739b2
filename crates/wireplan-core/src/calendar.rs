//! 班別日曆

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 班別日曆（每日固定班別起點）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftCalendar {
    /// 班別開始時間（依時間排序）
    pub shift_starts: Vec<NaiveTime>,
}

impl ShiftCalendar {
    /// 從班別開始時間建立
    pub fn new(mut shift_starts: Vec<NaiveTime>) -> Self {
        shift_starts.sort();
        shift_starts.dedup();
        if shift_starts.is_empty() {
            shift_starts.push(NaiveTime::default());
        }
        Self { shift_starts }
    }

    /// 三班制：00:00、08:00、16:00
    pub fn three_shifts() -> Self {
        Self::new(
            [0, 8, 16]
                .into_iter()
                .filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
                .collect(),
        )
    }

    /// 嚴格晚於 `time` 的下一個班別起點
    pub fn next_shift_start(&self, time: NaiveDateTime) -> NaiveDateTime {
        let date = time.date();
        self.shift_starts
            .iter()
            .map(|&start| date.and_time(start))
            .find(|&candidate| candidate > time)
            .unwrap_or_else(|| (date + Duration::days(1)).and_time(self.shift_starts[0]))
    }

    /// 機台可開工時間：上次完工與現在取較晚者，再進位到下一班
    pub fn machine_start(&self, last_completion: Option<NaiveDateTime>, now: NaiveDateTime) -> NaiveDateTime {
        let base = last_completion.map(|cot| cot.max(now)).unwrap_or(now);
        self.next_shift_start(base)
    }

    /// 當日零點
    pub fn start_of_day(time: NaiveDateTime) -> NaiveDateTime {
        time.date().and_time(NaiveTime::default())
    }
}

impl Default for ShiftCalendar {
    fn default() -> Self {
        Self::three_shifts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    #[rstest]
    #[case(at(6, 7, 30), at(6, 8, 0))]
    #[case(at(6, 8, 0), at(6, 16, 0))]
    #[case(at(6, 15, 59), at(6, 16, 0))]
    #[case(at(6, 16, 1), at(7, 0, 0))]
    #[case(at(6, 0, 0), at(6, 8, 0))]
    fn test_next_shift_start(#[case] now: NaiveDateTime, #[case] expected: NaiveDateTime) {
        let calendar = ShiftCalendar::three_shifts();
        assert_eq!(calendar.next_shift_start(now), expected);
    }

    #[test]
    fn test_machine_start_uses_later_time() {
        let calendar = ShiftCalendar::default();
        let now = at(6, 9, 0);

        // 歷史完工早於現在：以現在為準
        assert_eq!(calendar.machine_start(Some(at(5, 23, 0)), now), at(6, 16, 0));
        // 歷史完工晚於現在：以歷史為準
        assert_eq!(calendar.machine_start(Some(at(6, 17, 0)), now), at(7, 0, 0));
        // 無歷史
        assert_eq!(calendar.machine_start(None, now), at(6, 16, 0));
    }

    #[test]
    fn test_empty_shifts_fall_back_to_midnight() {
        let calendar = ShiftCalendar::new(Vec::new());
        assert_eq!(calendar.next_shift_start(at(6, 9, 0)), at(7, 0, 0));
        assert_eq!(ShiftCalendar::start_of_day(at(6, 9, 30)), at(6, 0, 0));
    }
}
