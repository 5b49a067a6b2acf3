/// Statistics over hand-built snapshots
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use habitflow::*;

fn day(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
}

fn habit(id: &str) -> Habit {
    let created = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc);
    Habit::with_id(HabitId::from(id), HabitDraft::named(id), created).unwrap()
}

fn log(habit_id: &str, date: &str) -> Log {
    let timestamp: DateTime<FixedOffset> =
        DateTime::parse_from_rfc3339(&format!("{}T09:00:00+07:00", date)).unwrap();
    Log::for_day(HabitId::from(habit_id), day(date), timestamp)
}

#[cfg(test)]
mod stats_tests {
    use super::*;

    #[test]
    fn test_per_day_counts_cover_every_month_length() {
        let data = HabitData::new(
            vec![habit("h1"), habit("h2")],
            vec![
                log("h1", "2023-02-28"),
                log("h1", "2024-02-29"),
                log("h2", "2024-02-29"),
                log("h1", "2024-04-30"),
                log("h1", "2024-12-31"),
                log("h1", "2025-01-01"),
            ],
        );
        let engine = StatsEngine::new(&data, day("2024-03-10"));

        for (month, days) in [("2023-02", 28), ("2024-02", 29), ("2024-04", 30), ("2024-12", 31)] {
            let month: YearMonth = month.parse().unwrap();
            let counts = engine.per_day_counts(month);

            assert_eq!(counts.len(), days);
            assert_eq!(counts.first().map(|c| c.day), Some(1));
            assert_eq!(counts.last().map(|c| c.day), Some(days as u32));
            assert_eq!(
                counts.iter().map(|c| c.count).sum::<usize>(),
                engine.monthly_total(month)
            );
        }

        let feb = engine.per_day_counts("2024-02".parse().unwrap());
        assert_eq!(feb[28].count, 2);
        assert_eq!(engine.monthly_total("2024-12".parse().unwrap()), 1);
    }

    #[test]
    fn test_rate_without_habits_is_zero() {
        let data = HabitData::new(vec![], vec![log("gone", "2024-03-10")]);
        let engine = StatsEngine::new(&data, day("2024-03-10"));

        assert_eq!(engine.daily_completion_rate(), 0);
        assert_eq!(engine.summary().today_completed, 1);
    }

    #[test]
    fn test_rate_rounds_to_whole_percent() {
        let data = HabitData::new(
            vec![habit("h1"), habit("h2"), habit("h3")],
            vec![log("h1", "2024-03-10"), log("h2", "2024-03-09")],
        );
        let engine = StatsEngine::new(&data, day("2024-03-10"));

        assert_eq!(engine.daily_completion_rate(), 33);
    }

    #[test]
    fn test_rate_counts_logs_of_deleted_habits() {
        let data = HabitData::new(
            vec![habit("h1")],
            vec![log("h1", "2024-03-10"), log("gone", "2024-03-10")],
        );
        let engine = StatsEngine::new(&data, day("2024-03-10"));

        assert_eq!(engine.daily_completion_rate(), 200);
        assert_eq!(data.orphaned_logs().len(), 1);
    }

    #[test]
    fn test_streak_survives_until_end_of_today() {
        let data = HabitData::new(
            vec![habit("h1")],
            vec![log("h1", "2024-03-07"), log("h1", "2024-03-08"), log("h1", "2024-03-09")],
        );
        let h1 = HabitId::from("h1");

        assert_eq!(StatsEngine::new(&data, day("2024-03-09")).current_streak(&h1), 3);
        assert_eq!(StatsEngine::new(&data, day("2024-03-10")).current_streak(&h1), 3);
        assert_eq!(StatsEngine::new(&data, day("2024-03-11")).current_streak(&h1), 0);
    }

    #[test]
    fn test_weekly_counts_end_today() {
        let data = HabitData::new(
            vec![habit("h1")],
            vec![log("h1", "2024-03-04"), log("h1", "2024-03-10"), log("h1", "2024-03-03")],
        );
        let engine = StatsEngine::new(&data, day("2024-03-10"));
        let week = engine.weekly_counts(Lang::En);

        assert_eq!(week.len(), 7);
        assert_eq!(week[0].date, day("2024-03-04"));
        assert_eq!(week[0].label, "Mon");
        assert_eq!(week[0].count, 1);
        assert_eq!(week[6].label, "Sun");
        assert_eq!(week[6].count, 1);
        assert_eq!(week.iter().map(|w| w.count).sum::<usize>(), 2);

        let labels: Vec<_> = engine.weekly_counts(Lang::Id).iter().map(|w| w.label).collect();
        assert_eq!(labels.last(), Some(&"Min"));
    }

    #[test]
    fn test_calendar_filter_by_habit() {
        let data = HabitData::new(
            vec![habit("h1"), habit("h2")],
            vec![log("h1", "2024-09-01"), log("h2", "2024-09-01")],
        );
        let engine = StatsEngine::new(&data, day("2024-09-15"));
        let month: YearMonth = "2024-09".parse().unwrap();

        // September 2024 starts on a Sunday
        let all = engine.calendar_month_grid(month, &HabitFilter::All);
        assert_eq!(all.len(), 30);
        assert_eq!(all[0].date(), Some(day("2024-09-01")));

        let only_h2 = engine.calendar_month_grid(month, &HabitFilter::Habit(HabitId::from("h2")));
        match &only_h2[0] {
            CalendarCell::Day { logs, .. } => {
                assert_eq!(logs.len(), 1);
                assert_eq!(logs[0].habit_id.as_str(), "h2");
            }
            CalendarCell::Padding => panic!("expected a day cell"),
        }
    }

    #[test]
    fn test_last_representable_month() {
        let data = HabitData::default();
        let engine = StatsEngine::new(&data, day("2024-03-10"));
        let month = YearMonth::of(NaiveDate::MAX);

        assert_eq!(engine.per_day_counts(month).len(), 31);
        let cells = engine.calendar_month_grid(month, &HabitFilter::All);
        assert_eq!(cells.iter().filter(|cell| cell.date().is_some()).count(), 31);
    }
}
