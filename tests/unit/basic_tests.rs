/// Basic unit tests to verify core functionality
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use habitflow::*;

fn day(s: &str) -> NaiveDate {
    parse_date(s).unwrap()
}

#[cfg(test)]
mod basic_unit_tests {
    use super::*;

    #[test]
    fn test_habit_creation() {
        let draft = HabitDraft::named("  Drink water ")
            .with_color(HabitColor::parse("#10B981").unwrap())
            .with_reminder("07:30".parse().unwrap())
            .with_icon(HabitIcon::Droplets);
        let habit = Habit::new(draft, Utc::now()).unwrap();

        assert_eq!(habit.name, "Drink water");
        assert_eq!(habit.color.as_str(), "#10b981");
        assert_eq!(habit.icon(), HabitIcon::Droplets);
        assert_eq!(habit.reminder_time.map(|t| t.to_string()), Some("07:30".to_string()));
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let result = Habit::new(HabitDraft::named(""), Utc::now());
        assert!(matches!(result, Err(DomainError::InvalidHabitName(_))));
    }

    #[test]
    fn test_habit_ids_are_unique() {
        let a = Habit::new(HabitDraft::named("Read"), Utc::now()).unwrap();
        let b = Habit::new(HabitDraft::named("Read"), Utc::now()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_stored_habit_layout() {
        let created = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let habit = Habit::with_id(HabitId::from("h1"), HabitDraft::named("Water"), created).unwrap();
        let record = serde_json::to_value(&habit).unwrap();

        assert_eq!(record["id"], "h1");
        assert_eq!(record["color"], HabitColor::DEFAULT);
        assert!(record.get("createdAt").is_some());
        assert!(record["reminderTime"].is_null());
    }

    #[test]
    fn test_unknown_icon_falls_back() {
        let habit: Habit = serde_json::from_value(serde_json::json!({
            "id": "h1",
            "name": "Water",
            "color": "#3b82f6",
            "createdAt": "2024-03-01T10:00:00.000Z",
            "reminderTime": null,
            "icon": "Rocket"
        }))
        .unwrap();

        assert_eq!(habit.icon(), HabitIcon::Activity);
        assert_eq!(habit.icon.as_deref(), Some("Rocket"));
    }

    #[test]
    fn test_log_day_key() {
        let habit = HabitId::from("h1");
        assert_eq!(LogId::for_day(&habit, day("2024-03-10")).as_str(), "h1_2024-03-10");
    }

    #[test]
    fn test_owner_scope() {
        assert_eq!(
            OwnerId::scoped("habitflow-default", "u1").as_str(),
            "artifacts/habitflow-default/users/u1"
        );
    }

    #[test]
    fn test_streak_scenarios() {
        let today = day("2024-03-10");
        let dates = |days: &[&str]| days.iter().map(|d| day(d)).collect::<BTreeSet<_>>();

        assert_eq!(current_streak(&dates(&[]), today), 0);
        assert_eq!(current_streak(&dates(&["2024-03-08", "2024-03-09", "2024-03-10"]), today), 3);
        assert_eq!(current_streak(&dates(&["2024-03-08", "2024-03-09"]), today), 2);
        assert_eq!(current_streak(&dates(&["2024-03-08"]), today), 0);
    }

    #[test]
    fn test_streak_grace_equals_yesterday_streak() {
        let history = ["2024-02-27", "2024-02-28", "2024-02-29", "2024-03-01"];
        let dates: BTreeSet<NaiveDate> = history.iter().map(|d| day(d)).collect();

        let from_today = current_streak(&dates, day("2024-03-02"));
        let from_yesterday = current_streak(&dates, day("2024-03-01"));
        assert_eq!(from_today, from_yesterday);
        assert_eq!(from_today, 4);
    }

    #[test]
    fn test_month_lengths() {
        let month = |s: &str| s.parse::<YearMonth>().unwrap();
        assert_eq!(month("2024-02").days_in_month(), 29);
        assert_eq!(month("2023-02").days_in_month(), 28);
        assert_eq!(month("1900-02").days_in_month(), 28);
        assert_eq!(month("2000-02").days_in_month(), 29);
        assert_eq!(month("2024-04").days_in_month(), 30);
        assert_eq!(month("2024-12").days_in_month(), 31);
        assert!("2024-13".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_sync_status_signal() {
        let status = SyncStatus::on_subscribe(StoreKind::Remote);
        assert_eq!(status, SyncStatus::Syncing);
        assert_eq!(status.on_snapshot(), SyncStatus::Synced);
        assert_eq!(status.on_failure(), SyncStatus::Error);
        assert_eq!(SyncStatus::on_subscribe(StoreKind::Local), SyncStatus::Local);
    }

    #[tokio::test]
    async fn test_store_creation() {
        let temp_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
        let store = LocalMirrorStore::new(temp_file.path().to_path_buf());
        assert!(store.is_ok());

        let store: &dyn RecordStore = &store.unwrap();
        assert_eq!(store.kind(), StoreKind::Local);
    }

    #[test]
    fn test_mirror_round_trip() {
        let store = LocalMirrorStore::open_in_memory().unwrap();
        let owner = OwnerId::scoped("test-app", "u1");

        tokio_test::block_on(async {
            store
                .put(&owner, Collection::Habits, "h1", serde_json::json!({"name": "Water"}))
                .await
                .unwrap();

            let record = store.get(&owner, Collection::Habits, "h1").await.unwrap().unwrap();
            assert_eq!(record["id"], "h1");
            assert!(store.get(&owner, Collection::Logs, "h1").await.unwrap().is_none());
        });
    }
}
