/// End-to-end tests against a SQLite mirror on disk
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use habitflow::*;
use serde_json::json;
use tempfile::TempDir;

const PASSCODE: &str = "081234";

fn config_for(path: &Path) -> Config {
    Config {
        backend: BackendConfig::Local {
            path: Some(path.to_path_buf()),
        },
        app_id: "test-app".to_string(),
        ..Config::default()
    }
}

fn open_app(path: &Path, clock: &Arc<FixedClock>) -> HabitFlow {
    let store = LocalMirrorStore::new(path.to_path_buf()).expect("Failed to open store");
    let clock: Arc<dyn Clock> = Arc::clone(clock) as Arc<dyn Clock>;
    HabitFlow::with_store(config_for(path), Arc::new(store), clock)
}

async fn signed_in(app: &HabitFlow) -> Session {
    let identity = LocalIdentity::new(User::new("u1"));
    identity.sign_in().await.unwrap();
    app.start_session(&identity).await.unwrap()
}

async fn unlocked_repository(app: &HabitFlow) -> HabitRepository {
    let mut session = signed_in(app).await;
    session.authorize(PASSCODE).await.unwrap();
    let repository = app.repository(&session).await.unwrap();
    repository.loaded().await.unwrap();
    repository
}

/// Wait until the repository's mirror satisfies `ready`
async fn settle(repository: &HabitRepository, ready: impl Fn(&HabitData) -> bool) -> Arc<HabitData> {
    let mut changes = repository.changes();
    let data = tokio::time::timeout(Duration::from_secs(5), changes.wait_for(|data| ready(&**data)))
        .await
        .expect("Timed out waiting for snapshot")
        .expect("Repository dropped")
        .clone();
    data
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::at_rfc3339("2024-03-10T08:00:00+07:00").unwrap())
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_local_backend() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("habits.db");

        let app = HabitFlow::open(config_for(&path)).await.unwrap();
        assert_eq!(app.store().kind(), StoreKind::Local);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_gate_blocks_repository() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir.path().join("habits.db"), &clock());

        let identity = LocalIdentity::new(User::new("u1"));
        assert!(matches!(
            app.start_session(&identity).await,
            Err(AppError::Session(SessionError::NotSignedIn))
        ));

        let session = signed_in(&app).await;
        assert!(matches!(
            app.repository(&session).await,
            Err(AppError::Session(SessionError::NotAuthorized))
        ));
    }

    #[tokio::test]
    async fn test_habit_lifecycle() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;
        assert_eq!(repository.status(), SyncStatus::Local);

        let habit = repository
            .add_habit(HabitDraft::named("Drink water").with_reminder("07:30".parse().unwrap()))
            .await
            .unwrap();
        settle(&repository, |data| data.habit(&habit.id).is_some()).await;

        let today = clock.today();
        assert_eq!(repository.toggle_log(&habit.id, today).await.unwrap(), Toggled::Created);
        let data = settle(&repository, |data| data.is_done(&habit.id, today)).await;

        let engine = StatsEngine::new(&data, today);
        assert_eq!(engine.current_streak(&habit.id), 1);
        assert_eq!(engine.daily_completion_rate(), 100);

        let edited = repository
            .edit_habit(&habit.id, HabitDraft::named("Drink more water"))
            .await
            .unwrap();
        assert_eq!(edited.id, habit.id);
        assert_eq!(edited.created_at, habit.created_at);

        let data = settle(&repository, |data| {
            data.habit(&habit.id).map(|h| h.name.as_str()) == Some("Drink more water")
        })
        .await;
        assert!(data.is_done(&habit.id, today));

        assert_eq!(repository.toggle_log(&habit.id, today).await.unwrap(), Toggled::Removed);
        settle(&repository, |data| !data.is_done(&habit.id, today)).await;
    }

    #[tokio::test]
    async fn test_edit_keeps_unknown_icon_tag() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir.path().join("habits.db"), &clock());
        let repository = unlocked_repository(&app).await;
        let owner = repository.owner().cloned().unwrap();

        app.store()
            .put(
                &owner,
                Collection::Habits,
                "legacy-habit",
                json!({
                    "name": "Read",
                    "color": "#10b981",
                    "createdAt": "2024-03-01T07:30:00.000Z",
                    "reminderTime": null,
                    "icon": "SomethingNew"
                }),
            )
            .await
            .unwrap();

        let id = HabitId::from("legacy-habit");
        let data = settle(&repository, |data| data.habit(&id).is_some()).await;
        let mut draft = data.habit(&id).map(Habit::draft).unwrap();
        draft.name = "Read daily".to_string();

        let edited = repository.edit_habit(&id, draft).await.unwrap();
        assert_eq!(edited.icon.as_deref(), Some("SomethingNew"));
        assert_eq!(edited.icon(), HabitIcon::Activity);
    }

    #[tokio::test]
    async fn test_custom_log_uses_chosen_time() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;

        let habit = repository.add_habit(HabitDraft::named("Stretch")).await.unwrap();
        let date = parse_date("2024-03-08").unwrap();
        let time = NaiveTime::from_hms_opt(6, 45, 0).unwrap();

        let log = repository.add_custom_log(&habit.id, date, time).await.unwrap();
        assert_eq!(log.timestamp, clock.at(date, time));
        assert_eq!(log.id, LogId::for_day(&habit.id, date));

        // Correcting an existing day keeps a single log
        let later = NaiveTime::from_hms_opt(21, 0, 0).unwrap();
        repository.add_custom_log(&habit.id, date, later).await.unwrap();
        let data = settle(&repository, |data| {
            data.log_for(&habit.id, date).map(|log| log.timestamp) == Some(clock.at(date, later))
        })
        .await;
        assert_eq!(data.logs_for(&habit.id).count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_log_is_corrected_and_toggled_off() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;
        let owner = repository.owner().cloned().unwrap();

        let habit = repository.add_habit(HabitDraft::named("Read")).await.unwrap();
        app.store()
            .put(
                &owner,
                Collection::Logs,
                "a8f3k2m1z",
                json!({
                    "habitId": habit.id.as_str(),
                    "date": "2024-03-09",
                    "timestamp": "2024-03-09T01:15:00.000Z"
                }),
            )
            .await
            .unwrap();

        let date = parse_date("2024-03-09").unwrap();
        settle(&repository, |data| data.is_done(&habit.id, date)).await;

        let time = NaiveTime::from_hms_opt(20, 30, 0).unwrap();
        let log = repository.add_custom_log(&habit.id, date, time).await.unwrap();
        assert_eq!(log.id.as_str(), "a8f3k2m1z");
        assert_eq!(log.timestamp, clock.at(date, time));

        assert_eq!(repository.toggle_log(&habit.id, date).await.unwrap(), Toggled::Removed);
        let data = settle(&repository, |data| !data.is_done(&habit.id, date)).await;
        assert!(data.logs.is_empty());
    }

    #[tokio::test]
    async fn test_deleting_habit_orphans_its_logs() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;
        let today = clock.today();

        let kept = repository.add_habit(HabitDraft::named("Walk")).await.unwrap();
        let doomed = repository.add_habit(HabitDraft::named("Meditate")).await.unwrap();
        repository.toggle_log(&doomed.id, today).await.unwrap();
        settle(&repository, |data| data.is_done(&doomed.id, today)).await;

        repository.delete_habit(&doomed.id).await.unwrap();
        let data = settle(&repository, |data| data.habits.len() == 1).await;

        assert!(data.habit(&kept.id).is_some());
        assert_eq!(data.orphaned_logs().len(), 1);
        // Orphaned logs still count toward today's rate
        assert_eq!(StatsEngine::new(&data, today).daily_completion_rate(), 100);
    }

    #[tokio::test]
    async fn test_replace_habit_orphans_logs() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;
        let today = clock.today();

        let habit = repository.add_habit(HabitDraft::named("Journal")).await.unwrap();
        repository.toggle_log(&habit.id, today).await.unwrap();
        settle(&repository, |data| data.is_done(&habit.id, today)).await;

        let replacement = repository
            .replace_habit(&habit.id, HabitDraft::named("Journal daily"))
            .await
            .unwrap();
        assert_ne!(replacement.id, habit.id);

        let data = settle(&repository, |data| {
            data.habit(&replacement.id).is_some() && data.habit(&habit.id).is_none()
        })
        .await;
        assert!(!data.is_done(&replacement.id, today));
        assert_eq!(data.orphaned_logs().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_replacement_keeps_habit() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir.path().join("habits.db"), &clock());
        let repository = unlocked_repository(&app).await;

        let habit = repository.add_habit(HabitDraft::named("Run")).await.unwrap();
        let result = repository.replace_habit(&habit.id, HabitDraft::named("   ")).await;
        assert!(matches!(result, Err(RepositoryError::Domain(_))));

        let owner = repository.owner().cloned().unwrap();
        let stored = app
            .store()
            .get(&owner, Collection::Habits, habit.id.as_str())
            .await
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("habits.db");
        let clock = clock();

        let habit = {
            let app = open_app(&path, &clock);
            let repository = unlocked_repository(&app).await;
            let habit = repository.add_habit(HabitDraft::named("Sleep early")).await.unwrap();
            repository.toggle_log(&habit.id, clock.today()).await.unwrap();
            habit
        };

        let app = open_app(&path, &clock);
        let session = signed_in(&app).await;
        assert!(session.is_authorized());

        let repository = app.repository(&session).await.unwrap();
        let data = repository.loaded().await.unwrap();
        assert_eq!(data.habit(&habit.id).map(|h| h.name.as_str()), Some("Sleep early"));
        assert!(data.is_done(&habit.id, clock.today()));
    }

    #[tokio::test]
    async fn test_reminder_fires_for_pending_habit() {
        let dir = TempDir::new().unwrap();
        let clock = clock();
        let app = open_app(&dir.path().join("habits.db"), &clock);
        let repository = unlocked_repository(&app).await;

        let habit = repository
            .add_habit(HabitDraft::named("Vitamins").with_reminder("08:00".parse().unwrap()))
            .await
            .unwrap();
        settle(&repository, |data| data.habit(&habit.id).is_some()).await;

        let scheduler = app.reminders(&repository, Arc::new(TracingSink));
        let due = scheduler.tick();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].habit_id, habit.id);
        assert_eq!(scheduler.toasts().active().len(), 1);

        repository.toggle_log(&habit.id, clock.today()).await.unwrap();
        settle(&repository, |data| data.is_done(&habit.id, clock.today())).await;
        assert!(scheduler.tick().is_empty());
    }
}
