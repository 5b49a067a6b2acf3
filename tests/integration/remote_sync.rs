/// Two sessions sharing one document server
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use habitflow::rpc::protocol::{methods, PROTOCOL_VERSION};
use habitflow::*;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};

const WAIT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, watch::Sender<bool>) {
    let store = Arc::new(LocalMirrorStore::open_in_memory().unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, signal) = watch::channel(false);

    tokio::spawn(DocumentServer::new(store).run(listener, signal));
    (addr, shutdown)
}

async fn client(addr: SocketAddr) -> HabitRepository {
    let store = RemoteStore::connect(&addr.to_string()).await.unwrap();
    let clock: Arc<dyn Clock> =
        Arc::new(FixedClock::at_rfc3339("2024-03-10T08:00:00+07:00").unwrap());
    let mut repository = HabitRepository::new(Arc::new(store), clock);
    repository
        .attach(OwnerId::scoped("test-app", "u1"))
        .await
        .unwrap();
    repository
}

async fn settle(repository: &HabitRepository, ready: impl Fn(&HabitData) -> bool) -> Arc<HabitData> {
    let mut changes = repository.changes();
    let data = tokio::time::timeout(WAIT, changes.wait_for(|data| ready(&**data)))
        .await
        .expect("Timed out waiting for snapshot")
        .expect("Repository dropped")
        .clone();
    data
}

async fn wait_status(repository: &HabitRepository, expected: SyncStatus) {
    let mut status = repository.status_changes();
    tokio::time::timeout(WAIT, status.wait_for(|status| *status == expected))
        .await
        .expect("Timed out waiting for status")
        .expect("Repository dropped");
}

/// A server that answers the handshake and subscriptions, then hangs up on request
async fn flaky_server() -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (hang_up, hung_up) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        let mut subscribed = 0;

        while subscribed < 2 {
            let Ok(Some(line)) = lines.next_line().await else {
                return;
            };
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["id"].clone();

            let mut replies = Vec::new();
            match request["method"].as_str() {
                Some(methods::INITIALIZE) => replies.push(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": PROTOCOL_VERSION,
                        "serverInfo": {"name": "flaky", "version": "0.0.0"}
                    }
                })),
                Some(methods::SUBSCRIBE) => {
                    subscribed += 1;
                    replies.push(json!({"jsonrpc": "2.0", "id": id, "result": {}}));
                    replies.push(json!({
                        "jsonrpc": "2.0",
                        "method": methods::SNAPSHOT,
                        "params": {
                            "subscription": request["params"]["subscription"],
                            "records": []
                        }
                    }));
                }
                _ => continue,
            }

            for reply in replies {
                let line = format!("{}\n", reply);
                write_half.write_all(line.as_bytes()).await.unwrap();
            }
        }

        let _ = hung_up.await;
    });

    (addr, hang_up)
}

#[cfg(test)]
mod remote_sync_tests {
    use super::*;

    #[tokio::test]
    async fn test_status_moves_from_syncing_to_synced() {
        let (addr, _shutdown) = start_server().await;
        let store = RemoteStore::connect(&addr.to_string()).await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mut repository = HabitRepository::new(Arc::new(store), clock);
        assert_eq!(repository.status(), SyncStatus::Syncing);

        repository.attach(OwnerId::scoped("test-app", "u1")).await.unwrap();
        tokio::time::timeout(WAIT, repository.loaded()).await.unwrap().unwrap();
        assert_eq!(repository.status(), SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_writes_reach_other_session() {
        let (addr, _shutdown) = start_server().await;
        let phone = client(addr).await;
        let laptop = client(addr).await;
        tokio::time::timeout(WAIT, laptop.loaded()).await.unwrap().unwrap();

        let habit = phone.add_habit(HabitDraft::named("Drink water")).await.unwrap();
        settle(&laptop, |data| data.habit(&habit.id).is_some()).await;

        let today = parse_date("2024-03-10").unwrap();
        assert_eq!(laptop.toggle_log(&habit.id, today).await.unwrap(), Toggled::Created);
        let data = settle(&phone, |data| data.is_done(&habit.id, today)).await;
        assert_eq!(StatsEngine::new(&data, today).current_streak(&habit.id), 1);

        // The second toggle sees the first one's write on the server
        assert_eq!(phone.toggle_log(&habit.id, today).await.unwrap(), Toggled::Removed);
        settle(&laptop, |data| !data.is_done(&habit.id, today)).await;

        phone.delete_habit(&habit.id).await.unwrap();
        settle(&laptop, |data| data.habits.is_empty()).await;
    }

    #[tokio::test]
    async fn test_other_owner_sees_nothing() {
        let (addr, _shutdown) = start_server().await;
        let first = client(addr).await;
        first.add_habit(HabitDraft::named("Private")).await.unwrap();

        let store = RemoteStore::connect(&addr.to_string()).await.unwrap();
        let mut other = HabitRepository::new(Arc::new(store), Arc::new(SystemClock));
        other.attach(OwnerId::scoped("test-app", "u2")).await.unwrap();

        let data = tokio::time::timeout(WAIT, other.loaded()).await.unwrap().unwrap();
        assert!(data.habits.is_empty());
    }

    #[tokio::test]
    async fn test_session_flag_is_shared() {
        let (addr, _shutdown) = start_server().await;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let first: Arc<dyn RecordStore> =
            Arc::new(RemoteStore::connect(&addr.to_string()).await.unwrap());
        let second: Arc<dyn RecordStore> =
            Arc::new(RemoteStore::connect(&addr.to_string()).await.unwrap());

        let mut session = Session::start(
            first,
            Arc::clone(&clock),
            SoftGate::default(),
            "test-app",
            User::new("u1"),
        )
        .await
        .unwrap();
        session.authorize("081234").await.unwrap();

        let other = Session::start(second, clock, SoftGate::default(), "test-app", User::new("u1"))
            .await
            .unwrap();
        assert!(other.is_authorized());
    }

    #[tokio::test]
    async fn test_lost_connection_reports_error() {
        let (addr, hang_up) = flaky_server().await;
        let repository = client(addr).await;

        tokio::time::timeout(WAIT, repository.loaded()).await.unwrap().unwrap();
        assert_eq!(repository.status(), SyncStatus::Synced);

        hang_up.send(()).unwrap();
        wait_status(&repository, SyncStatus::Error).await;

        let result = repository.add_habit(HabitDraft::named("Offline")).await;
        assert!(matches!(result, Err(RepositoryError::Storage(_))));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RemoteStore::connect(&addr.to_string()).await;
        assert!(matches!(result, Err(StorageError::Connection(_))));
    }
}
