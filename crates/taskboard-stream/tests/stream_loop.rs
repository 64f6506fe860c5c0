//! End-to-end stream tests against a loopback fake daemon

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};

use taskboard_core::{NodeStatus, NullResolver, TaskState, TaskUpdate};
use taskboard_stream::codec;
use taskboard_stream::{Dashboard, ReaderConfig, StreamReader};

fn test_config(port: u16) -> ReaderConfig {
    ReaderConfig {
        host: "127.0.0.1".to_string(),
        port,
        coalesce_delay: Duration::from_millis(5),
        reconnect_delay: Duration::from_millis(50),
    }
}

fn test_dashboard() -> (Arc<Dashboard>, Arc<AtomicUsize>) {
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    let dashboard = Arc::new(Dashboard::new(
        Arc::new(NullResolver),
        None,
        Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    ));
    (dashboard, notifications)
}

async fn write_header(stream: &mut TcpStream, root: &str) {
    let header = taskboard_core::Header {
        project_root: root.to_string(),
    };
    codec::write_frame(stream, &header).await.unwrap();
}

async fn write_update(stream: &mut TcpStream, update: &TaskUpdate) {
    codec::write_frame(stream, update).await.unwrap();
}

/// Poll until `predicate` holds or a couple of seconds elapse.
async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_end_to_end_failed_compile() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        write_header(&mut stream, "/work/proj").await;

        write_update(
            &mut stream,
            &TaskUpdate {
                id: 1,
                state: Some(TaskState::Pending),
                noun: Some("src/a.cc".to_string()),
                verb: Some("compile".to_string()),
                ..TaskUpdate::default()
            },
        )
        .await;
        write_update(
            &mut stream,
            &TaskUpdate {
                id: 1,
                state: Some(TaskState::Failed),
                log: Some("src/a.cc:3: error: oops\n".to_string()),
                ..TaskUpdate::default()
            },
        )
        .await;

        // Keep the connection open until the test has made its assertions.
        let _ = hold_rx.await;
    });

    let (dashboard, _) = test_dashboard();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reader = StreamReader::new(test_config(port), Arc::clone(&dashboard), shutdown_rx);
    let reader_task = tokio::spawn(reader.run());

    let board = Arc::clone(&dashboard);
    wait_for(move || {
        board.with_tree(|tree, _| tree.status(tree.root()) == NodeStatus::DirectoryWithErrors)
    })
    .await;

    dashboard.with_tree(|tree, project_root| {
        assert_eq!(project_root, Some("/work/proj"));

        let src = tree.visible_children(tree.root())[0];
        assert_eq!(tree.label(src), "src");
        assert_eq!(tree.status(src), NodeStatus::DirectoryWithErrors);

        let action = tree.visible_children(src)[0];
        assert_eq!(tree.label(action), "compile: a.cc");
        assert_eq!(tree.status(action), NodeStatus::Failed);

        let lines = tree.visible_children(action);
        assert_eq!(lines.len(), 1);
        let diagnostic = tree.diagnostic(lines[0]).unwrap();
        assert_eq!(diagnostic.message, "oops");
        assert_eq!(diagnostic.line, Some(3));
    });
    assert_eq!(dashboard.tracked_actions(), 1);

    shutdown_tx.send(true).unwrap();
    let _ = hold_tx.send(());
    reader_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_transport_error_resets_then_resyncs() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (drop_tx, drop_rx) = oneshot::channel::<()>();
    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        // First connection: one failed task, then a hard drop.
        let (mut stream, _) = listener.accept().await.unwrap();
        write_header(&mut stream, "/work/proj").await;
        write_update(
            &mut stream,
            &TaskUpdate {
                id: 1,
                state: Some(TaskState::Failed),
                noun: Some("src/a.cc".to_string()),
                verb: Some("compile".to_string()),
                ..TaskUpdate::default()
            },
        )
        .await;
        let _ = drop_rx.await;
        drop(stream);

        // Second connection: the daemon replays state from scratch.
        let (mut stream, _) = listener.accept().await.unwrap();
        write_header(&mut stream, "/work/proj").await;
        write_update(
            &mut stream,
            &TaskUpdate {
                id: 2,
                state: Some(TaskState::Running),
                noun: Some("src/a.cc".to_string()),
                verb: Some("compile".to_string()),
                ..TaskUpdate::default()
            },
        )
        .await;
        let _ = hold_rx.await;
    });

    let (dashboard, _) = test_dashboard();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reader = StreamReader::new(test_config(port), Arc::clone(&dashboard), shutdown_rx);
    let reader_task = tokio::spawn(reader.run());

    // First sync lands.
    let board = Arc::clone(&dashboard);
    wait_for(move || {
        board.with_tree(|tree, _| tree.status(tree.root()) == NodeStatus::DirectoryWithErrors)
    })
    .await;

    // Kill the connection; everything must be cleared before the retry.
    drop_tx.send(()).unwrap();
    let board = Arc::clone(&dashboard);
    wait_for(move || {
        board.tracked_actions() == 0
            && board.pending_updates() == 0
            && board.with_tree(|tree, _| tree.visible_children(tree.root()).is_empty())
    })
    .await;

    // After the cool-down the reader resyncs from the replayed stream.
    let board = Arc::clone(&dashboard);
    wait_for(move || {
        board.with_tree(|tree, _| tree.status(tree.root()) == NodeStatus::DirectoryRunning)
    })
    .await;
    assert_eq!(dashboard.tracked_actions(), 1);

    shutdown_tx.send(true).unwrap();
    let _ = hold_tx.send(());
    reader_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_burst_coalesces_into_few_notifications() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (hold_tx, hold_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        write_header(&mut stream, "/work/proj").await;
        for id in 0..50u64 {
            write_update(
                &mut stream,
                &TaskUpdate {
                    id,
                    state: Some(TaskState::Passed),
                    noun: Some(format!("src/f{id}.cc")),
                    verb: Some("compile".to_string()),
                    ..TaskUpdate::default()
                },
            )
            .await;
        }
        let _ = hold_rx.await;
    });

    let (dashboard, notifications) = test_dashboard();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut config = test_config(port);
    config.coalesce_delay = Duration::from_millis(50);
    let reader = StreamReader::new(config, Arc::clone(&dashboard), shutdown_rx);
    let reader_task = tokio::spawn(reader.run());

    let board = Arc::clone(&dashboard);
    wait_for(move || board.tracked_actions() == 50).await;

    // 50 updates arrive well inside one coalescing window; they must not
    // produce anywhere near 50 refreshes.
    assert!(
        notifications.load(Ordering::SeqCst) < 10,
        "burst was not coalesced: {} notifications",
        notifications.load(Ordering::SeqCst)
    );

    shutdown_tx.send(true).unwrap();
    let _ = hold_tx.send(());
    reader_task.await.unwrap().unwrap();
}
