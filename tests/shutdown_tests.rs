use std::time::Duration;

use sockwrite::{Request, Response, Server, ServerConfig, ServerState};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

#[tokio::test]
async fn test_stop_closes_listener() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("test.sock");
    let server = Server::new(ServerConfig::new(&socket, dir.path().join("data.txt"))).unwrap();
    let handle = server.handle();

    let task = tokio::spawn(server.start());
    handle.wait_for(ServerState::Listening).await.unwrap();
    assert!(socket.exists());

    handle.stop();
    task.await.unwrap().unwrap();

    assert_eq!(handle.state(), ServerState::Stopped);
    assert!(!socket.exists());
    assert!(UnixStream::connect(&socket).await.is_err());
}

#[tokio::test]
async fn test_in_flight_connection_is_drained() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("test.sock");
    let file = dir.path().join("data.txt");
    let server = Server::new(ServerConfig::new(&socket, &file)).unwrap();
    let handle = server.handle();

    let task = tokio::spawn(server.start());
    handle.wait_for(ServerState::Listening).await.unwrap();

    // Start a request but leave the content unfinished
    let mut stream = UnixStream::connect(&socket).await.unwrap();
    stream.write_all(&[2, 0, 0, 0, 0, 0, 0, 5, b'H', b'e']).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.stop();
    handle.wait_for(ServerState::Stopping).await.unwrap();

    stream.write_all(b"llo").await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();

    assert_eq!(response, [0u8; 8]);
    task.await.unwrap().unwrap();
    assert_eq!(std::fs::read(&file).unwrap(), b"Hello");
}

#[tokio::test]
async fn test_stalled_connection_is_aborted_after_drain_timeout() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("test.sock");
    let config = ServerConfig::new(&socket, dir.path().join("data.txt"))
        .with_drain_timeout(Duration::from_millis(100));
    let server = Server::new(config).unwrap();
    let handle = server.handle();

    let task = tokio::spawn(server.start());
    handle.wait_for(ServerState::Listening).await.unwrap();

    let mut stream = UnixStream::connect(&socket).await.unwrap();
    stream.write_all(&[4, 0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.stop();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("server did not stop after the drain timeout")
        .unwrap()
        .unwrap();

    // Aborted handler dropped the connection without answering
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_connection_limit_queues_new_clients() {
    let dir = TempDir::new().unwrap();
    let socket = dir.path().join("test.sock");
    let config = ServerConfig::new(&socket, dir.path().join("data.txt")).with_max_connections(1);
    let server = Server::new(config).unwrap();
    let handle = server.handle();

    let task = tokio::spawn(server.start());
    handle.wait_for(ServerState::Listening).await.unwrap();

    // Occupy the only slot
    let mut first = UnixStream::connect(&socket).await.unwrap();
    first.write_all(&[4, 0, 0, 0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = tokio::spawn({
        let socket = socket.clone();
        async move { sockwrite::client::send_request(&socket, &Request::ping()).await }
    });
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.is_finished());

    // Finish the first request; the queued one is then served
    first.write_all(&[0, 0, 0, 0]).await.unwrap();
    let mut response = Vec::new();
    first.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, [0u8; 8]);

    let second = second.await.unwrap().unwrap();
    assert_eq!(second, Some(Response::ok()));

    handle.stop();
    task.await.unwrap().unwrap();
}
