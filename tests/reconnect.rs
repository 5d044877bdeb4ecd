use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use gachabot::config::Config;
use gachabot::gacha::rarity::Rarity;
use gachabot::gacha::GachaBot;
use gachabot::storage::{Card, Storage};
use gachabot::twitch::TwitchError;

fn local_config(dir: &str, port: u16) -> Config {
    let mut cfg = Config::default();
    cfg.bot.token = "oauth:test".into();
    cfg.bot.channel = "testchannel".into();
    cfg.storage.data_dir = dir.to_string();
    cfg.overlay.enabled = false;
    cfg.twitch.server = "127.0.0.1".into();
    cfg.twitch.port = port;
    cfg.twitch.reconnect_delay_ms = 10;
    cfg
}

/// Accept one client and consume its login lines up to JOIN.
async fn accept_login(listener: &TcpListener) -> BufReader<TcpStream> {
    let (sock, _) = listener.accept().await.unwrap();
    let mut conn = BufReader::new(sock);
    let mut line = String::new();
    loop {
        line.clear();
        assert!(conn.read_line(&mut line).await.unwrap() > 0, "client hung up during login");
        if line.starts_with("JOIN ") { break; }
    }
    conn
}

async fn seeded_bot(dir: &str, port: u16) -> GachaBot {
    let storage = Storage::new(dir).await.unwrap();
    storage
        .save_cards(&[Card { id: "c1".into(), name: "Slime".into(), rarity: Rarity::Common, image_url: None }])
        .await
        .unwrap();
    let mut bot = GachaBot::new(local_config(dir, port)).await.unwrap();
    bot.connect().await.unwrap();
    bot
}

#[tokio::test]
async fn reconnect_request_opens_a_new_session() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap().to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut first = accept_login(&listener).await;
        first.get_mut().write_all(b":tmi.twitch.tv RECONNECT\r\n").await.unwrap();

        let mut second = accept_login(&listener).await;
        second
            .get_mut()
            .write_all(b"@user-id=77;display-name=Eve :eve!eve@eve.tmi.twitch.tv PRIVMSG #testchannel :hello again\r\n")
            .await
            .unwrap();
        (first, second)
    });

    let mut bot = seeded_bot(&dir, port).await;

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let watch_dir = dir.clone();
    let watcher = tokio::spawn(async move {
        let storage = Storage::new(&watch_dir).await.unwrap();
        for _ in 0..200 {
            if !storage.read_history().await.unwrap().is_empty() { break; }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        let _ = tx.send(());
    });

    tokio::time::timeout(Duration::from_secs(10), bot.run_until(async move { let _ = rx.await; }))
        .await
        .expect("run loop did not stop")
        .unwrap();
    watcher.await.unwrap();
    let _sessions = server.await.unwrap();

    let history = Storage::new(&dir).await.unwrap().read_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].user_id, "77");
    assert_eq!(history[0].display_name, "Eve");
}

#[tokio::test]
async fn closed_connection_is_reopened() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap().to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        drop(accept_login(&listener).await);
        accept_login(&listener).await
    });

    let mut bot = seeded_bot(&dir, port).await;
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let stopper = tokio::spawn(async move {
        let second = server.await.unwrap();
        let _ = tx.send(());
        second
    });

    tokio::time::timeout(Duration::from_secs(10), bot.run_until(async move { let _ = rx.await; }))
        .await
        .expect("bot never reconnected")
        .unwrap();
    stopper.await.unwrap();
}

#[tokio::test]
async fn rejected_token_stops_the_bot() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().to_str().unwrap().to_string();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let mut conn = accept_login(&listener).await;
        conn.get_mut()
            .write_all(b":tmi.twitch.tv NOTICE * :Login authentication failed\r\n")
            .await
            .unwrap();
        conn
    });

    let mut bot = seeded_bot(&dir, port).await;
    let err = tokio::time::timeout(Duration::from_secs(10), bot.run_until(std::future::pending::<()>()))
        .await
        .expect("auth failure did not end the run loop")
        .unwrap_err();
    assert_eq!(err.downcast_ref::<TwitchError>(), Some(&TwitchError::AuthFailed));
    let _conn = server.await.unwrap();
}
