//! End-to-end tests against a real in-process WebSocket backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

use tether_client::{Client, ClientError, ClientHooks, ConnectionState};
use tether_core::{Frame, FrameKind, codec};
use tether_settings::ClientSettings;

const TIMEOUT: Duration = Duration::from_secs(5);

type ServerWs = WebSocketStream<TcpStream>;

async fn bind() -> (TcpListener, String) {
    tether_logging::init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

fn test_settings(addr: &str) -> ClientSettings {
    let mut settings = ClientSettings::default();
    settings.connection.address = addr.to_owned();
    settings.connection.auto_connect = true;
    settings.connection.reconnect_enabled = false;
    settings.connection.reconnect_delay_ms = 100;
    settings.rpc.sweep_interval_ms = 20;
    settings
}

fn parse_text(message: &Message) -> Frame {
    match message {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text message, got {other:?}"),
    }
}

async fn send_frame(socket: &mut ServerWs, frame: &Frame) {
    let text = serde_json::to_string(frame).unwrap();
    socket.send(Message::Text(text.into())).await.unwrap();
}

async fn wait_for_state(client: &Client, state: ConnectionState) {
    let mut rx = client.watch_state();
    let _ = timeout(TIMEOUT, rx.wait_for(|s| *s == state))
        .await
        .unwrap()
        .unwrap();
}

/// Serve queries with `{"echo": <name>}` responses until the socket ends.
async fn echo_queries(mut socket: ServerWs) {
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            let frame: Frame = serde_json::from_str(text.as_str()).unwrap();
            if frame.kind == Some(FrameKind::Query) {
                let id = frame.id.unwrap();
                let name = frame.name.unwrap();
                send_frame(&mut socket, &Frame::response(id, json!({"echo": name}))).await;
            }
        }
    }
}

// ── Connection and RPC ──────────────────────────────────────────────

#[tokio::test]
async fn connect_and_query_roundtrip() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        echo_queries(socket).await;
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let payload = timeout(
        TIMEOUT,
        client.send_query("getStatus", vec![json!("zone-a")], None),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(payload["echo"], "getStatus");
    assert_eq!(client.pending_calls(), 0);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn sequential_queries_correlate_independently() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        echo_queries(socket).await;
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    for name in ["first", "second", "third"] {
        let payload = timeout(TIMEOUT, client.send_query(name, vec![], None))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload["echo"], name);
    }

    drop(client);
    server.abort();
}

#[tokio::test]
async fn query_timeout_then_late_response_is_dropped() {
    let (listener, addr) = bind().await;
    let (id_tx, mut id_rx) = mpsc::unbounded_channel::<String>();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        // capture the first query's id but never answer it
        let first = socket.next().await.unwrap().unwrap();
        let frame = parse_text(&first);
        id_tx.send(frame.id.unwrap()).unwrap();

        // second query arrives after the first timed out; answer the
        // stale id first, then the live one
        let second = socket.next().await.unwrap().unwrap();
        let live = parse_text(&second).id.unwrap();
        let stale = id_rx.recv().await.unwrap();
        send_frame(&mut socket, &Frame::response(stale, json!("too late"))).await;
        send_frame(&mut socket, &Frame::response(live, json!("on time"))).await;

        // keep the socket open until the client goes away
        while socket.next().await.is_some() {}
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let err = timeout(
        TIMEOUT,
        client.send_query("slow", vec![], Some(Duration::from_millis(200))),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(err, ClientError::CallTimeout));
    assert_eq!(client.pending_calls(), 0);

    // a later call with a different id still succeeds, even though the
    // stale response arrives before the live one
    let payload = timeout(
        TIMEOUT,
        client.send_query("fast", vec![], Some(Duration::from_secs(2))),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(payload, "on time");

    drop(client);
    server.abort();
}

#[tokio::test]
async fn connection_loss_flushes_all_pending_calls() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        // swallow three queries, then drop the transport
        for _ in 0..3 {
            let _ = socket.next().await.unwrap().unwrap();
        }
        drop(socket);
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let (r1, r2, r3) = timeout(
        TIMEOUT,
        async {
            tokio::join!(
                client.send_query("a", vec![], None),
                client.send_query("b", vec![], None),
                client.send_query("c", vec![], Some(Duration::from_secs(60))),
            )
        },
    )
    .await
    .unwrap();

    for result in [r1, r2, r3] {
        assert!(matches!(result.unwrap_err(), ClientError::ConnectionLost));
    }
    assert_eq!(client.pending_calls(), 0);

    drop(client);
    server.abort();
}

// ── Event, command, and stream dispatch ─────────────────────────────

#[tokio::test]
async fn event_dispatch_matches_bare_and_scoped_keys() {
    let (listener, addr) = bind().await;
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        ready_rx.await.unwrap();
        send_frame(
            &mut socket,
            &Frame::event("temp", Some("sensor1"), vec![json!(21.5)]),
        )
        .await;
        send_frame(
            &mut socket,
            &Frame::event("temp", Some("sensor2"), vec![json!(19.0)]),
        )
        .await;
        echo_queries(socket).await;
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let bare = Arc::new(AtomicUsize::new(0));
    let scoped = Arc::new(AtomicUsize::new(0));
    {
        let bare = bare.clone();
        client.add_event_handler(
            "temp",
            None,
            Arc::new(move |_, _| {
                let _ = bare.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }
    {
        let scoped = scoped.clone();
        client.add_event_handler(
            "temp",
            Some("sensor1"),
            Arc::new(move |_, _| {
                let _ = scoped.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }
    ready_tx.send(()).unwrap();

    // frames dispatch in arrival order, so a query roundtrip after the
    // events proves both were processed
    let _ = timeout(TIMEOUT, client.send_query("sync", vec![], None))
        .await
        .unwrap()
        .unwrap();

    // sensor1 event hit both handlers, sensor2 only the bare one
    assert_eq!(bare.load(Ordering::SeqCst), 2);
    assert_eq!(scoped.load(Ordering::SeqCst), 1);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn command_dispatch_by_exact_name() {
    let (listener, addr) = bind().await;
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        ready_rx.await.unwrap();
        send_frame(&mut socket, &Frame::command("refresh", vec![json!("panel")])).await;
        echo_queries(socket).await;
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let (args_tx, mut args_rx) = mpsc::unbounded_channel::<Vec<Value>>();
    client.add_command_handler(
        "refresh",
        Arc::new(move |args| {
            args_tx.send(args.to_vec()).unwrap();
        }),
    );
    ready_tx.send(()).unwrap();

    let args = timeout(TIMEOUT, args_rx.recv()).await.unwrap().unwrap();
    assert_eq!(args, vec![json!("panel")]);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn binary_stream_dispatch_exact_and_wildcard() {
    let (listener, addr) = bind().await;
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        ready_rx.await.unwrap();
        let data = codec::encode(&Frame::stream("cam1", "frame"), b"jpeg-bytes").unwrap();
        socket.send(Message::Binary(data)).await.unwrap();
        echo_queries(socket).await;
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    let (blob_tx, mut blob_rx) = mpsc::unbounded_channel::<(String, String, Vec<u8>)>();
    {
        let blob_tx = blob_tx.clone();
        client.add_stream_handler(
            "cam1",
            &["frame"],
            Arc::new(move |id, event, blob| {
                blob_tx
                    .send((id.to_owned(), event.to_owned(), blob.to_vec()))
                    .unwrap();
            }),
        );
    }
    client.add_stream_handler(
        "cam1",
        &[],
        Arc::new(move |id, event, blob| {
            blob_tx
                .send((id.to_owned(), event.to_owned(), blob.to_vec()))
                .unwrap();
        }),
    );
    ready_tx.send(()).unwrap();

    for _ in 0..2 {
        let (id, event, blob) = timeout(TIMEOUT, blob_rx.recv()).await.unwrap().unwrap();
        assert_eq!(id, "cam1");
        assert_eq!(event, "frame");
        assert_eq!(blob, b"jpeg-bytes");
    }

    drop(client);
    server.abort();
}

#[tokio::test]
async fn outbound_event_and_stream_reach_backend() {
    let (listener, addr) = bind().await;
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Message>();
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        while let Some(Ok(message)) = socket.next().await {
            seen_tx.send(message).unwrap();
        }
    });

    let client = Client::new(test_settings(&addr));
    wait_for_state(&client, ConnectionState::Open).await;

    client
        .trigger_event("panelReady", Some("dash1"), vec![json!(true)])
        .unwrap();
    client.stream_data("mic1", "chunk", b"\x01\x02\x03").unwrap();

    let first = timeout(TIMEOUT, seen_rx.recv()).await.unwrap().unwrap();
    let frame = parse_text(&first);
    assert_eq!(frame.kind, Some(FrameKind::Event));
    assert_eq!(frame.name.as_deref(), Some("panelReady"));
    assert_eq!(frame.id.as_deref(), Some("dash1"));

    let second = timeout(TIMEOUT, seen_rx.recv()).await.unwrap().unwrap();
    match second {
        Message::Binary(data) => {
            let (header, blob) = codec::decode(&data).unwrap();
            assert_eq!(header.stream_id.as_deref(), Some("mic1"));
            assert_eq!(header.stream_event.as_deref(), Some("chunk"));
            assert_eq!(&blob[..], &[1, 2, 3]);
        }
        other => panic!("expected binary message, got {other:?}"),
    }

    drop(client);
    server.abort();
}

// ── Reconnection ────────────────────────────────────────────────────

#[tokio::test]
async fn reconnect_after_drop_clears_subscriptions() {
    let (listener, addr) = bind().await;
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        // first connection: accept then drop immediately after the
        // client registers its handler
        let socket = accept(&listener).await;
        ready_rx.await.unwrap();
        drop(socket);

        // second connection: push the event the old handler listened to
        let mut socket = accept(&listener).await;
        send_frame(&mut socket, &Frame::event("temp", None, vec![json!(20)])).await;
        echo_queries(socket).await;
    });

    let mut settings = test_settings(&addr);
    settings.connection.reconnect_enabled = true;
    let client = Client::new(settings);
    wait_for_state(&client, ConnectionState::Open).await;

    let fired = Arc::new(AtomicUsize::new(0));
    {
        let fired = fired.clone();
        client.add_event_handler(
            "temp",
            None,
            Arc::new(move |_, _| {
                let _ = fired.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }
    ready_tx.send(()).unwrap();

    // transport drops, then the fixed-delay retry reconnects
    wait_for_state(&client, ConnectionState::Disconnected).await;
    wait_for_state(&client, ConnectionState::Open).await;

    // roundtrip to make sure the pushed event was processed
    let _ = timeout(TIMEOUT, client.send_query("sync", vec![], None))
        .await
        .unwrap()
        .unwrap();

    // the handler from the previous connection must not fire again
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn close_hook_fires_with_reason_and_open_hook_on_reconnect() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        drop(socket);
        let socket = accept(&listener).await;
        echo_queries(socket).await;
    });

    let opens = Arc::new(AtomicUsize::new(0));
    let closes = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let opens = opens.clone();
        let closes = closes.clone();
        ClientHooks::new()
            .with_on_open(move || {
                let _ = opens.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_close(move |_reason| {
                let _ = closes.fetch_add(1, Ordering::SeqCst);
            })
    };

    let mut settings = test_settings(&addr);
    settings.connection.reconnect_enabled = true;
    let client = Client::with_hooks(settings, hooks);

    wait_for_state(&client, ConnectionState::Open).await;
    wait_for_state(&client, ConnectionState::Disconnected).await;
    wait_for_state(&client, ConnectionState::Open).await;

    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn disconnect_stops_reconnecting() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        echo_queries(socket).await;
    });

    let mut settings = test_settings(&addr);
    settings.connection.reconnect_enabled = true;
    let client = Client::new(settings);
    wait_for_state(&client, ConnectionState::Open).await;

    client.disconnect();
    wait_for_state(&client, ConnectionState::Closed).await;

    // no reconnect attempt follows an explicit disconnect
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send_command("ping", vec![]).unwrap_err(),
        ClientError::NotConnected
    ));

    drop(client);
    server.abort();
}

// ── Authentication ──────────────────────────────────────────────────

/// Serve authenticate queries: `secret` is the only valid password.
async fn auth_backend(mut socket: ServerWs) {
    while let Some(Ok(message)) = socket.next().await {
        if let Message::Text(text) = message {
            let frame: Frame = serde_json::from_str(text.as_str()).unwrap();
            if frame.kind != Some(FrameKind::Query) {
                continue;
            }
            let id = frame.id.unwrap();
            let args = frame.args.unwrap_or_default();
            let payload = if frame.name.as_deref() == Some("authenticate") {
                if args.get(1).and_then(Value::as_str) == Some("secret") {
                    json!({"authenticated": true, "sessionId": "sess-1"})
                } else {
                    json!({"authenticated": false, "message": "bad password"})
                }
            } else {
                json!({"ok": true})
            };
            send_frame(&mut socket, &Frame::response(id, payload)).await;
        }
    }
}

#[tokio::test]
async fn authenticate_success_sets_session_and_state() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        auth_backend(socket).await;
    });

    let authenticated = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let authenticated = authenticated.clone();
        let started = started.clone();
        ClientHooks::new()
            .with_on_authenticate(move || {
                let _ = authenticated.fetch_add(1, Ordering::SeqCst);
            })
            .with_on_authenticate_start(move || {
                let _ = started.fetch_add(1, Ordering::SeqCst);
            })
    };
    let client = Client::with_hooks(test_settings(&addr), hooks);
    wait_for_state(&client, ConnectionState::Open).await;

    timeout(TIMEOUT, client.authenticate("operator", "secret"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(client.state(), ConnectionState::Authenticated);
    assert_eq!(client.session_id().as_deref(), Some("sess-1"));
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(authenticated.load(Ordering::SeqCst), 1);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn authenticate_failure_stays_open_anonymous() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        auth_backend(socket).await;
    });

    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<String>();
    let hooks = ClientHooks::new().with_on_authenticate_failed(move |message| {
        failed_tx.send(message.to_owned()).unwrap();
    });
    let client = Client::with_hooks(test_settings(&addr), hooks);
    wait_for_state(&client, ConnectionState::Open).await;

    let err = timeout(TIMEOUT, client.authenticate("operator", "wrong"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed { .. }));

    // rejected credentials leave the connection open, anonymous
    assert_eq!(client.state(), ConnectionState::Open);
    assert!(client.session_id().is_none());
    let message = timeout(TIMEOUT, failed_rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, "bad password");

    // the connection is still usable
    let payload = timeout(TIMEOUT, client.send_query("status", vec![], None))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["ok"], true);

    drop(client);
    server.abort();
}

#[tokio::test]
async fn logoff_returns_to_open() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let socket = accept(&listener).await;
        auth_backend(socket).await;
    });

    let logged_off = Arc::new(AtomicUsize::new(0));
    let hooks = {
        let logged_off = logged_off.clone();
        ClientHooks::new().with_on_log_off(move || {
            let _ = logged_off.fetch_add(1, Ordering::SeqCst);
        })
    };
    let client = Client::with_hooks(test_settings(&addr), hooks);
    wait_for_state(&client, ConnectionState::Open).await;

    timeout(TIMEOUT, client.authenticate("operator", "secret"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Authenticated);

    client.logoff().unwrap();
    assert_eq!(client.state(), ConnectionState::Open);
    assert!(client.session_id().is_none());
    assert_eq!(logged_off.load(Ordering::SeqCst), 1);

    drop(client);
    server.abort();
}

// ── Telemetry ───────────────────────────────────────────────────────

#[tokio::test]
async fn mps_hook_reports_inbound_rate() {
    let (listener, addr) = bind().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener).await;
        for n in 0..5 {
            send_frame(&mut socket, &Frame::event("tick", None, vec![json!(n)])).await;
        }
        while socket.next().await.is_some() {}
    });

    let (rate_tx, mut rate_rx) = mpsc::unbounded_channel::<u64>();
    let hooks = ClientHooks::new().with_on_mps(move |rate| {
        if rate > 0 {
            let _ = rate_tx.send(rate);
        }
    });
    let client = Client::with_hooks(test_settings(&addr), hooks);
    wait_for_state(&client, ConnectionState::Open).await;

    let rate = timeout(TIMEOUT, rate_rx.recv()).await.unwrap().unwrap();
    assert!(rate > 0);
    assert!(rate <= 5);

    drop(client);
    server.abort();
}
