use std::time::Duration;

use kenflow_backend::{
    Backend, Error, HttpBackend,
    api::{MessageInput, Settings},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

/// Serve exactly one HTTP exchange; the handle yields the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.expect("accept");
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = sock.read(&mut chunk).await.expect("read");
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let need = text[..split]
                    .lines()
                    .find_map(|l| {
                        let lower = l.to_ascii_lowercase();
                        lower
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                    })
                    .unwrap_or(0);
                if buf.len() >= split + 4 + need {
                    break;
                }
            }
        }
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(reply.as_bytes()).await.expect("write");
        sock.shutdown().await.ok();
        String::from_utf8_lossy(&buf).to_string()
    });
    (format!("http://{addr}/api"), handle)
}

fn client(base: &str) -> HttpBackend {
    HttpBackend::new(base, Duration::from_secs(2)).expect("client")
}

#[tokio::test]
async fn settings_are_decoded() {
    let (base, server) =
        serve_once("200 OK", r#"{"enter_enabled":"false","target_windows":"[\"Chat\"]"}"#).await;
    let settings = client(&base).settings().await.expect("settings");
    assert!(!settings.enter_enabled());
    assert_eq!(settings.target_windows(), vec!["Chat"]);
    let request = server.await.expect("server");
    assert!(request.starts_with("GET /api/settings "), "{request}");
}

#[tokio::test]
async fn create_message_posts_json_and_returns_id() {
    let (base, server) = serve_once("200 OK", r#"{"id":7,"success":true}"#).await;
    let input = MessageInput {
        name: "Hello".into(),
        templates: vec!["hi there".into()],
        trigger_key: Some("ctrl+1".into()),
        icon: None,
    };
    let id = client(&base).create_message(&input).await.expect("create");
    assert_eq!(id, 7);
    let request = server.await.expect("server");
    assert!(request.starts_with("POST /api/messages "));
    assert!(request.contains(r#""trigger_key":"ctrl+1""#), "{request}");
}

#[tokio::test]
async fn unsuccessful_reply_is_a_status_error() {
    let (base, server) = serve_once("200 OK", r#"{"success":false,"error":"no window"}"#).await;
    let err = client(&base).send_message(3).await.expect_err("failed");
    match err {
        Error::Status { message, .. } => assert_eq!(message, "no window"),
        other => panic!("unexpected {other:?}"),
    }
    server.await.expect("server");
}

#[tokio::test]
async fn settings_patch_is_posted() {
    let (base, server) = serve_once("200 OK", r#"{"success":true}"#).await;
    client(&base)
        .update_settings(&Settings::enter_patch(true))
        .await
        .expect("update");
    let request = server.await.expect("server");
    assert!(request.contains(r#"{"enter_enabled":"true"}"#), "{request}");
}

#[tokio::test]
async fn closed_port_is_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let err = client(&format!("http://{addr}/api"))
        .listener_status()
        .await
        .expect_err("nothing listening");
    assert!(err.is_unreachable(), "{err:?}");
}
