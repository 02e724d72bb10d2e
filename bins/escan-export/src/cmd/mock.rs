//! Scripted stand-in for the Eulerscan endpoint.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Answer to the `sub` request.
#[derive(Clone, Copy)]
pub(crate) enum Reply {
    /// Raw JSON text sent as the `result` field.
    Result(&'static str),
    /// Message sent as `err.message`.
    Error(&'static str),
    /// Result followed by a server close frame, flushed together.
    ResultThenClose(&'static str),
    Silent,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Seen {
    Text(Value),
    /// Whether the output file existed when the close frame arrived.
    Close { output_existed: bool },
}

pub(crate) struct MockServer {
    pub endpoint: String,
    task: JoinHandle<Vec<Seen>>,
}

impl MockServer {
    /// Serves a single connection.
    pub(crate) async fn spawn(reply: Reply, output: PathBuf) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let mut seen = Vec::new();
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Text(text) => {
                        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                        let answer = match (frame["cmd"].as_str(), reply) {
                            (Some("sub"), Reply::Result(raw) | Reply::ResultThenClose(raw)) => {
                                Some(format!(r#"{{"id":{},"result":{raw}}}"#, frame["id"]))
                            }
                            (Some("sub"), Reply::Error(message)) => Some(
                                json!({"id": frame["id"], "err": {"message": message}}).to_string(),
                            ),
                            _ => None,
                        };
                        seen.push(Seen::Text(frame));
                        match (answer, reply) {
                            (Some(answer), Reply::ResultThenClose(_)) => {
                                let _ = ws.feed(Message::Text(answer.into())).await;
                                let _ = ws.close(None).await;
                            }
                            (Some(answer), _) => {
                                let _ = ws.send(Message::Text(answer.into())).await;
                            }
                            (None, _) => {}
                        }
                    }
                    Message::Close(_) => seen.push(Seen::Close {
                        output_existed: output.exists(),
                    }),
                    _ => {}
                }
            }
            seen
        });

        Self { endpoint, task }
    }

    /// Everything the server received, once the connection is gone.
    pub(crate) async fn seen(self) -> Vec<Seen> {
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("mock connection still open")
            .expect("mock server panicked")
    }
}
