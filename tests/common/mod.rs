//! Shared fixtures: a mockito server wrapper and scripted provider doubles.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use mockito::{Matcher, Mock, Server, ServerGuard};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use verse_gateway::drivers::{ProviderClient, TextStream};
use verse_gateway::{Error, GenerationRequest, Result};

/// Test fixture that manages a mock server
pub struct MockServerFixture {
    pub server: Arc<AsyncMutex<ServerGuard>>,
    pub base_url: String,
}

impl MockServerFixture {
    pub async fn new() -> Self {
        let server = Server::new_async().await;
        let base_url = server.url();
        Self {
            server: Arc::new(AsyncMutex::new(server)),
            base_url,
        }
    }

    /// Successful SSE response built from `data:` payloads.
    pub async fn mock_sse_stream<P: Into<Matcher>>(&self, path: P, chunks: Vec<&str>) -> Mock {
        let mut server = self.server.lock().await;
        let body = chunks
            .iter()
            .map(|chunk| {
                if chunk.starts_with("data: ") {
                    format!("{}\n\n", chunk)
                } else {
                    format!("data: {}\n\n", chunk)
                }
            })
            .collect::<Vec<_>>()
            .join("");

        server
            .mock("POST", path)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }

    pub async fn mock_json_response<P: Into<Matcher>>(
        &self,
        path: P,
        status: u16,
        body: &str,
    ) -> Mock {
        let mut server = self.server.lock().await;
        server
            .mock("POST", path)
            .with_status(status.into())
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await
    }
}

/// SSE payload for one OpenAI-style text delta.
pub fn chat_delta(text: &str) -> String {
    serde_json::json!({"choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
}

/// What a scripted model does when called.
#[derive(Clone)]
pub enum Script {
    /// Stream these chunks.
    Chunks(Vec<&'static str>),
    /// Fail when opening the stream with an HTTP status.
    OpenError(u16, &'static str),
    /// Open fine, then fail on the first poll (in-stream throttling).
    FirstChunkError(u16, &'static str),
    /// Open fine, then end without any text.
    Empty,
    /// Never produce anything.
    Hang,
    /// Yield one chunk, then stall.
    FirstThenHang(&'static str),
}

/// In-process [`ProviderClient`] that follows a script per model id and records calls.
pub struct ScriptedProvider {
    name: &'static str,
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(mut self, model: &str, script: Script) -> Self {
        self.scripts.insert(model.to_string(), script);
        self
    }

    /// Model ids in call order.
    pub fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.candidate.id.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn remote(&self, status: u16, message: &str) -> Error {
        Error::Remote {
            provider: self.name.to_string(),
            status,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn stream_text(&self, request: &GenerationRequest) -> Result<TextStream> {
        self.calls.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .get(&request.candidate.id)
            .cloned()
            .unwrap_or(Script::OpenError(404, "No endpoints found"));

        match script {
            Script::Chunks(chunks) => Ok(boxed(stream::iter(
                chunks.into_iter().map(|c| Ok(c.to_string())),
            ))),
            Script::OpenError(status, message) => Err(self.remote(status, message)),
            Script::FirstChunkError(status, message) => {
                let err = self.remote(status, message);
                Ok(boxed(stream::once(async move { Err(err) })))
            }
            Script::Empty => Ok(boxed(stream::empty())),
            Script::Hang => Ok(boxed(stream::pending())),
            Script::FirstThenHang(chunk) => Ok(boxed(
                stream::once(async move { Ok(chunk.to_string()) }).chain(stream::pending()),
            )),
        }
    }
}

fn boxed<S>(s: S) -> TextStream
where
    S: Stream<Item = Result<String>> + Send + 'static,
{
    Box::pin(s)
}
