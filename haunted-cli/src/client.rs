use anyhow::{anyhow, bail, Context, Result};
use futures_util::StreamExt;
use haunted_core::models::{LogEvent, Room, RoomSnapshot};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Thin client for the `haunted serve` HTTP API.
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn create_room(&self, owner_id: &str, input: &str) -> Result<Room> {
        let response = self
            .http
            .post(self.url("/api/rooms"))
            .json(&json!({ "owner_id": owner_id, "input": input }))
            .send()
            .await
            .with_context(|| format!("Could not reach {}", self.base_url))?;
        decode(response).await
    }

    pub async fn get_room(&self, room_id: &str) -> Result<RoomSnapshot> {
        self.get(&format!("/api/rooms/{}", room_id)).await
    }

    pub async fn list_rooms(&self, owner_id: &str) -> Result<Vec<Room>> {
        self.get(&format!("/api/users/{}/rooms", owner_id)).await
    }

    pub async fn start_room(&self, room_id: &str) -> Result<Value> {
        self.post(&format!("/api/rooms/{}/start", room_id)).await
    }

    pub async fn cancel_room(&self, room_id: &str) -> Result<Room> {
        self.post(&format!("/api/rooms/{}/cancel", room_id)).await
    }

    /// Follows the room's Server-Sent Events stream, calling `on_event` for
    /// each Log Event until the server ends the stream.
    pub async fn follow_logs<F>(&self, room_id: &str, mut on_event: F) -> Result<usize>
    where
        F: FnMut(&LogEvent),
    {
        let response = self
            .http
            .get(self.url(&format!("/api/rooms/{}/logs", room_id)))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Could not reach {}", self.base_url))?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let mut stream = response.bytes_stream();
        let mut frames = FrameBuffer::default();
        let mut seen = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Log stream interrupted")?;
            for event in frames.push(&chunk)? {
                on_event(&event);
                seen += 1;
            }
        }

        Ok(seen)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("Could not reach {}", self.base_url))?;
        decode(response).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .send()
            .await
            .with_context(|| format!("Could not reach {}", self.base_url))?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    response
        .json()
        .await
        .context("Server returned an unexpected response")
}

async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    match body.get("error").and_then(|e| e.as_str()) {
        Some(message) => anyhow!("{} ({})", message, status),
        None => anyhow!("Server responded with {}", status),
    }
}

/// Accumulates raw stream bytes and yields complete SSE frames. Frames are
/// only decoded once their terminating blank line has arrived, so characters
/// split across network chunks stay intact.
#[derive(Default)]
struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<LogEvent>> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let frame: Vec<u8> = self.pending.drain(..end + 2).collect();
            let frame = std::str::from_utf8(&frame).context("Log stream is not valid UTF-8")?;
            if let Some(event) = parse_frame(frame)? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

/// Joins the `data:` lines of one SSE frame. Comment-only frames (keep-alives)
/// yield `None`.
fn parse_frame(frame: &str) -> Result<Option<LogEvent>> {
    let data: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();

    if data.is_empty() {
        return Ok(None);
    }

    let event = serde_json::from_str(&data.join("\n"));
    match event {
        Ok(event) => Ok(Some(event)),
        Err(e) => bail!("Malformed log event from server: {}", e),
    }
}
