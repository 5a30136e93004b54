//! Test doubles: a minimal HTTP/1.1 stub server and a recording notifier.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::notify::Notifier;

#[derive(Debug, Clone)]
pub struct StubResponse {
	pub status: u16,
	pub body: String,
}

impl StubResponse {
	pub fn json(status: u16, body: &str) -> Self {
		Self {
			status,
			body: body.to_string(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	/// Lowercased names.
	pub headers: Vec<(String, String)>,
	pub body: Vec<u8>,
}

impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}

	pub fn body_text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Serves canned responses in order, repeating the last one.
pub struct StubServer {
	pub url: String,
	requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
	pub async fn start(responses: Vec<StubResponse>) -> Self {
		assert!(!responses.is_empty(), "stub server needs at least one response");
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("http://{}", listener.local_addr().unwrap());
		let requests = Arc::new(Mutex::new(Vec::new()));

		let recorded = Arc::clone(&requests);
		tokio::spawn(async move {
			let mut served = 0usize;
			while let Ok((stream, _)) = listener.accept().await {
				let response = responses[served.min(responses.len() - 1)].clone();
				served += 1;
				handle(stream, &response, &recorded).await;
			}
		});

		Self { url, requests }
	}

	pub fn requests(&self) -> Vec<RecordedRequest> {
		self.requests.lock().clone()
	}
}

/// Reads one request, records it, then answers. Recording first means a
/// client that has its response always sees its request recorded.
async fn handle(stream: TcpStream, response: &StubResponse, recorded: &Mutex<Vec<RecordedRequest>>) -> Option<()> {
	let mut reader = BufReader::new(stream);

	let mut request_line = String::new();
	reader.read_line(&mut request_line).await.ok()?;
	let mut parts = request_line.split_whitespace();
	let method = parts.next()?.to_string();
	let path = parts.next()?.to_string();

	let mut headers = Vec::new();
	loop {
		let mut line = String::new();
		reader.read_line(&mut line).await.ok()?;
		let line = line.trim_end();
		if line.is_empty() {
			break;
		}
		if let Some((name, value)) = line.split_once(':') {
			headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
		}
	}

	let header = |name: &str| headers.iter().find(|(key, _)| key == name).map(|(_, v)| v.clone());
	let mut body = Vec::new();
	if let Some(length) = header("content-length").and_then(|v| v.parse::<usize>().ok()) {
		body.resize(length, 0);
		reader.read_exact(&mut body).await.ok()?;
	} else if header("transfer-encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked")) {
		loop {
			let mut size_line = String::new();
			reader.read_line(&mut size_line).await.ok()?;
			let size = usize::from_str_radix(size_line.trim(), 16).ok()?;
			let mut chunk = vec![0; size + 2];
			reader.read_exact(&mut chunk).await.ok()?;
			if size == 0 {
				break;
			}
			body.extend_from_slice(&chunk[..size]);
		}
	}

	recorded.lock().push(RecordedRequest {
		method,
		path,
		headers,
		body,
	});

	let reply = format!(
		"HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
		response.status,
		response.body.len(),
		response.body
	);
	let mut stream = reader.into_inner();
	stream.write_all(reply.as_bytes()).await.ok()?;
	let _ = stream.shutdown().await;
	Some(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
	Text(String),
	Photo(PathBuf, String),
}

/// Keeps every notification instead of delivering it.
#[derive(Default)]
pub struct RecordingNotifier {
	sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
	pub fn sent(&self) -> Vec<Sent> {
		self.sent.lock().clone()
	}
}

#[async_trait]
impl Notifier for RecordingNotifier {
	async fn send_text(&self, text: &str) -> anyhow::Result<()> {
		self.sent.lock().push(Sent::Text(text.to_string()));
		Ok(())
	}

	async fn send_photo(&self, image: &Path, caption: &str) -> anyhow::Result<()> {
		self.sent.lock().push(Sent::Photo(image.to_path_buf(), caption.to_string()));
		Ok(())
	}
}
