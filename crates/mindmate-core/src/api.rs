//! HTTP access to the MindMate backend.

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, OnceLock};

use crate::audio::AudioClip;
use crate::error::ApiError;
use crate::mode::ChatMode;
use crate::state::HistoryEntry;

const SESSION_COOKIE: &str = "session_id";

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    chat_type: ChatMode,
}

#[derive(Deserialize)]
struct ChatResponse {
    response: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize, Default)]
struct TranscriptionBody {
    text: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Outcome of a transcription request that reached the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    Text(String),
    /// The server could not transcribe and said why
    Error(String),
}

/// What opening a session on the backend yields
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub session_id: Option<String>,
    pub history: Vec<HistoryEntry>,
}

/// The three endpoints the conversation depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `POST /chat`, returning the assistant's reply
    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ApiError>;

    /// `POST /speech_to_text` with the clip as multipart field `audio`
    async fn speech_to_text(&self, clip: AudioClip) -> Result<Transcription, ApiError>;

    /// `POST /text_to_speech`, returning playable audio bytes
    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ApiError>;
}

pub struct MindMateApi {
    client: Client,
    base_url: String,
    session_id: Mutex<Option<String>>,
}

impl MindMateApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: Mutex::new(None),
        }
    }

    pub fn with_session(base_url: &str, session_id: Option<String>) -> Self {
        let api = Self::new(base_url);
        api.set_session_id(session_id);
        api
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    fn set_session_id(&self, session_id: Option<String>) {
        if let Ok(mut current) = self.session_id.lock() {
            *current = session_id;
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(self.url(path));
        match self.session_id() {
            Some(id) => request.header(COOKIE, format!("{SESSION_COOKIE}={id}")),
            None => request,
        }
    }

    /// Load the start page: picks up the session cookie the server issues and the
    /// conversation history embedded in the page.
    pub async fn open_session(&self) -> Result<Session, ApiError> {
        let mut request = self.client.get(self.url("/"));
        if let Some(id) = self.session_id() {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={id}"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                status: response.status().as_u16(),
                error: None,
            });
        }

        let issued = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(session_id_from_set_cookie);
        if let Some(id) = issued {
            self.set_session_id(Some(id));
        }

        let page = response.text().await?;
        let history = parse_initial_history(&page);
        tracing::info!(
            session = ?self.session_id(),
            history = history.len(),
            "opened session"
        );

        Ok(Session {
            session_id: self.session_id(),
            history,
        })
    }
}

#[async_trait]
impl Backend for MindMateApi {
    async fn chat(&self, message: &str, mode: ChatMode) -> Result<String, ApiError> {
        let request = ChatRequest {
            message,
            chat_type: mode,
        };

        let response = self.post("/chat").json(&request).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response.response)
    }

    async fn speech_to_text(&self, clip: AudioClip) -> Result<Transcription, ApiError> {
        let part = reqwest::multipart::Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(clip.mime_type)
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self.post("/speech_to_text").multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        // Failures still carry `{error}`, so the body decides before the status does
        let parsed: TranscriptionBody = serde_json::from_slice(&body).unwrap_or_default();
        match (parsed.text, parsed.error) {
            (Some(text), _) => Ok(Transcription::Text(text)),
            (None, Some(error)) => Ok(Transcription::Error(error)),
            (None, None) if !status.is_success() => Err(ApiError::Status {
                status: status.as_u16(),
                error: None,
            }),
            (None, None) => Err(ApiError::Decode(
                "transcription response had neither text nor error".to_string(),
            )),
        }
    }

    async fn text_to_speech(&self, text: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .post("/text_to_speech")
            .json(&SpeechRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        Ok(response.bytes().await?.to_vec())
    }
}

async fn status_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let error = response
        .bytes()
        .await
        .ok()
        .and_then(|body| error_field(&body));
    ApiError::Status { status, error }
}

/// `error` field of a JSON body, if there is one
pub fn error_field(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body).ok()?.error
}

/// Extract the session id from one `Set-Cookie` header value
pub fn session_id_from_set_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let value = value.trim().trim_matches('"');
    (name.trim() == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
}

/// Find the `initialHistory` array the start page declares and decode it.
/// Anything missing or malformed yields an empty history.
pub fn parse_initial_history(page: &str) -> Vec<HistoryEntry> {
    static DECLARATION: OnceLock<Regex> = OnceLock::new();
    let declaration = DECLARATION.get_or_init(|| {
        Regex::new(r"\binitialHistory\s*=\s*\[").expect("valid history regex")
    });

    let Some(found) = declaration.find(page) else {
        return Vec::new();
    };
    // Start at the opening bracket and decode exactly one JSON value
    let array_start = found.end() - 1;
    let mut values =
        serde_json::Deserializer::from_str(&page[array_start..]).into_iter::<Vec<HistoryEntry>>();

    match values.next() {
        Some(Ok(history)) => history,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "could not decode initialHistory");
            Vec::new()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::HistoryRole;

    #[test]
    fn test_session_cookie_parsing() {
        assert_eq!(
            session_id_from_set_cookie("session_id=3f2a-11; Path=/"),
            Some("3f2a-11".to_string())
        );
        assert_eq!(
            session_id_from_set_cookie("session_id=\"quoted\""),
            Some("quoted".to_string())
        );
        assert_eq!(session_id_from_set_cookie("other=1; Path=/"), None);
        assert_eq!(session_id_from_set_cookie("session_id=; Path=/"), None);
        assert_eq!(session_id_from_set_cookie("garbage"), None);
    }

    #[test]
    fn test_parse_initial_history_from_page() {
        let page = r#"<html><script>
            const initialHistory = [{"role": "user", "text": "hi"}, {"role": "model", "text": "a ]; tricky reply"}];
            const other = [1, 2];
        </script></html>"#;

        let history = parse_initial_history(page);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, HistoryRole::User);
        assert_eq!(history[0].text, "hi");
        assert_eq!(history[1].role, HistoryRole::Model);
        assert_eq!(history[1].text, "a ]; tricky reply");
    }

    #[test]
    fn test_parse_initial_history_empty_or_missing() {
        assert!(parse_initial_history("<script>var initialHistory = [];</script>").is_empty());
        assert!(parse_initial_history("<html>no history here</html>").is_empty());
        assert!(parse_initial_history("initialHistory = [{\"role\": \"robot\"}]").is_empty());
    }

    #[test]
    fn test_error_field() {
        assert_eq!(
            error_field(br#"{"error": "No text provided"}"#),
            Some("No text provided".to_string())
        );
        assert_eq!(error_field(br#"{"response": "fallback"}"#), None);
        assert_eq!(error_field(b"\xff\xfb mp3 bytes"), None);
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = MindMateApi::new("http://localhost:5000/");
        assert_eq!(api.base_url(), "http://localhost:5000");
        assert_eq!(api.url("/chat"), "http://localhost:5000/chat");
    }

    #[test]
    fn test_with_session_keeps_id() {
        let api = MindMateApi::with_session("http://localhost:5000", Some("abc".to_string()));
        assert_eq!(api.session_id(), Some("abc".to_string()));
    }
    /// A request as the stub server received it
    struct Captured {
        head: String,
        body: Vec<u8>,
    }

    impl Captured {
        fn header(&self, name: &str) -> Option<String> {
            self.head.lines().skip(1).find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim().eq_ignore_ascii_case(name).then(|| value.trim().to_string())
            })
        }

        fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }
    }

    /// Serve one canned response on a local port and hand back the request
    async fn serve_once(
        status: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> (String, tokio::task::JoinHandle<Captured>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let mut response = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        let mut response = response.into_bytes();
        response.extend_from_slice(body);

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            let head_end = loop {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
            let length = head
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    key.trim().eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            while raw.len() < head_end + length {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before body");
                raw.extend_from_slice(&buf[..n]);
            }

            stream.write_all(&response).await.unwrap();
            stream.shutdown().await.unwrap();
            Captured { head, body: raw[head_end..head_end + length].to_vec() }
        });

        (base_url, handle)
    }

    const JSON: (&str, &str) = ("Content-Type", "application/json");

    #[tokio::test]
    async fn test_chat_posts_message_mode_and_cookie() {
        let (url, server) = serve_once("200 OK", &[JSON], br#"{"response": "Let's study."}"#).await;
        let api = MindMateApi::with_session(&url, Some("abc-123".to_string()));

        let reply = api.chat("explain recursion", ChatMode::StudyBuddy).await.unwrap();
        assert_eq!(reply, "Let's study.");

        let request = server.await.unwrap();
        assert!(request.head.starts_with("POST /chat "));
        assert_eq!(request.header("cookie").as_deref(), Some("session_id=abc-123"));
        assert_eq!(
            request.json(),
            serde_json::json!({"message": "explain recursion", "chat_type": "study_buddy"})
        );
    }

    #[tokio::test]
    async fn test_chat_server_error_is_status() {
        let (url, server) =
            serve_once("500 Internal Server Error", &[JSON], br#"{"error": "model unavailable"}"#).await;
        let api = MindMateApi::new(&url);

        match api.chat("hello", ChatMode::MentalHealth).await {
            Err(ApiError::Status { status, error }) => {
                assert_eq!(status, 500);
                assert_eq!(error.as_deref(), Some("model unavailable"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let request = server.await.unwrap();
        assert_eq!(request.header("cookie"), None);
    }

    #[tokio::test]
    async fn test_chat_connection_refused_is_transport() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = MindMateApi::new(&url).chat("hello", ChatMode::MentalHealth).await;
        assert!(matches!(result, Err(ApiError::Transport(_))));
    }

    #[tokio::test]
    async fn test_speech_to_text_uploads_webm_part() {
        let (url, server) = serve_once("200 OK", &[JSON], br#"{"text": "I feel calm"}"#).await;
        let api = MindMateApi::with_session(&url, Some("s1".to_string()));

        let clip = AudioClip::from_chunks(vec![b"webm-".to_vec(), b"bytes".to_vec()]);
        let result = api.speech_to_text(clip).await.unwrap();
        assert_eq!(result, Transcription::Text("I feel calm".to_string()));

        let request = server.await.unwrap();
        assert!(request.head.starts_with("POST /speech_to_text "));
        assert_eq!(request.header("cookie").as_deref(), Some("session_id=s1"));
        assert!(request
            .header("content-type")
            .is_some_and(|v| v.starts_with("multipart/form-data")));

        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains(r#"name="audio""#));
        assert!(body.contains(r#"filename="audio.webm""#));
        assert!(body.contains("audio/webm"));
        assert!(body.contains("webm-bytes"));
    }

    #[tokio::test]
    async fn test_speech_to_text_error_body_on_failure_status() {
        let (url, _server) =
            serve_once("400 Bad Request", &[JSON], br#"{"error": "Could not understand audio"}"#).await;

        let result = MindMateApi::new(&url)
            .speech_to_text(AudioClip::from_chunks(Vec::new()))
            .await
            .unwrap();
        assert_eq!(result, Transcription::Error("Could not understand audio".to_string()));
    }

    #[tokio::test]
    async fn test_speech_to_text_failure_without_body_is_status() {
        let (url, _server) = serve_once("502 Bad Gateway", &[], b"").await;

        let result = MindMateApi::new(&url)
            .speech_to_text(AudioClip::from_chunks(Vec::new()))
            .await;
        assert!(matches!(result, Err(ApiError::Status { status: 502, error: None })));
    }

    #[tokio::test]
    async fn test_text_to_speech_returns_audio_bytes() {
        let (url, server) = serve_once("200 OK", &[("Content-Type", "audio/mpeg")], b"ID3\x03mp3").await;

        let audio = MindMateApi::new(&url).text_to_speech("Breathe in").await.unwrap();
        assert_eq!(audio, b"ID3\x03mp3".to_vec());

        let request = server.await.unwrap();
        assert!(request.head.starts_with("POST /text_to_speech "));
        assert_eq!(request.json(), serde_json::json!({"text": "Breathe in"}));
    }

    #[tokio::test]
    async fn test_text_to_speech_error_field_is_extracted() {
        let (url, _server) = serve_once(
            "500 Internal Server Error",
            &[JSON],
            br#"{"error": "Failed to convert text to speech."}"#,
        )
        .await;

        match MindMateApi::new(&url).text_to_speech("hi").await {
            Err(ApiError::Status { status, error }) => {
                assert_eq!(status, 500);
                assert_eq!(error.as_deref(), Some("Failed to convert text to speech."));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_session_takes_cookie_and_history() {
        let page = br#"<html><script>const initialHistory = [{"role": "model", "text": "Welcome back"}];</script></html>"#;
        let (url, server) = serve_once(
            "200 OK",
            &[("Content-Type", "text/html"), ("Set-Cookie", "session_id=fresh-id; Path=/")],
            page,
        )
        .await;
        let api = MindMateApi::new(&url);

        let session = api.open_session().await.unwrap();
        assert_eq!(session.session_id.as_deref(), Some("fresh-id"));
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history[0].text, "Welcome back");
        assert_eq!(api.session_id().as_deref(), Some("fresh-id"));

        let request = server.await.unwrap();
        assert!(request.head.starts_with("GET / "));
    }
}
