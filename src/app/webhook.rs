use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::blocking::{Client, multipart};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::app::local_ref::LocalRefs;
use crate::app::slots::{ImageFile, SlotRole};

pub const WEBHOOK_URL: &str = "https://n8nclinica.proasures.es/webhook/publi_imagen";
pub const WEBHOOK_URL_ENV: &str = "ANEXO_WEBHOOK_URL";

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(reqwest::StatusCode),
    #[error("could not build request: {0}")]
    Form(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("could not read body: {0}")]
    Body(String),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field `{0}` is not a string")]
    NotAString(&'static str),
    #[error("no image field in json reply")]
    NoCandidate,
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(Option<String>),
}

/// Everything sent to the webhook for one generation request.
#[derive(Clone, Debug)]
pub struct Submission {
    pub character: ImageFile,
    pub product: ImageFile,
    pub instructions: String,
    pub email: String,
    pub client_timestamp: DateTime<Utc>,
}

impl Submission {
    /// `client_timestamp` formatted like a browser's `toISOString`.
    pub fn timestamp_text(&self) -> String {
        self.client_timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn image(&self, role: SlotRole) -> &ImageFile {
        match role {
            SlotRole::Character => &self.character,
            SlotRole::Product => &self.product,
        }
    }

    fn to_form(&self) -> Result<multipart::Form, SubmitError> {
        let mut form = multipart::Form::new();
        for role in SlotRole::ALL {
            let file = self.image(role);
            let part = multipart::Part::bytes(file.bytes.to_vec())
                .file_name(file.name.clone())
                .mime_str(file.mime)
                .map_err(|e| SubmitError::Form(e.to_string()))?;
            form = form.part(role.field_name(), part);
        }
        Ok(form
            .text("instructions", self.instructions.clone())
            .text("email", self.email.clone())
            .text("client_timestamp", self.timestamp_text()))
    }
}

/// A 2xx answer from the webhook.
#[derive(Debug)]
pub struct WebhookReply {
    pub content_type: Option<String>,
    pub body: Result<Vec<u8>, ExtractError>,
}

impl WebhookReply {
    pub fn new(content_type: Option<&str>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.map(str::to_owned),
            body: Ok(body.into()),
        }
    }
}

pub trait Webhook: Send + Sync + 'static {
    fn post(&self, submission: &Submission) -> Result<WebhookReply, SubmitError>;
}

#[derive(Clone)]
pub struct WebhookClient {
    endpoint: String,
    client: Client,
}

impl WebhookClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SubmitError> {
        // generation jobs may run for minutes, keep waiting like a browser fetch
        let client = Client::builder().timeout(None::<Duration>).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Uses `ANEXO_WEBHOOK_URL` when set, the production webhook otherwise.
    pub fn from_env() -> Result<Self, SubmitError> {
        let endpoint = std::env::var(WEBHOOK_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| WEBHOOK_URL.to_owned());
        log::info!("webhook endpoint: {endpoint}");
        Self::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Plain GET, used to download a remote result.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>, SubmitError> {
        let response = self.client.get(url).send()?;
        if !response.status().is_success() {
            return Err(SubmitError::Status(response.status()));
        }
        Ok(response.bytes()?.to_vec())
    }
}

impl Webhook for WebhookClient {
    fn post(&self, submission: &Submission) -> Result<WebhookReply, SubmitError> {
        let form = submission.to_form()?;
        let response = self.client.post(&self.endpoint).multipart(form).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| ExtractError::Body(e.to_string()));
        Ok(WebhookReply { content_type, body })
    }
}

/// Image found in a webhook reply.
#[derive(Debug, PartialEq)]
pub enum ResultImage {
    /// Absolute url or data uri, used as is.
    Reference(String),
    /// Raw image body that still needs a local reference.
    Bytes(Vec<u8>),
}

impl ResultImage {
    /// Turns the image into something the result panel can show.
    pub fn into_reference(self, refs: &mut LocalRefs) -> String {
        match self {
            ResultImage::Reference(reference) => reference,
            ResultImage::Bytes(bytes) => refs.create(bytes).uri().to_owned(),
        }
    }
}

/// Candidate fields of a json reply. Declaration order is the lookup
/// priority and is part of the webhook contract.
#[derive(Deserialize)]
struct JsonReply {
    url: Option<Value>,
    #[serde(rename = "imageUrl")]
    image_url: Option<Value>,
    image: Option<Value>,
    output: Option<Value>,
    output_image: Option<Value>,
    data: Option<Value>,
}

impl JsonReply {
    fn first_present(self) -> Result<String, ExtractError> {
        let candidates = [
            ("url", self.url),
            ("imageUrl", self.image_url),
            ("image", self.image),
            ("output", self.output),
            ("output_image", self.output_image),
            ("data", self.data),
        ];
        for (name, value) in candidates {
            match value {
                None | Some(Value::Null) => continue,
                Some(Value::String(s)) if s.is_empty() => continue,
                Some(Value::String(s)) => return Ok(s),
                Some(_) => return Err(ExtractError::NotAString(name)),
            }
        }
        Err(ExtractError::NoCandidate)
    }
}

fn is_absolute_reference(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://") || value.starts_with("data:")
}

pub fn extract_result(reply: WebhookReply) -> Result<ResultImage, ExtractError> {
    let content_type = reply.content_type.as_deref().unwrap_or_default();
    if content_type.contains("application/json") {
        let body = reply.body?;
        let value = serde_json::from_slice::<JsonReply>(&body)?.first_present()?;
        if is_absolute_reference(&value) {
            Ok(ResultImage::Reference(value))
        } else {
            Ok(ResultImage::Reference(format!("data:image/png;base64,{value}")))
        }
    } else if content_type.starts_with("image/") {
        Ok(ResultImage::Bytes(reply.body?))
    } else {
        Err(ExtractError::UnsupportedContentType(reply.content_type.clone()))
    }
}

/// Payload bytes of a base64 data uri.
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    STANDARD.decode(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::mpsc;
    use tiny_http::{Header, Response, Server};

    fn json(body: &str) -> WebhookReply {
        WebhookReply::new(Some("application/json; charset=utf-8"), body)
    }

    fn submission() -> Submission {
        Submission {
            character: ImageFile::new("hero.png", vec![0x89u8, b'P', b'N', b'G']),
            product: ImageFile::new("can.jpg", vec![0xFFu8, 0xD8, 0xFF]),
            instructions: "en la playa".to_owned(),
            email: "user@example.com".to_owned(),
            client_timestamp: DateTime::parse_from_rfc3339("2026-10-18T12:30:00.250Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn json_url_is_used_verbatim() {
        let result = extract_result(json(r#"{"url": "https://x/y.png"}"#)).unwrap();
        assert_eq!(result, ResultImage::Reference("https://x/y.png".to_owned()));
    }

    #[test]
    fn json_base64_is_wrapped() {
        let result = extract_result(json(r#"{"image": "iVBORw0KGgo"}"#)).unwrap();
        assert_eq!(
            result,
            ResultImage::Reference("data:image/png;base64,iVBORw0KGgo".to_owned())
        );
    }

    #[test]
    fn json_data_uri_is_not_rewrapped() {
        let result = extract_result(json(r#"{"output": "data:image/jpeg;base64,AAAA"}"#)).unwrap();
        assert_eq!(
            result,
            ResultImage::Reference("data:image/jpeg;base64,AAAA".to_owned())
        );
    }

    #[test]
    fn json_candidates_follow_priority() {
        let body = r#"{"data": "ZGF0YQ==", "imageUrl": "https://b", "url": null, "image": "https://c"}"#;
        let result = extract_result(json(body)).unwrap();
        assert_eq!(result, ResultImage::Reference("https://b".to_owned()));

        let body = r#"{"url": "", "output_image": "https://d"}"#;
        let result = extract_result(json(body)).unwrap();
        assert_eq!(result, ResultImage::Reference("https://d".to_owned()));
    }

    #[test]
    fn json_without_candidates_or_with_objects_fails() {
        assert!(matches!(
            extract_result(json(r#"{"message": "ok"}"#)),
            Err(ExtractError::NoCandidate)
        ));
        assert!(matches!(
            extract_result(json(r#"{"url": {"href": "https://x"}}"#)),
            Err(ExtractError::NotAString("url"))
        ));
        assert!(matches!(
            extract_result(json("not json")),
            Err(ExtractError::Json(_))
        ));
    }

    #[test]
    fn image_body_is_kept_as_bytes() {
        let reply = WebhookReply::new(Some("image/png"), vec![1u8, 2, 3]);
        assert_eq!(extract_result(reply).unwrap(), ResultImage::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn other_content_types_are_unsupported() {
        let reply = WebhookReply::new(Some("text/plain"), "Workflow was started");
        assert!(matches!(
            extract_result(reply),
            Err(ExtractError::UnsupportedContentType(Some(_)))
        ));
        let reply = WebhookReply::new(None, "");
        assert!(matches!(
            extract_result(reply),
            Err(ExtractError::UnsupportedContentType(None))
        ));
    }

    #[test]
    fn bytes_become_local_reference() {
        let mut refs = LocalRefs::new();
        let uri = ResultImage::Bytes(vec![9u8]).into_reference(&mut refs);
        assert_eq!(refs.bytes(&uri).as_deref(), Some(&[9u8][..]));
    }

    #[test]
    fn decodes_base64_data_uris() {
        assert_eq!(
            decode_data_uri("data:image/png;base64,AQID"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(decode_data_uri("data:text/plain,hello"), None);
        assert_eq!(decode_data_uri("https://x/y.png"), None);
    }

    #[test]
    fn timestamp_matches_iso_string() {
        assert_eq!(submission().timestamp_text(), "2026-10-18T12:30:00.250Z");
    }

    fn serve_once(
        status: u16,
        content_type: &str,
        body: Vec<u8>,
    ) -> (String, mpsc::Receiver<(String, String)>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let (tx, rx) = mpsc::channel();
        let content_type = content_type.to_owned();
        std::thread::spawn(move || {
            if let Ok(mut request) = server.recv() {
                let header = request
                    .headers()
                    .iter()
                    .find(|h| h.field.equiv("Content-Type"))
                    .map(|h| h.value.to_string())
                    .unwrap_or_default();
                let mut received = String::new();
                let mut raw = Vec::new();
                request.as_reader().read_to_end(&mut raw).ok();
                received.push_str(&String::from_utf8_lossy(&raw));
                let response = Response::from_data(body)
                    .with_status_code(status)
                    .with_header(
                        format!("Content-Type: {content_type}")
                            .parse::<Header>()
                            .unwrap(),
                    );
                let _ = request.respond(response);
                let _ = tx.send((header, received));
            }
        });
        (format!("http://{addr}/webhook/publi_imagen"), rx)
    }

    #[test]
    fn posts_multipart_fields() {
        let body = br#"{"url":"https://x/y.png"}"#.to_vec();
        let (url, rx) = serve_once(200, "application/json", body);
        let client = WebhookClient::new(url).unwrap();

        let reply = client.post(&submission()).unwrap();
        assert_eq!(reply.content_type.as_deref(), Some("application/json"));

        let (content_type, body) = rx.recv().unwrap();
        assert!(content_type.starts_with("multipart/form-data"));
        for field in [
            "name=\"character_image\"; filename=\"hero.png\"",
            "name=\"product_image\"; filename=\"can.jpg\"",
            "name=\"instructions\"",
            "name=\"email\"",
            "name=\"client_timestamp\"",
        ] {
            assert!(body.contains(field), "missing {field} in {body}");
        }
        assert!(body.contains("en la playa"));
        assert!(body.contains("user@example.com"));
        assert!(body.contains("2026-10-18T12:30:00.250Z"));
        assert!(body.contains("Content-Type: image/jpeg"));
    }

    #[test]
    fn non_success_status_is_an_error() {
        let (url, _rx) = serve_once(500, "text/plain", b"boom".to_vec());
        let client = WebhookClient::new(url).unwrap();
        match client.post(&submission()) {
            Err(SubmitError::Status(status)) => assert_eq!(status.as_u16(), 500),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_endpoint_is_a_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = WebhookClient::new(format!("http://127.0.0.1:{port}/hook")).unwrap();
        assert!(matches!(
            client.post(&submission()),
            Err(SubmitError::Transport(_))
        ));
    }

    #[test]
    fn fetch_reads_remote_bytes() {
        let (url, _rx) = serve_once(200, "image/png", vec![4u8, 5, 6]);
        let client = WebhookClient::new("http://unused").unwrap();
        assert_eq!(client.fetch(&url).unwrap(), vec![4, 5, 6]);
    }
}
