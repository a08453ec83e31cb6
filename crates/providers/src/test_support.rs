//! Single-shot mock endpoints for gateway tests.

use std::io::Read;
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

pub(crate) struct Captured {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Captured {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

pub(crate) struct MockEndpoint {
    pub url: String,
    rx: Receiver<Captured>,
}

impl MockEndpoint {
    pub fn captured(&self) -> Captured {
        self.rx
            .recv_timeout(Duration::from_secs(5))
            .expect("mock endpoint received no request")
    }

    pub fn nothing_received(&self) -> bool {
        self.rx.recv_timeout(Duration::from_millis(200)).is_err()
    }
}

/// Answer exactly one request with `status` and `body`, recording what came in.
pub(crate) fn serve_once(status: u16, content_type: &str, body: &str) -> MockEndpoint {
    let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
    let port = server.server_addr().to_ip().unwrap().port();
    let (tx, rx) = mpsc::channel();
    let content_type = content_type.to_string();
    let body = body.to_string();

    std::thread::spawn(move || {
        if let Ok(mut request) = server.recv() {
            let mut content = String::new();
            let _ = request.as_reader().read_to_string(&mut content);
            let headers = request
                .headers()
                .iter()
                .map(|h| (h.field.as_str().as_str().to_lowercase(), h.value.as_str().to_string()))
                .collect();
            let _ = tx.send(Captured {
                url: request.url().to_string(),
                headers,
                body: content,
            });

            let header =
                tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()).unwrap();
            let response = tiny_http::Response::from_string(body)
                .with_status_code(status)
                .with_header(header);
            let _ = request.respond(response);
        }
    });

    MockEndpoint {
        url: format!("http://127.0.0.1:{}", port),
        rx,
    }
}

/// An endpoint that accepts the connection and never answers.
pub(crate) fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        if let Ok((_stream, _)) = listener.accept() {
            std::thread::sleep(Duration::from_secs(5));
        }
    });
    format!("http://127.0.0.1:{}/silent", port)
}
