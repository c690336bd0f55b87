//! Purpose: Loopback HTTP stub standing in for the catalog service in tests.
//! Exports: `StubServer`, `Captured`.
//! Role: Serve canned responses in order and record what each request sent.
//! Invariants: Every response closes its connection; bound to 127.0.0.1 only.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug)]
pub struct Captured {
    pub method: String,
    pub target: String,
    pub content_type: Option<String>,
    pub body: String,
}

pub struct StubServer {
    pub base_url: String,
    requests: Receiver<Captured>,
    handle: Option<JoinHandle<()>>,
}

impl StubServer {
    /// Answer one request per `(status, body)` entry, then stop accepting.
    pub fn start(responses: Vec<(u16, String)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                stream
                    .set_read_timeout(Some(Duration::from_secs(5)))
                    .expect("read timeout");
                let mut reader = BufReader::new(stream);
                let captured = read_request(&mut reader);
                let mut stream = reader.into_inner();
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
                if tx.send(captured).is_err() {
                    return;
                }
            }
        });
        Self {
            base_url: format!("http://{addr}/r"),
            requests: rx,
            handle: Some(handle),
        }
    }

    pub fn next_request(&self) -> Captured {
        self.requests
            .recv_timeout(Duration::from_secs(5))
            .expect("stub saw a request")
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        // Only join when every canned response was consumed; otherwise accept() would block.
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

fn read_request(reader: &mut impl BufRead) -> Captured {
    let mut line = String::new();
    reader.read_line(&mut line).expect("request line");
    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut content_type = None;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).expect("header line");
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).expect("request body");
    Captured {
        method,
        target,
        content_type,
        body: String::from_utf8(body).expect("utf8 body"),
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        _ => "Status",
    }
}
