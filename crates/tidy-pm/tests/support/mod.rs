//! Shared helpers for integration tests
//!
//! A minimal in-process HTTP registry backed by a `TcpListener`, plus a
//! gzipped-tarball builder for store and extraction tests.

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

/// Response payload for one fixture route.
#[derive(Clone)]
pub enum Route {
    Json(String),
    Bytes(Vec<u8>),
}

/// In-process registry serving canned responses.
///
/// Every connection is answered and closed; unknown paths return a 404
/// with a JSON error body, matching registry behavior.
pub struct Registry {
    addr: String,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl Registry {
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture addr").to_string();
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::new(Mutex::new(HashMap::new()));
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let routes = routes.clone();
            let hits = hits.clone();
            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { continue };
                    let routes = routes.clone();
                    let hits = hits.clone();
                    std::thread::spawn(move || serve(stream, &routes, &hits));
                }
            });
        }

        Self { addr, routes, hits }
    }

    /// Base URL of the fixture.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn add_json(&self, path: &str, body: String) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Json(body));
    }

    pub fn add_bytes(&self, path: &str, body: Vec<u8>) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route::Bytes(body));
    }

    /// Register a manifest for `name` at version tag `tag`.
    pub fn add_manifest(
        &self,
        name: &str,
        tag: &str,
        version: &str,
        deps: &[(&str, &str)],
        tarball_url: &str,
    ) {
        let body = manifest_json(name, version, deps, tarball_url);
        self.add_json(&format!("/{}/{}", name, tag), body);
    }

    /// Paths requested so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }

    /// How many times `path` was requested.
    pub fn hit_count(&self, path: &str) -> usize {
        self.hits
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().len()
    }
}

fn serve(stream: TcpStream, routes: &Mutex<HashMap<String, Route>>, hits: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }

    let path = match request_line.split_whitespace().nth(1) {
        Some(path) => path.to_string(),
        None => return,
    };

    // Drain headers.
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
            Err(_) => return,
        }
    }

    hits.lock().unwrap().push(path.clone());

    let route = routes.lock().unwrap().get(&path).cloned();
    let mut stream = reader.into_inner();

    let (status, content_type, body): (&str, &str, Vec<u8>) = match route {
        Some(Route::Json(json)) => ("200 OK", "application/json", json.into_bytes()),
        Some(Route::Bytes(bytes)) => ("200 OK", "application/octet-stream", bytes),
        None => (
            "404 Not Found",
            "application/json",
            br#"{"error":"Not found"}"#.to_vec(),
        ),
    };

    let header = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Registry-manifest JSON for one package version.
pub fn manifest_json(
    name: &str,
    version: &str,
    deps: &[(&str, &str)],
    tarball_url: &str,
) -> String {
    let deps_json: Vec<String> = deps
        .iter()
        .map(|(dep, range)| format!(r#""{}": "{}""#, dep, range))
        .collect();

    format!(
        r#"{{
            "name": "{}",
            "version": "{}",
            "dist": {{"tarball": "{}", "shasum": "", "size": 0}},
            "dependencies": {{{}}}
        }}"#,
        name,
        version,
        tarball_url,
        deps_json.join(", ")
    )
}

/// Build a gzipped tarball from `(path, content)` pairs.
///
/// Paths containing `..` are written straight into the header name field
/// so escape-defense tests can craft entries a well-behaved builder would
/// refuse.
pub fn make_tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);

        if path.contains("..") {
            let name = &mut header.as_gnu_mut().expect("gnu header").name;
            name[..path.len()].copy_from_slice(path.as_bytes());
            header.set_cksum();
            builder
                .append(&header, content.as_bytes())
                .expect("append raw tarball entry");
        } else {
            header.set_cksum();
            builder
                .append_data(&mut header, path, content.as_bytes())
                .expect("append tarball entry");
        }
    }

    builder
        .into_inner()
        .expect("finish tarball")
        .finish()
        .expect("finish gzip")
}

/// A tarball laid out like a registry package: entries under `package/`.
pub fn package_tarball(name: &str, version: &str, extra: &[(&str, &str)]) -> Vec<u8> {
    let manifest = format!(r#"{{"name": "{}", "version": "{}"}}"#, name, version);
    let manifest_path = "package/package.json".to_string();

    let mut files: Vec<(&str, &str)> = vec![(manifest_path.as_str(), manifest.as_str())];
    files.extend_from_slice(extra);
    make_tarball(&files)
}
