//! HTTP front end
//!
//! Blocking microserver with a thread-per-connection accept loop. Three
//! routes: the static entry page, static assets under /files/, and the
//! /api search endpoint. The selected retrieval backend is shared
//! read-only across connection threads; any per-request failure is
//! rendered as a JSON error for that request and the loop keeps serving.

mod microserver;
mod static_files;

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::config::Config;
use crate::embed::EmbedClient;
use crate::search::{self, PhraseHit, PhraseSearcher, SearchParams};

use microserver::{HttpRequest, HttpResponse};

/// `GET /api` response body
#[derive(Serialize)]
struct ApiResponse {
    ret: Vec<PhraseHit>,
    /// Wall-clock milliseconds for embed + search, integer-truncated
    time: u64,
}

/// State shared across connection threads
pub struct ServerState {
    config: Config,
    searcher: Box<dyn PhraseSearcher>,
    embedder: EmbedClient,
}

impl ServerState {
    pub fn new(config: Config, searcher: Box<dyn PhraseSearcher>, embedder: EmbedClient) -> Self {
        Self {
            config,
            searcher,
            embedder,
        }
    }
}

/// Consistent JSON error response
fn json_error(status: u16, message: &str) -> HttpResponse {
    HttpResponse::json(status, &serde_json::json!({"error": message}))
}

/// The demo front end is served cross-origin
fn with_cors(response: HttpResponse) -> HttpResponse {
    response.with_header("Access-Control-Allow-Origin", "*")
}

/// Route request to handler
fn route_request(request: &HttpRequest, state: &ServerState) -> HttpResponse {
    let response = if request.method != "GET" {
        json_error(405, "Method not allowed")
    } else if request.path == "/" {
        serve_static(state, "index.html")
    } else if request.path == "/api" {
        handle_api(request, state)
    } else if let Some(rest) = request.path.strip_prefix("/files/") {
        serve_static(state, &format!("files/{}", rest))
    } else {
        json_error(404, "Not found")
    };
    with_cors(response)
}

fn serve_static(state: &ServerState, rel: &str) -> HttpResponse {
    match static_files::load(&state.config.static_dir, rel) {
        Some((data, content_type)) => HttpResponse::bytes(200, content_type, data),
        None => json_error(404, "Not found"),
    }
}

/// Handle GET /api?query=<text>
fn handle_api(request: &HttpRequest, state: &ServerState) -> HttpResponse {
    let Some(query) = request.param("query") else {
        return json_error(400, "Missing 'query' parameter");
    };

    let started = Instant::now();
    match search_query(state, query) {
        Ok(hits) => {
            let time = started.elapsed().as_millis() as u64;
            println!("query={:?} hits={} time={}ms", query, hits.len(), time);
            HttpResponse::json(200, &ApiResponse { ret: hits, time })
        }
        Err(e) => {
            eprintln!("Search failed for {:?}: {:#}", query, e);
            json_error(500, &format!("Search failed: {:#}", e))
        }
    }
}

/// Embed the query, search the backend, return the first row's hits
fn search_query(state: &ServerState, query: &str) -> Result<Vec<PhraseHit>> {
    let embedding = state.embedder.fetch(query)?;
    let params = SearchParams {
        top_k: state.config.top_k,
        nprobe: state.config.nprobe,
    };
    let mut rows = state
        .searcher
        .search(&embedding.vecs, &[query], &params)
        .context("Backend search failed")?;

    if rows.is_empty() {
        bail!("Backend returned no result rows");
    }
    Ok(rows.swap_remove(0))
}

fn handle_connection(stream: &mut (impl Read + Write), state: &ServerState) {
    let request = match microserver::read_request(stream) {
        Some(Ok(request)) => request,
        Some(Err(message)) => {
            microserver::write_response(stream, &with_cors(json_error(400, &message)));
            return;
        }
        None => return,
    };

    let response = route_request(&request, state);
    microserver::write_response(stream, &response);
}

/// Build the backend and serve until terminated
pub fn run(config: Config) -> Result<()> {
    let searcher = search::build_searcher(&config)?;
    let embedder = EmbedClient::new(config.api_port);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    println!("🚀 Phrase demo server starting...");
    println!("   Backend: {}", searcher.name());
    println!("   Listening on http://0.0.0.0:{}", config.port);
    println!(
        "   Embedding service: http://localhost:{}/api",
        config.api_port
    );
    println!("   Press Ctrl+C to stop\n");

    let state = Arc::new(ServerState::new(config, searcher, embedder));
    serve_on(listener, state)
}

/// Accept loop - one thread per connection
pub fn serve_on(listener: TcpListener, state: Arc<ServerState>) -> ! {
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    handle_connection(&mut stream, &state);
                    let _ = stream.shutdown(Shutdown::Write);
                });
            }
            Err(e) => eprintln!("TCP accept error: {}", e),
        }
    }
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_shape() {
        let resp = json_error(400, "Missing 'query' parameter");
        assert_eq!(resp.status, 400);

        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Missing 'query' parameter");
    }

    #[test]
    fn test_with_cors_adds_wildcard_origin() {
        let resp = with_cors(json_error(404, "Not found"));
        assert!(resp
            .headers
            .iter()
            .any(|(k, v)| k == "Access-Control-Allow-Origin" && v == "*"));
    }

    #[test]
    fn test_api_response_serializes_ret_and_time() {
        let response = ApiResponse {
            ret: vec![],
            time: 42,
        };
        let value = serde_json::to_value(&response).unwrap();

        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert!(object.contains_key("ret"));
        assert_eq!(object["time"], 42);
    }
}
