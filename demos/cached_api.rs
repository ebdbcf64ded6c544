//! A small JSON API with cached routes.
//!
//! Run with a local Redis (or set `REDIS_HOST`/`REDIS_PORT`/`REDIS_PASS`):
//!
//! ```text
//! RUST_LOG=debug cargo run --example cached_api
//! ```
//!
//! `GET /slow` takes half a second the first time and is instant for the next
//! 30 seconds. Without a reachable Redis the server still works — every
//! request just runs the handler.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rescache::cache::{CacheConfig, ResponseCache, RouteOptions};
use rescache::middleware::{Next, RequestLog, from_handler, from_middleware};
use rescache::server::Server;
use rescache::{Method, Request, Response, StatusCode};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cache = ResponseCache::connect(CacheConfig::new().prefix("demo")).await;

    let stack = vec![
        from_middleware(Arc::new(RequestLog)),
        from_middleware(Arc::new(cache.route(RouteOptions::new().expire(30)))),
        from_handler(handle),
    ];

    let server = Server::bind("127.0.0.1:8080").await?;
    println!("demo listening on http://{}", server.local_addr());
    server
        .run(move |req| Next::new(stack.clone()).run(req))
        .await?;
    Ok(())
}

async fn handle(req: Request) -> Response {
    match (req.method(), req.path()) {
        (Method::Get, "/slow") => {
            tokio::time::sleep(Duration::from_millis(500)).await;
            json_response(json!({ "answer": 42 }))
        }
        (Method::Get, "/time") => {
            let unix_millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            json_response(json!({ "unix_millis": unix_millis }))
        }
        (Method::Post, "/echo") => match req.json::<serde_json::Value>() {
            Ok(value) => json_response(value),
            Err(_) => Response::new(StatusCode::BadRequest).body("expected a JSON body"),
        },
        _ => Response::new(StatusCode::NotFound).body("not found"),
    }
}

fn json_response(value: serde_json::Value) -> Response {
    Response::new(StatusCode::Ok)
        .header("Content-Type", "application/json")
        .body(value.to_string())
}
