//! End-to-end tests for the cached pipeline: middleware chain composition
//! and a real TCP round trip through the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rescache::cache::{CacheConfig, ResponseCache, RouteOptions};
use rescache::middleware::{MiddlewareHandler, Next, RequestLog, from_handler, from_middleware};
use rescache::server::Server;
use rescache::{MemoryStore, Request, Response, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn cached_stack(cache: &ResponseCache, hits: Arc<AtomicUsize>) -> Vec<MiddlewareHandler> {
    vec![
        from_middleware(Arc::new(RequestLog)),
        from_middleware(Arc::new(cache.route(RouteOptions::new().expire(60)))),
        from_handler(move |_req| {
            let hits = Arc::clone(&hits);
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Response::new(StatusCode::Ok)
                    .header("Content-Type", "text/plain")
                    .body("fresh")
            }
        }),
    ]
}

async fn wait_for_record(store: &MemoryStore) {
    for _ in 0..200 {
        if !store.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("record never persisted");
}

#[tokio::test]
async fn chain_serves_second_request_from_store() {
    let store = MemoryStore::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let cache =
        ResponseCache::with_store(Arc::new(store.clone()), CacheConfig::new().prefix("it"));
    let stack = cached_stack(&cache, Arc::clone(&hits));

    let request = || Request::builder().uri("/pipeline").build();

    let first = Next::new(stack.clone()).run(request()).await;
    assert_eq!(first.status(), StatusCode::Ok);
    assert_eq!(&first.body_ref()[..], b"fresh");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    wait_for_record(&store).await;

    let second = Next::new(stack).run(request()).await;
    assert_eq!(second.status(), StatusCode::Ok);
    assert_eq!(&second.body_ref()[..], b"fresh");
    assert_eq!(second.content_type(), Some("text/plain"));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "hit must not run the handler");
}

#[tokio::test]
async fn server_round_trip_over_tcp() {
    let store = MemoryStore::new();
    let hits = Arc::new(AtomicUsize::new(0));
    let cache =
        ResponseCache::with_store(Arc::new(store.clone()), CacheConfig::new().prefix("it"));
    let stack = cached_stack(&cache, Arc::clone(&hits));

    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    tokio::spawn(async move {
        let _ = server
            .run(move |req| Next::new(stack.clone()).run(req))
            .await;
    });

    let first = http_get(addr, "/pipeline").await;
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"), "got: {first}");
    assert!(first.ends_with("fresh"));

    wait_for_record(&store).await;

    let second = http_get(addr, "/pipeline").await;
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.contains("Content-Type: text/plain"));
    assert!(second.ends_with("fresh"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}
