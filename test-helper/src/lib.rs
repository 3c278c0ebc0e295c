use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Response, Server, StatusCode};
use tokio::task::JoinHandle;

/// Gets a new socket address allocated by the OS.
pub fn get_unused_addr() -> SocketAddr {
    let socket = TcpListener::bind("127.0.0.1:0").unwrap();
    socket.local_addr().unwrap()
}

/// A HTTP server answering every request with the same canned response.
pub struct FixtureServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl FixtureServer {
    /// Starts serving `body` with the given status code on an unused address.
    pub fn serve(status: u16, body: impl Into<String>) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        let body = body.into();
        let hits = Arc::new(AtomicUsize::new(0));

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let counter = hits.clone();
        let make_svc = make_service_fn(move |_conn| {
            let body = body.clone();
            let counter = counter.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |_req| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let response = Response::builder()
                        .status(status)
                        .body(Body::from(body.clone()))
                        .unwrap();
                    async move { Ok::<_, Infallible>(response) }
                }))
            }
        });

        let server = Server::from_tcp(listener).unwrap().serve(make_svc);
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });

        Self { addr, hits, handle }
    }

    /// The URL of the given path on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// The number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_unused_addr() {
        let addr = get_unused_addr();
        TcpListener::bind(addr).expect("Connect to allocated address");
    }

    #[tokio::test]
    async fn test_fixture_server() {
        let server = FixtureServer::serve(200, "hello");
        let resp = hyper::Client::new()
            .get(server.url("/").parse().unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(server.hits(), 1);
    }
}
