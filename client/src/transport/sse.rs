use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Request;
use hyper::body::Body;
use hyper::header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use futures_util::future::BoxFuture;
use shared::types::client_config::PushConfig;
use shared::types::sse::SseDecoder;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::{FrameStream, Link, LinkState, Transport};

/// HTTP/1 client shared by the push transport and the REST API. Every
/// request this crate makes is bodiless.
pub type HttpClient = Client<HttpConnector, Empty<Bytes>>;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Server-sent-events push transport.
///
/// Subscribes with a `GET` carrying the bearer token as a header and parses
/// the response body into frames for as long as it stays open.
#[derive(Clone)]
pub struct SseTransport {
    client: HttpClient,
    url: String,
    heartbeat_timeout: Duration,
}

impl SseTransport {
    pub fn new(url: impl Into<String>, heartbeat_timeout: Duration) -> Self {
        Self::with_client(http_client(), url, heartbeat_timeout)
    }

    pub fn with_client(client: HttpClient, url: impl Into<String>, heartbeat_timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            heartbeat_timeout,
        }
    }

    pub fn from_config(config: &PushConfig) -> Self {
        Self::new(config.subscribe_url(), config.heartbeat_timeout())
    }

    async fn open(&self, token: &str) -> Result<Link, TransportError> {
        let request = Request::get(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .body(Empty::<Bytes>::new())?;

        debug!("Opening SSE link: {}", self.url);
        let response = self.client.request(request).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        info!("SSE link open: {}", self.url);
        let state = LinkState::open();
        let frames = frame_stream(response.into_body(), state.clone(), self.heartbeat_timeout);

        Ok(Link { frames, state })
    }
}

impl Transport for SseTransport {
    fn connect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Link, TransportError>> {
        Box::pin(self.open(token))
    }
}

/// Turn a streaming response body into decoded frames. Silence longer than
/// `heartbeat_timeout` ends the stream with an error, as does a line the
/// decoder refuses to buffer.
fn frame_stream<B>(body: B, state: LinkState, heartbeat_timeout: Duration) -> FrameStream
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        loop {
            match tokio::time::timeout(heartbeat_timeout, body.frame()).await {
                Ok(Some(Ok(frame))) => {
                    let Ok(chunk) = frame.into_data() else { continue };
                    match decoder.feed(&chunk) {
                        Ok(frames) => {
                            for sse in frames {
                                yield Ok(sse);
                            }
                        }
                        Err(e) => {
                            warn!("Dropping SSE link: {}", e);
                            state.mark_closed();
                            yield Err(TransportError::Stream(e));
                            break;
                        }
                    }
                }
                Ok(Some(Err(e))) => {
                    state.mark_closed();
                    yield Err(TransportError::Body(e));
                    break;
                }
                Ok(None) => {
                    debug!("SSE body ended");
                    break;
                }
                Err(_) => {
                    state.mark_closed();
                    yield Err(TransportError::HeartbeatTimeout(heartbeat_timeout));
                    break;
                }
            }
        }

        state.mark_closed();
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use http_body_util::StreamBody;
    use hyper::body::Frame;
    use shared::types::sse::{DEFAULT_MAX_LINE, SseError};

    use super::*;

    fn body(chunks: Vec<Vec<u8>>) -> impl Body<Data = Bytes, Error = hyper::Error> + Send + 'static {
        StreamBody::new(futures_util::stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, hyper::Error>(Frame::data(Bytes::from(c)))),
        ))
    }

    #[tokio::test]
    async fn frames_are_decoded_until_the_body_ends() {
        let state = LinkState::open();
        let chunks = vec![
            b"event: notification\nda".to_vec(),
            b"ta: {}\n\n: keep-alive\n\n".to_vec(),
        ];
        let mut frames = frame_stream(body(chunks), state.clone(), Duration::from_secs(5));

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(first.event, "notification");
        assert!(frames.next().await.is_none());
        assert!(!state.is_open());
    }

    #[tokio::test]
    async fn endless_line_ends_the_link() {
        let state = LinkState::open();
        let flood = vec![b'x'; DEFAULT_MAX_LINE / 2];
        let chunks = vec![b"data: ".to_vec(), flood.clone(), flood.clone(), flood];
        let mut frames = frame_stream(body(chunks), state.clone(), Duration::from_secs(5));

        match frames.next().await {
            Some(Err(TransportError::Stream(SseError::LineTooLong { limit }))) => {
                assert_eq!(limit, DEFAULT_MAX_LINE);
            }
            other => panic!("expected an overflow, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(!state.is_open());
        assert!(frames.next().await.is_none());
    }
}
