//! TraceLayer span maker that keeps credentials out of request spans.

use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::request_log::redacted_url;

#[derive(Clone, Debug)]
pub struct RedactingMakeSpan;

impl<B> MakeSpan<B> for RedactingMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "http",
            method = %request.method(),
            uri = %redacted_url(request.uri()),
            version = ?request.version(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_span_does_not_panic_on_query() {
        let request = Request::builder()
            .uri("/auth?password=secret")
            .body(())
            .unwrap();
        let _span = RedactingMakeSpan.make_span(&request);
    }
}
