//! Content negotiation middleware
//!
//! Lets the inner chain run, then re-serializes any [`Envelope`] response
//! into the representation the client's `Accept` header prefers. Responses
//! without an envelope pass through untouched. A 406 keeps the inner
//! response's headers, so cookies set further in still reach the client.

use axum::{
    body::Body,
    http::{
        header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderValue, Request,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::domain::Envelope;
use crate::negotiate::{negotiate, render};

/// `Accept` header of a request, if readable
pub fn accept_header<B>(request: &Request<B>) -> Option<String> {
    request
        .headers()
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Content negotiation middleware function
pub async fn negotiate_middleware(request: Request<Body>, next: Next) -> Response {
    let accept = accept_header(&request);
    let mut response = next.run(request).await;

    let Some(envelope) = response.extensions_mut().remove::<Envelope>() else {
        return response;
    };

    let rendered = negotiate(accept.as_deref())
        .and_then(|representation| Ok((representation, render(representation, &envelope)?)));

    match rendered {
        Ok((representation, bytes)) => {
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(CONTENT_LENGTH);
            parts.headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_static(representation.content_type()),
            );
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            tracing::debug!(accept = ?accept, "No acceptable representation");
            let (mut parts, _) = response.into_parts();
            parts.headers.remove(CONTENT_LENGTH);
            parts.headers.remove(CONTENT_TYPE);

            let mut rejection = err.into_response();
            rejection.headers_mut().extend(parts.headers);
            rejection
        }
    }
}
