//! Single-host reverse proxy forwarding for each upstream origin.

use std::fmt;
use std::net::SocketAddr;

use axum::body::{Body, HttpBody};
use axum::extract::ConnectInfo;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use reqwest::redirect::Policy;
use reqwest::Url;

use super::router::Origin;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug)]
pub enum ProxyError {
    /// Upstream unreachable, DNS failure, connection reset.
    Upstream { origin: Origin, message: String },
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Upstream { origin, message } => {
                write!(f, "Upstream {} failed: {}", origin, message)
            }
        }
    }
}

impl std::error::Error for ProxyError {}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = match self {
            ProxyError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

/// Base URLs of the three origins plus the shared outbound client.
#[derive(Clone)]
pub struct Upstreams {
    monolith: Url,
    movies_service: Url,
    events_service: Url,
    client: reqwest::Client,
}

impl Upstreams {
    pub fn new(
        monolith: Url,
        movies_service: Url,
        events_service: Url,
    ) -> Result<Self, reqwest::Error> {
        // 3xx responses belong to the caller, not to the proxy.
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            monolith,
            movies_service,
            events_service,
            client,
        })
    }

    pub fn base_url(&self, origin: Origin) -> &Url {
        match origin {
            Origin::Monolith => &self.monolith,
            Origin::MoviesService => &self.movies_service,
            Origin::EventsService => &self.events_service,
        }
    }

    /// Forward a request to `origin`, streaming both bodies through.
    pub async fn forward(&self, origin: Origin, req: Request<Body>) -> Result<Response, ProxyError> {
        let (parts, body) = req.into_parts();

        let target = upstream_url(
            self.base_url(origin),
            parts.uri.path(),
            parts.uri.query(),
        );

        let mut headers = strip_hop_by_hop(&parts.headers);
        headers.remove(header::HOST);
        if let Some(ConnectInfo(client_addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            append_forwarded_for(&mut headers, *client_addr);
        }

        let mut request = self.client.request(parts.method, target).headers(headers);
        if !body.is_end_stream() {
            request = request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = request
            .send()
            .await
            .map_err(|e| ProxyError::Upstream {
                origin,
                message: e.to_string(),
            })?;

        let status = upstream.status();
        let response_headers = strip_hop_by_hop(upstream.headers());

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// Join the upstream base with the request path and query, the way a single
/// host reverse proxy does: one slash between base path and request path,
/// base query first.
pub fn upstream_url(base: &Url, path: &str, query: Option<&str>) -> Url {
    let mut url = base.clone();

    let base_path = base.path();
    let joined = match (base_path.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base_path, &path[1..]),
        (false, false) => format!("{}/{}", base_path, path),
        _ => format!("{}{}", base_path, path),
    };
    url.set_path(&joined);

    let query = match (base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(b), Some(r)) => Some(format!("{}&{}", b, r)),
        (Some(b), None) => Some(b.to_string()),
        (None, Some(r)) => Some(r.to_string()),
        (None, None) => None,
    };
    url.set_query(query.as_deref());
    url
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();

    // Headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        out.remove(name);
    }
    for name in HOP_BY_HOP {
        out.remove(*name);
    }
    out
}

fn append_forwarded_for(headers: &mut HeaderMap, client: SocketAddr) {
    let ip = client.ip().to_string();
    let value = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}
