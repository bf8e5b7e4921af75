/// Request origin extraction
///
/// The origin bound into refresh tokens is a bare IP address. It comes from
/// the TCP peer, or from the first `X-Forwarded-For` entry when the service is
/// configured to sit behind a trusted proxy. Anything that does not parse as
/// an IP address is ignored, so the origin never carries arbitrary text.

use std::net::{IpAddr, SocketAddr};

use actix_web::http::header::HeaderMap;
use actix_web::HttpRequest;

pub const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Debug, Clone, Copy, Default)]
pub struct OriginPolicy {
    pub trust_forwarded_for: bool,
}

impl OriginPolicy {
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self {
            trust_forwarded_for,
        }
    }

    pub fn origin_of(&self, req: &HttpRequest) -> String {
        self.resolve(req.headers(), req.peer_addr())
    }

    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        if self.trust_forwarded_for {
            if let Some(ip) = forwarded_for(headers) {
                return ip.to_string();
            }
        }
        peer.map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok())
}
