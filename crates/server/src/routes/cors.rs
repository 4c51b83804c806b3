use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// CORS headers for one endpoint. Preflight (`OPTIONS`) is answered here
/// with `204` and never reaches the handler.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl CorsPolicy {
    pub fn new(allow_origin: &str, allow_methods: &str) -> Result<Self, header::InvalidHeaderValue> {
        Ok(Self {
            allow_origin: HeaderValue::from_str(allow_origin)?,
            allow_methods: HeaderValue::from_str(allow_methods)?,
        })
    }

    fn apply(&self, resp: &mut Response) {
        let headers = resp.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type"));
    }
}

/// Middleware: CORS headers on every response, `204` for `OPTIONS`.
pub async fn apply_cors(State(policy): State<CorsPolicy>, req: Request, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    policy.apply(&mut resp);
    resp
}
