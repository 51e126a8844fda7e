use std::cell::RefCell;
use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// A captured form submission: endpoint plus url-encoded body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub body: String,
}

/// Either a browser-followed redirect or an HTML fragment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub redirected: bool,
    pub body: String,
}

impl FetchResponse {
    pub fn redirect() -> Self {
        Self {
            redirected: true,
            body: String::new(),
        }
    }

    pub fn fragment(body: impl Into<String>) -> Self {
        Self {
            redirected: false,
            body: body.into(),
        }
    }
}

/// Transport failure. Reported to the harness diagnostics, never escalated
/// into a harness error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for FetchError {}

/// The network seam of the harness. `POST url` with a form-encoded body is
/// the only verb the interceptor ever issues.
pub trait Fetch {
    fn post(&mut self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// Deterministic transport: planned outcomes are consumed FIFO and every
/// request is recorded. Handles are cheap clones sharing the same queue, so a
/// test can keep one while the harness owns the other.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFetch {
    planned: Rc<RefCell<VecDeque<Result<FetchResponse, FetchError>>>>,
    requests: Rc<RefCell<Vec<FetchRequest>>>,
}

impl ScriptedFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: FetchResponse) {
        self.planned.borrow_mut().push_back(Ok(response));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.planned
            .borrow_mut()
            .push_back(Err(FetchError::new(message)));
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.borrow().clone()
    }
}

impl Fetch for ScriptedFetch {
    fn post(&mut self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.requests.borrow_mut().push(request.clone());
        self.planned
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::new(format!(
                "no scripted response for POST {}",
                request.url
            ))))
    }
}

/// Real blocking transport for harnesses pointed at a live server. The
/// redirect flag mirrors `Response.redirected`: set when the final URL
/// differs from the one requested.
pub struct HttpFetch {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpFetch {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{base}{url}")
        } else {
            format!("{base}/{url}")
        }
    }
}

impl Fetch for HttpFetch {
    fn post(&mut self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = self.resolve(&request.url);
        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(request.body.clone())
            .send()
            .map_err(|err| FetchError::new(err.to_string()))?;

        let redirected = response.url().as_str() != url;
        let body = response
            .text()
            .map_err(|err| FetchError::new(err.to_string()))?;
        Ok(FetchResponse { redirected, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_fetch_replays_outcomes_in_order() {
        let fetch = ScriptedFetch::new();
        fetch.push_response(FetchResponse::fragment("<div>a</div>"));
        fetch.push_error("connection reset");

        let mut handle = fetch.clone();
        let first = handle.post(&FetchRequest {
            url: "/cart/add-gift-card".into(),
            body: "code=X".into(),
        });
        assert_eq!(first, Ok(FetchResponse::fragment("<div>a</div>")));

        let second = handle.post(&FetchRequest {
            url: "/cart/add-gift-card".into(),
            body: "code=Y".into(),
        });
        assert_eq!(second, Err(FetchError::new("connection reset")));

        let bodies: Vec<String> = fetch.requests().into_iter().map(|r| r.body).collect();
        assert_eq!(bodies, vec!["code=X".to_string(), "code=Y".to_string()]);
    }

    #[test]
    fn exhausted_script_fails_deterministically() {
        let mut fetch = ScriptedFetch::new();
        let outcome = fetch.post(&FetchRequest {
            url: "/cart".into(),
            body: String::new(),
        });
        assert!(outcome.is_err());
    }

    #[test]
    fn http_fetch_resolves_relative_urls_against_base() {
        let fetch = HttpFetch::new("http://localhost:8080/");
        assert_eq!(
            fetch.resolve("/cart/add-gift-card"),
            "http://localhost:8080/cart/add-gift-card"
        );
        assert_eq!(fetch.resolve("cart"), "http://localhost:8080/cart");
        assert_eq!(fetch.resolve("http://other/x"), "http://other/x");
    }
}
