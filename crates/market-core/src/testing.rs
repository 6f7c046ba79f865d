//! Scripted HTTP transport and fixtures for unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::db::SessionDb;
use crate::error::ApiError;
use crate::session::SessionManager;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::types::{TokenPair, UserProfile, UserRole};

pub(crate) const TEST_API: &str = "http://api.test";

type Handler = Box<dyn Fn(&HttpRequest) -> (u16, Value) + Send + Sync>;

enum Reply {
    /// Answered in order; the last one repeats
    Queue(VecDeque<(u16, String)>),
    Handler(Handler),
}

type Predicate = Box<dyn Fn(&HttpRequest) -> bool + Send + Sync>;

struct Delay {
    when: Predicate,
    duration: Duration,
}

struct Route {
    reply: Reply,
    delay: Option<Arc<Delay>>,
}

/// Routes on method + path (query ignored). Unrouted requests get a 404.
#[derive(Default)]
pub(crate) struct StubTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a JSON response
    pub fn on(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.on_raw(method, path, status, &body.to_string())
    }

    pub fn on_raw(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        let route = routes.entry((method, path.to_string())).or_insert_with(|| Route {
            reply: Reply::Queue(VecDeque::new()),
            delay: None,
        });
        match &mut route.reply {
            Reply::Queue(queue) => queue.push_back((status, body.to_string())),
            reply => *reply = Reply::Queue(VecDeque::from([(status, body.to_string())])),
        }
        self
    }

    /// Answer with a function of the request
    pub fn on_fn<F>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(&HttpRequest) -> (u16, Value) + Send + Sync + 'static,
    {
        let mut routes = self.routes.lock().unwrap();
        let delay = routes.get(&(method, path.to_string())).and_then(|r| r.delay.clone());
        routes.insert(
            (method, path.to_string()),
            Route { reply: Reply::Handler(Box::new(handler)), delay },
        );
        self
    }

    /// Hold responses on this route for `duration`
    pub fn delay(&self, method: Method, path: &str, duration: Duration) -> &Self {
        self.delay_when(method, path, |_| true, duration)
    }

    /// Hold only the responses to requests matching `when`
    pub fn delay_when<F>(&self, method: Method, path: &str, when: F, duration: Duration) -> &Self
    where
        F: Fn(&HttpRequest) -> bool + Send + Sync + 'static,
    {
        if let Some(route) = self.routes.lock().unwrap().get_mut(&(method, path.to_string())) {
            route.delay = Some(Arc::new(Delay { when: Box::new(when), duration }));
        }
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && path_of(&r.url) == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        let key = (request.method, path_of(&request.url));

        let (status, body, delay) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(route) => {
                    let (status, body) = match &mut route.reply {
                        Reply::Queue(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                        Reply::Queue(queue) => queue.front().cloned().unwrap_or((404, String::new())),
                        Reply::Handler(handler) => {
                            let (status, value) = handler(&request);
                            (status, value.to_string())
                        }
                    };
                    let delay = route
                        .delay
                        .as_ref()
                        .filter(|d| (d.when)(&request))
                        .map(|d| d.duration);
                    (status, body, delay)
                }
                None => (404, json!({"detail": "no stub route"}).to_string(), None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub(crate) fn user(id: i64) -> UserProfile {
    UserProfile {
        id,
        username: format!("user{}", id),
        email: "a@b.com".to_string(),
        full_name: None,
        role: UserRole::User,
        wallet_address: None,
    }
}

pub(crate) fn user_json(id: i64) -> Value {
    json!({"id": id, "username": format!("user{}", id), "email": "a@b.com", "role": "user"})
}

/// Query parameter of a recorded request
pub(crate) fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
    url::Url::parse(&request.url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub(crate) fn prompt_json(id: i64, category_id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Prompt {}", id),
        "description": "A prompt",
        "price": 4.5,
        "category_id": category_id,
        "seller_id": 5
    })
}

/// Anonymous client over the stub with an in-memory session
pub(crate) fn anonymous_client(stub: &Arc<StubTransport>) -> Arc<ApiClient> {
    let config = ClientConfig::for_api(TEST_API);
    let session = Arc::new(SessionManager::new(SessionDb::in_memory().unwrap(), &config));
    Arc::new(ApiClient::new(&config, stub.clone(), session).unwrap())
}

/// Client signed in as user 1 with tokens t1 / r1
pub(crate) async fn signed_in_client(stub: &Arc<StubTransport>) -> Arc<ApiClient> {
    let client = anonymous_client(stub);
    client
        .session()
        .establish(
            user(1),
            TokenPair { access_token: "t1".into(), refresh_token: Some("r1".into()) },
        )
        .await;
    client
}
