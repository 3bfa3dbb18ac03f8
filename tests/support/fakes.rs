//! In-process doubles for the client's capability traits.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bakery_client::{
    AuthorizationError, BakeryClient, CookieSetter, CredentialStore, DischargeAcquirer,
    HttpRequest, HttpResponse, InMemoryStore, Macaroon, MacaroonLibrary, Transport, VisitPage,
};
use serde_json::{Value, json};

/// Transport answering from per-URL response queues and recording every request.
///
/// URLs without a scripted response get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues `response` for the next request to `url`.
    pub fn respond(&self, url: &str, response: HttpResponse) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn respond_json(&self, url: &str, status: u16, body: &Value) -> &Self {
        self.respond(
            url,
            HttpResponse::new(status, body.to_string()).with_content_type("application/json"),
        )
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.url == url)
            .collect()
    }

    pub fn request_urls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.url)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> HttpResponse {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| HttpResponse::new(404, "no scripted response"))
    }
}

/// Macaroon carrying an id and location, exported in distinguishable
/// v1 and v2 shapes.
#[derive(Debug, Clone)]
pub struct FakeMacaroon {
    pub id: String,
    pub location: String,
}

impl FakeMacaroon {
    pub fn new(id: &str, location: &str) -> Self {
        Self {
            id: id.to_string(),
            location: location.to_string(),
        }
    }

    fn from_json(json: &Value) -> Option<Self> {
        let id = json
            .get("i")
            .or_else(|| json.get("identifier"))
            .or_else(|| json.get("id"))?
            .as_str()?;
        let location = json
            .get("l")
            .or_else(|| json.get("location"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(id, location))
    }
}

impl Macaroon for FakeMacaroon {
    fn export_v1(&self) -> Value {
        json!({"identifier": self.id, "location": self.location})
    }

    fn export_v2(&self) -> Value {
        json!({"i": self.id, "l": self.location})
    }
}

/// Library whose macaroons list their third-party caveats explicitly:
/// `{"id": "...", "location": "...", "caveats": [{"location": "...", "id": "..."}]}`.
///
/// Discharging returns the root followed by one discharge per caveat.
#[derive(Default)]
pub struct FakeMacaroonLibrary {
    failure: Option<String>,
}

impl FakeMacaroonLibrary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A library whose discharge always fails with `message`.
    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(message.to_string()),
        })
    }
}

#[async_trait]
impl MacaroonLibrary for FakeMacaroonLibrary {
    fn import_macaroons(&self, json: &Value) -> Result<Vec<Box<dyn Macaroon>>, String> {
        let items: Vec<&Value> = match json {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let macaroons: Vec<Box<dyn Macaroon>> = items
            .into_iter()
            .map(|item| {
                FakeMacaroon::from_json(item)
                    .map(|macaroon| Box::new(macaroon) as Box<dyn Macaroon>)
                    .ok_or_else(|| "cannot import macaroon".to_string())
            })
            .collect::<Result<_, _>>()?;
        Ok(macaroons)
    }

    async fn discharge_macaroon(
        &self,
        macaroon: &Value,
        acquirer: &dyn DischargeAcquirer,
    ) -> Result<Vec<Box<dyn Macaroon>>, String> {
        if let Some(message) = &self.failure {
            return Err(message.clone());
        }

        let root = FakeMacaroon::from_json(macaroon).ok_or("cannot import macaroon")?;
        let caveats = macaroon
            .get("caveats")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut bound: Vec<Box<dyn Macaroon>> = vec![Box::new(root.clone())];
        for caveat in caveats {
            let third_party = caveat.get("location").and_then(Value::as_str).unwrap_or_default();
            let caveat_id = caveat.get("id").and_then(Value::as_str).unwrap_or_default();
            let discharge = acquirer
                .acquire(&root.location, third_party, caveat_id.as_bytes())
                .await?;
            bound.push(discharge);
        }
        Ok(bound)
    }
}

/// Visit page that records every error it was asked to show.
#[derive(Default)]
pub struct RecordingVisitPage {
    visited: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingVisitPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A visit page that records, then fails to open.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            visited: Mutex::default(),
            fail: true,
        })
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

impl VisitPage for RecordingVisitPage {
    fn visit_page(&self, error: &AuthorizationError) -> io::Result<()> {
        let url = error.info.visit_url().unwrap_or_default().to_string();
        self.visited.lock().unwrap().push(url);
        if self.fail {
            return Err(io::Error::other("no browser available"));
        }
        Ok(())
    }
}

/// Cookie setter recording every credential it receives.
#[derive(Default)]
pub struct RecordingCookieSetter {
    cookies: Mutex<Vec<Value>>,
}

impl RecordingCookieSetter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn cookies(&self) -> Vec<Value> {
        self.cookies.lock().unwrap().clone()
    }
}

impl CookieSetter for RecordingCookieSetter {
    fn set_cookie(&self, macaroons: &Value) -> Result<(), String> {
        self.cookies.lock().unwrap().push(macaroons.clone());
        Ok(())
    }
}

pub const SERVICE_URL: &str = "http://service.example.com";
pub const THIRD_PARTY_URL: &str = "http://identity.example.com";
pub const VISIT_URL: &str = "http://identity.example.com/visit";
pub const WAIT_URL: &str = "http://identity.example.com/wait";

/// Store mapping `charmstore` onto [`SERVICE_URL`].
pub fn charmstore_storage() -> CredentialStore {
    CredentialStore::builder(Arc::new(InMemoryStore::new()))
        .service("charmstore", SERVICE_URL)
        .build()
}

/// Client over `transport` with the fake library and a recording visit page.
pub fn client_with(
    transport: &Arc<ScriptedTransport>,
    visit_page: &Arc<RecordingVisitPage>,
) -> BakeryClient {
    BakeryClient::builder(transport.clone(), charmstore_storage())
        .macaroon_library(FakeMacaroonLibrary::new())
        .visit_page(visit_page.clone())
        .build()
}

pub fn discharge_required(macaroon: &Value) -> Value {
    json!({
        "Code": "macaroon discharge required",
        "Message": "verification failed",
        "Info": {"Macaroon": macaroon, "MacaroonPath": "/"}
    })
}

pub fn interaction_required(visit_url: &str, wait_url: &str) -> Value {
    json!({
        "Code": "interaction required",
        "Message": "login required",
        "Info": {"VisitURL": visit_url, "WaitURL": wait_url}
    })
}

/// Root macaroon with one third-party caveat addressed to [`THIRD_PARTY_URL`].
pub fn root_macaroon() -> Value {
    json!({
        "id": "root",
        "location": SERVICE_URL,
        "caveats": [{"location": THIRD_PARTY_URL, "id": "caveat-1"}]
    })
}

pub fn third_party_discharge(id: &str) -> Value {
    json!({"Macaroon": {"i": id, "l": THIRD_PARTY_URL}})
}
