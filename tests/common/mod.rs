#![allow(dead_code)]

use async_trait::async_trait;
use iped_salesforce::app::ports::{DeliveryPort, FormFields, HttpClientPort, HttpResponse};
use iped_salesforce::common::error::{IntegratorError, Result};
use iped_salesforce::config::Config;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub const BASE: &str = "https://api.iped.com.br";
pub const USERS_URL: &str = "https://api.iped.com.br/api/user/get-users";
pub const PROFILE_URL: &str = "https://api.iped.com.br/api/user/get-profile";
pub const TRAILS_URL: &str = "https://api.iped.com.br/api/user/get-trails";
pub const ALL_COURSES_URL: &str = "https://api.iped.com.br/api/course/get-courses";
pub const FINISHED_URL: &str = "https://api.iped.com.br/api/user/get-finished-courses";
pub const INPROGRESS_URL: &str = "https://api.iped.com.br/api/user/get-inprogress-courses";
pub const SUMMARY_URL: &str = "https://api.iped.com.br/api/course/get-summary";
pub const EXPORT_URL: &str = "https://api.iped.com.br/report/users.csv";

pub const CONFIG: &str = r#"
[iped]
token_home = "home-token"
token_branch = "branch-token"
base_url = "https://api.iped.com.br"
users_endpoint = "/api/user/get-users"
user_profile_endpoint = "/api/user/get-profile"
trails_endpoint = "/api/user/get-trails"
all_courses_endpoint = "/api/course/get-courses"
finished_courses_endpoint = "/api/user/get-finished-courses"
inprogress_courses_endpoint = "/api/user/get-inprogress-courses"
course_summary_endpoint = "/api/course/get-summary"

[salesforce]
client_id = "client"
client_secret = "secret"
base_url = "https://mc.example.com"
dataevents_endpoint = "/hub/v1/dataevents/key:users/rowset"

[http]
timeout_secs = 5
max_attempts = 3
backoff_ms = 1

[export]
url = "https://api.iped.com.br/report/users.csv"
key_column = "E-mail"
"#;

pub fn config() -> Config {
    Config::from_toml_str(CONFIG, |_| None).expect("test config parses")
}

/// In-memory IPED: answers each URL from its own queue, in order, and
/// records every request.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    calls: Mutex<Vec<(String, FormFields)>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, url: &str, status: u16, body: Value) -> &Self {
        self.push_raw(url, status, &body.to_string())
    }

    pub fn push_raw(&self, url: &str, status: u16, body: &str) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(HttpResponse::new(status, body));
        self
    }

    /// Forms sent to `url`, in call order.
    pub fn calls_to(&self, url: &str) -> Vec<FormFields> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, form)| form.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, url: &str, form: FormFields) -> Result<HttpResponse> {
        self.calls.lock().unwrap().push((url.to_string(), form));
        let next = self
            .routes
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_else(|| HttpResponse::new(404, "no scripted response")))
    }
}

#[async_trait]
impl HttpClientPort for ScriptedHttp {
    async fn post_form(&self, url: &str, form: &FormFields) -> Result<HttpResponse> {
        self.answer(url, form.clone())
    }

    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.answer(url, Vec::new())
    }
}

/// Value of `key` in a recorded form.
pub fn form_value<'a>(form: &'a FormFields, key: &str) -> Option<&'a str> {
    form.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Records delivered payloads; the first `failures` deliveries fail.
#[derive(Default)]
pub struct RecordingDelivery {
    pub payloads: Mutex<Vec<Value>>,
    failures: Mutex<u32>,
}

impl RecordingDelivery {
    pub fn failing(failures: u32) -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            failures: Mutex::new(failures),
        }
    }

    pub fn rows(&self) -> Vec<Value> {
        self.payloads
            .lock()
            .unwrap()
            .iter()
            .flat_map(|p| p.as_array().cloned().unwrap_or_default())
            .collect()
    }

    pub fn batches(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryPort for RecordingDelivery {
    async fn deliver(&self, payload: &Value) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(IntegratorError::Delivery {
                status: Some(503),
                body: "service unavailable".to_string(),
            });
        }
        self.payloads.lock().unwrap().push(payload.clone());
        Ok(())
    }
}
