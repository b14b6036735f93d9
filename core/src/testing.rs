//! Scripted `HttpExecutor` for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::ToonDbError;
use crate::http::{HttpExecutor, HttpRequest, HttpResponse};

/// Replays queued responses in order and records every request it sees.
/// Clones share the same queue and log.
#[derive(Clone, Default)]
pub(crate) struct ScriptedExecutor {
    responses: Arc<Mutex<VecDeque<Result<HttpResponse, String>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub(crate) fn fail(self, cause: &str) -> Self {
        self.responses.lock().unwrap().push_back(Err(cause.to_string()));
        self
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }

    /// Body of the last request, parsed as JSON.
    pub(crate) fn last_body(&self) -> Value {
        let request = self.last_request();
        serde_json::from_str(request.body.as_deref().expect("request had no body")).unwrap()
    }
}

impl HttpExecutor for ScriptedExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ToonDbError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(cause)) => Err(ToonDbError::Transport(cause)),
            None => panic!("unexpected request: {} {}", request.method, request.url),
        }
    }
}
