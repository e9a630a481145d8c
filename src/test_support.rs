//! In-process transport doubles for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::download::{Transport, TransportError, TransportResponse};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum Reply {
    Body(u16, Vec<u8>),
    Timeout,
    Slow(Duration),
}

impl Reply {
    pub fn ok(body: &[u8]) -> Self {
        Self::Body(200, body.to_vec())
    }

    pub fn status(status: u16) -> Self {
        Self::Body(status, Vec::new())
    }
}

/// Answers from a per-URL script; unscripted URLs return their own URL as a 200 body.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, url: &str, _timeout: Duration) -> Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let next = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(url)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Reply::Body(status, body)) => Ok(TransportResponse::new(status, body)),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            Some(Reply::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(TransportResponse::new(200, url.as_bytes().to_vec()))
            }
            None => Ok(TransportResponse::new(200, url.as_bytes().to_vec())),
        }
    }
}
