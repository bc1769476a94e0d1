//! Shared test doubles: a scripted transport and a recording diagnostic sink.

#![allow(dead_code)]

use async_trait::async_trait;
use log::Level;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use tplink_smarthome::{DiagnosticSink, Result, SmartHomeError, Transport};

/// Answers requests from a table keyed by (namespace, command).
///
/// Unscripted commands succeed with a bare `{"err_code": 0}`.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<(String, String), Value>>,
    requests: Mutex<Vec<Value>>,
    offline: bool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            offline: true,
            ..Self::default()
        })
    }

    /// Script the inner result object for one command.
    pub fn respond(&self, namespace: &str, command: &str, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert((namespace.to_string(), command.to_string()), result);
    }

    pub fn sysinfo(&self, fields: Value) {
        let mut fields = fields;
        fields["err_code"] = json!(0);
        self.respond("system", "get_sysinfo", fields);
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    /// (namespace, command) of every request seen so far.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.requests().iter().map(split_request).collect()
    }

    pub fn sent_to(&self, namespace: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.get(namespace).is_some())
            .collect()
    }
}

fn split_request(request: &Value) -> (String, String) {
    let (ns, inner) = request.as_object().unwrap().iter().next().unwrap();
    let cmd = inner.as_object().unwrap().keys().next().unwrap();
    (ns.clone(), cmd.clone())
}

#[async_trait]
impl Transport for MockTransport {
    async fn exchange(&self, _host: Ipv4Addr, request: &Value) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        if self.offline {
            return Err(SmartHomeError::ConnectionFailed("mock".into()));
        }
        let (ns, cmd) = split_request(request);
        let result = self
            .responses
            .lock()
            .unwrap()
            .get(&(ns.clone(), cmd.clone()))
            .cloned()
            .unwrap_or_else(|| json!({"err_code": 0}));
        Ok(json!({ ns: { cmd: result } }))
    }
}

/// Keeps every diagnostic message for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn at(&self, level: Level) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, level: Level, message: &str) {
        self.records
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}
