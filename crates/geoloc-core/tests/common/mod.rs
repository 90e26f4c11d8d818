//! Test doubles and common utilities for resolver contract tests
//!
//! Scripted providers stand in for the HTTP services so the contracts can be
//! checked without a network.

#![allow(dead_code)]

use geoloc_core::{Error, GeoProvider, LocationRecord, ProviderOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// What a scripted provider answers on every call
#[derive(Debug, Clone)]
pub enum Script {
    Success(LocationRecord),
    RateLimited,
    Fail,
}

/// A provider that replays a fixed answer and records its calls
pub struct ScriptedProvider {
    name: &'static str,
    script: Script,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    seen_ips: Arc<std::sync::Mutex<Vec<Option<String>>>>,
}

impl ScriptedProvider {
    pub fn new(name: &'static str, script: Script) -> Self {
        Self {
            name,
            script,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_ips: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Succeeds with a record whose city is `city`
    pub fn located(name: &'static str, city: &str) -> Self {
        Self::new(name, Script::Success(city_record(city)))
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Get the number of times lookup() was called
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The `ip` argument of every call, in order
    pub fn seen_ips(&self) -> Vec<Option<String>> {
        self.seen_ips.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GeoProvider for ScriptedProvider {
    async fn lookup(&self, ip: Option<&str>) -> ProviderOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_ips.lock().unwrap().push(ip.map(str::to_string));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.script {
            Script::Success(record) => ProviderOutcome::Success(record.clone()),
            Script::RateLimited => ProviderOutcome::RateLimited,
            Script::Fail => ProviderOutcome::Failed(Error::http("connection refused")),
        }
    }

    fn name(&self) -> &str {
        self.name
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(8)
    }
}

pub fn city_record(city: &str) -> LocationRecord {
    LocationRecord {
        city: Some(city.to_string()),
        country_code: Some("ZZ".to_string()),
        ..Default::default()
    }
}

/// Upcast a list of scripted providers for `Resolver::new`
pub fn chain(providers: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn GeoProvider>> {
    providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn GeoProvider>)
        .collect()
}

/// Total lookups across all providers
pub fn total_calls(providers: &[Arc<ScriptedProvider>]) -> usize {
    providers.iter().map(|p| p.call_count()).sum()
}
