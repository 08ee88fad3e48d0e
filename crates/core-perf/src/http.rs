//! HTTP client for the luminosity and performance curve services

use crate::curve::{LumiCurve, PerformanceCurve};
use crate::error::{PerfError, Result};
use crate::source::{CurveServiceConfig, LumiCurveSource, PerformanceCurveSource, AUTH_TOKEN_ENV};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Blocking HTTP curve source
pub struct HttpCurveSource {
    client: Client,
    lumi_url: Option<String>,
    perf_url: Option<String>,
    auth_token: Option<String>,
}

impl HttpCurveSource {
    pub fn new(config: &CurveServiceConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let client = Client::builder().timeout(timeout).build()?;
        let auth_token = config
            .auth_token
            .clone()
            .or_else(|| std::env::var(AUTH_TOKEN_ENV).ok())
            .filter(|token| !token.is_empty());

        Ok(Self {
            client,
            lumi_url: config.lumi_url.clone(),
            perf_url: config.perf_url.clone(),
            auth_token,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let mut request = self.client.get(url).query(query);
        if let Some(ref token) = self.auth_token {
            request = request.bearer_auth(token);
        }
        debug!("GET {}", url);
        let response = request.send()?.error_for_status()?;
        Ok(response.json::<T>()?)
    }
}

impl LumiCurveSource for HttpCurveSource {
    fn lumi_curve(&self, run: u32) -> Result<LumiCurve> {
        let base = self
            .lumi_url
            .as_deref()
            .ok_or(PerfError::NotConfigured("luminosity"))?;
        let url = format!("{}/{}", base.trim_end_matches('/'), run);
        let samples: Vec<(u32, f64)> = self.get_json(&url, &[])?;
        if samples.is_empty() {
            return Err(PerfError::InvalidCurve(format!("no lumis for run {}", run)));
        }
        Ok(LumiCurve::new(run, samples))
    }
}

impl PerformanceCurveSource for HttpCurveSource {
    fn performance_curve(&self, version: &str, dataset: &str) -> Result<PerformanceCurve> {
        let url = self
            .perf_url
            .as_deref()
            .ok_or(PerfError::NotConfigured("performance"))?;
        let pairs: Vec<[f64; 2]> =
            self.get_json(url, &[("version", version), ("dataset", dataset)])?;
        PerformanceCurve::from_pairs(&pairs)
    }
}
