// SPDX-License-Identifier: MIT
//
// QKD Simulator: BB84 Key Establishment with Authenticated Encryption
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! Metrics collection and reporting

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const HISTORY_LIMIT: usize = 10_000;

/// Global metrics collector
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Protocol runs
    runs_total: AtomicU64,
    runs_completed: AtomicU64,
    runs_aborted: AtomicU64,
    runs_failed: AtomicU64,
    key_bits_derived: AtomicU64,

    // Decryption requests
    decrypts_total: AtomicU64,
    decrypts_failed: AtomicU64,

    // Measured QBER of every checked run, aborted ones included
    qber_history: RwLock<Vec<f64>>,

    // Run latency (microseconds)
    run_latencies: RwLock<Vec<u64>>,

    last_run_at: RwLock<Option<DateTime<Utc>>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded<T>(history: &mut Vec<T>, value: T) {
    history.push(value);
    if history.len() > HISTORY_LIMIT {
        history.drain(0..HISTORY_LIMIT / 2);
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                runs_total: AtomicU64::new(0),
                runs_completed: AtomicU64::new(0),
                runs_aborted: AtomicU64::new(0),
                runs_failed: AtomicU64::new(0),
                key_bits_derived: AtomicU64::new(0),
                decrypts_total: AtomicU64::new(0),
                decrypts_failed: AtomicU64::new(0),
                qber_history: RwLock::new(Vec::with_capacity(HISTORY_LIMIT)),
                run_latencies: RwLock::new(Vec::with_capacity(HISTORY_LIMIT)),
                last_run_at: RwLock::new(None),
            }),
        }
    }

    fn record_run_attempt(&self, latency_micros: u64) {
        self.inner.runs_total.fetch_add(1, Ordering::Relaxed);
        let mut latencies = self.inner.run_latencies.write();
        push_bounded(&mut latencies, latency_micros);
        drop(latencies);
        *self.inner.last_run_at.write() = Some(Utc::now());
    }

    // Run metrics
    pub fn record_run(&self, qber: f64, key_bits: usize, latency_micros: u64) {
        self.record_run_attempt(latency_micros);
        self.inner.runs_completed.fetch_add(1, Ordering::Relaxed);
        self.inner.key_bits_derived.fetch_add(key_bits as u64, Ordering::Relaxed);
        let mut history = self.inner.qber_history.write();
        push_bounded(&mut history, qber);
    }

    pub fn record_abort(&self, qber: f64, latency_micros: u64) {
        self.record_run_attempt(latency_micros);
        self.inner.runs_aborted.fetch_add(1, Ordering::Relaxed);
        let mut history = self.inner.qber_history.write();
        push_bounded(&mut history, qber);
    }

    pub fn record_run_failure(&self, latency_micros: u64) {
        self.record_run_attempt(latency_micros);
        self.inner.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn runs_total(&self) -> u64 {
        self.inner.runs_total.load(Ordering::Relaxed)
    }

    pub fn runs_completed(&self) -> u64 {
        self.inner.runs_completed.load(Ordering::Relaxed)
    }

    pub fn runs_aborted(&self) -> u64 {
        self.inner.runs_aborted.load(Ordering::Relaxed)
    }

    pub fn runs_failed(&self) -> u64 {
        self.inner.runs_failed.load(Ordering::Relaxed)
    }

    pub fn key_bits_derived(&self) -> u64 {
        self.inner.key_bits_derived.load(Ordering::Relaxed)
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_run_at.read()
    }

    // Decrypt metrics
    pub fn record_decrypt(&self, success: bool) {
        self.inner.decrypts_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.decrypts_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn decrypts_total(&self) -> u64 {
        self.inner.decrypts_total.load(Ordering::Relaxed)
    }

    pub fn decrypts_failed(&self) -> u64 {
        self.inner.decrypts_failed.load(Ordering::Relaxed)
    }

    // Derived metrics
    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    /// Fraction of runs aborted for high QBER
    pub fn abort_rate(&self) -> f64 {
        let total = self.runs_total();
        if total > 0 {
            self.runs_aborted() as f64 / total as f64
        } else {
            0.0
        }
    }

    pub fn qber_mean(&self) -> Option<f64> {
        let history = self.inner.qber_history.read();
        if history.is_empty() {
            return None;
        }
        Some(history.iter().sum::<f64>() / history.len() as f64)
    }

    pub fn qber_percentile(&self, percentile: f64) -> Option<f64> {
        let history = self.inner.qber_history.read();
        if history.is_empty() {
            return None;
        }

        let mut sorted = history.clone();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        let index = ((sorted.len() as f64 * percentile).ceil() as usize).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn latency_percentile(&self, percentile: f64) -> Option<u64> {
        let latencies = self.inner.run_latencies.read();
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() as f64 * percentile).ceil() as usize).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn latency_p50(&self) -> Option<u64> {
        self.latency_percentile(0.50)
    }

    pub fn latency_p99(&self) -> Option<u64> {
        self.latency_percentile(0.99)
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP qkd_runs_total Total number of protocol runs\n");
        output.push_str("# TYPE qkd_runs_total counter\n");
        output.push_str(&format!("qkd_runs_total {}\n", self.runs_total()));

        output.push_str("# HELP qkd_runs_aborted Runs aborted for high QBER\n");
        output.push_str("# TYPE qkd_runs_aborted counter\n");
        output.push_str(&format!("qkd_runs_aborted {}\n", self.runs_aborted()));

        output.push_str("# HELP qkd_runs_failed Runs that failed with an error\n");
        output.push_str("# TYPE qkd_runs_failed counter\n");
        output.push_str(&format!("qkd_runs_failed {}\n", self.runs_failed()));

        output.push_str("# HELP qkd_key_bits_derived Total reconciled bits hashed into keys\n");
        output.push_str("# TYPE qkd_key_bits_derived counter\n");
        output.push_str(&format!("qkd_key_bits_derived {}\n", self.key_bits_derived()));

        output.push_str("# HELP qkd_decrypts_total Total decryption requests\n");
        output.push_str("# TYPE qkd_decrypts_total counter\n");
        output.push_str(&format!("qkd_decrypts_total {}\n", self.decrypts_total()));

        output.push_str("# HELP qkd_decrypts_failed Failed decryption requests\n");
        output.push_str("# TYPE qkd_decrypts_failed counter\n");
        output.push_str(&format!("qkd_decrypts_failed {}\n", self.decrypts_failed()));

        output.push_str("# HELP qkd_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE qkd_uptime_seconds gauge\n");
        output.push_str(&format!("qkd_uptime_seconds {}\n", self.uptime_seconds()));

        if let Some(mean) = self.qber_mean() {
            output.push_str("# HELP qkd_qber_mean Mean measured QBER\n");
            output.push_str("# TYPE qkd_qber_mean gauge\n");
            output.push_str(&format!("qkd_qber_mean {:.6}\n", mean));
        }

        if let Some(p50) = self.qber_percentile(0.50) {
            output.push_str("# HELP qkd_qber_p50 Measured QBER 50th percentile\n");
            output.push_str("# TYPE qkd_qber_p50 gauge\n");
            output.push_str(&format!("qkd_qber_p50 {:.6}\n", p50));
        }

        if let Some(p95) = self.qber_percentile(0.95) {
            output.push_str("# HELP qkd_qber_p95 Measured QBER 95th percentile\n");
            output.push_str("# TYPE qkd_qber_p95 gauge\n");
            output.push_str(&format!("qkd_qber_p95 {:.6}\n", p95));
        }

        if let Some(p50) = self.latency_p50() {
            output.push_str("# HELP qkd_run_latency_p50_microseconds Run latency 50th percentile\n");
            output.push_str("# TYPE qkd_run_latency_p50_microseconds gauge\n");
            output.push_str(&format!("qkd_run_latency_p50_microseconds {}\n", p50));
        }

        if let Some(p99) = self.latency_p99() {
            output.push_str("# HELP qkd_run_latency_p99_microseconds Run latency 99th percentile\n");
            output.push_str("# TYPE qkd_run_latency_p99_microseconds gauge\n");
            output.push_str(&format!("qkd_run_latency_p99_microseconds {}\n", p99));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_counters() {
        let metrics = Metrics::new();

        metrics.record_run(0.02, 256, 100);
        metrics.record_run(0.03, 256, 200);
        metrics.record_abort(0.20, 150);
        metrics.record_run_failure(50);

        assert_eq!(metrics.runs_total(), 4);
        assert_eq!(metrics.runs_completed(), 2);
        assert_eq!(metrics.runs_aborted(), 1);
        assert_eq!(metrics.runs_failed(), 1);
        assert_eq!(metrics.key_bits_derived(), 512);
        assert!((metrics.abort_rate() - 0.25).abs() < 1e-9);
        assert!(metrics.last_run_at().is_some());
    }

    #[test]
    fn test_qber_statistics() {
        let metrics = Metrics::new();
        assert!(metrics.qber_mean().is_none());

        metrics.record_run(0.0, 256, 1);
        metrics.record_abort(0.3, 1);

        assert!((metrics.qber_mean().unwrap() - 0.15).abs() < 1e-9);
        assert_eq!(metrics.qber_percentile(0.95), Some(0.3));
    }

    #[test]
    fn test_decrypt_counters() {
        let metrics = Metrics::new();
        metrics.record_decrypt(true);
        metrics.record_decrypt(false);

        assert_eq!(metrics.decrypts_total(), 2);
        assert_eq!(metrics.decrypts_failed(), 1);
    }

    #[test]
    fn test_latency_percentiles() {
        let metrics = Metrics::new();

        for i in 1..=100 {
            metrics.record_run(0.0, 256, i);
        }

        let p50 = metrics.latency_p50().unwrap();
        assert!((45..=55).contains(&p50));

        let p99 = metrics.latency_p99().unwrap();
        assert!((95..=100).contains(&p99));
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = Metrics::new();
        metrics.record_run(0.01, 256, 10);

        let text = metrics.prometheus_format();
        assert!(text.contains("qkd_runs_total 1\n"));
        assert!(text.contains("qkd_key_bits_derived 256\n"));
        assert!(text.contains("# TYPE qkd_qber_mean gauge"));
    }
}
