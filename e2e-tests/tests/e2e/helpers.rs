#![allow(dead_code)]

use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Test environment configuration
pub struct TestEnv {
    /// Base URL of a running PrepForge instance (`PREPFORGE_URL`)
    pub base_url: String,
    pub test_user_password: String,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PREPFORGE_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string())
                .trim_end_matches('/')
                .to_string(),
            test_user_password: "testpass123".to_string(),
        }
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Wait for service to be ready
    pub async fn wait_for_service(&self, timeout_secs: u64) -> Result<(), String> {
        let client = reqwest::Client::new();
        let health_url = self.url("/health");
        let start = std::time::Instant::now();

        loop {
            if start.elapsed().as_secs() > timeout_secs {
                return Err(format!("Timeout waiting for service: {}", health_url));
            }

            match client.get(&health_url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                _ => sleep(Duration::from_millis(500)).await,
            }
        }
    }

    /// Fresh email address so scenarios start with empty counters
    pub fn unique_email(&self, prefix: &str) -> String {
        format!("{}_{}@example.com", prefix, generate_test_id())
    }
}

/// Outcome of one scenario, printed at the end of the run
#[derive(Debug)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub duration: Duration,
}

impl TestResult {
    pub fn passed(name: &str, started: Instant) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: "✅ Scenario passed".to_string(),
            duration: started.elapsed(),
        }
    }

    pub fn failed(name: &str, message: impl Into<String>, started: Instant) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: format!("❌ Scenario failed: {}", message.into()),
            duration: started.elapsed(),
        }
    }

    pub fn print(&self) {
        println!("\n{}", "=".repeat(80));
        println!("📝 {} ({:.2?})", self.name, self.duration);
        println!("{}", self.message);
        println!("{}", "=".repeat(80));
    }
}

/// Unique id for test accounts
pub fn generate_test_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("test_{}", timestamp)
}
