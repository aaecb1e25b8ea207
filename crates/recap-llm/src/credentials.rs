//! Credential rotation with per-credential health tracking.
//!
//! Each call draws a credential uniformly at random from those not
//! currently quarantined. A credential is quarantined after
//! `unhealthy_threshold` consecutive failures inside the failure window, or
//! immediately on an auth/rate-limit/unavailable status. Quarantine ends on
//! its own once the cooldown elapses.
//!
//! Health is advisory and process-local: when every credential is
//! quarantined, selection falls back to all of them rather than refusing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::seq::IndexedRandom;
use recap_settings::CredentialSettings;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::registry::Provider;

/// One opaque secret belonging to a provider.
///
/// Cloning is cheap; the secret itself is shared and never printed.
#[derive(Clone)]
pub struct Credential {
    provider: Arc<str>,
    fingerprint: String,
    masked: String,
    secret: Arc<SecretString>,
}

impl Credential {
    /// Wrap a raw key for `provider`.
    pub fn new(provider: &str, raw: &str) -> Self {
        let digest = Sha256::digest(raw.as_bytes());
        let fingerprint = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        Self {
            provider: Arc::from(provider),
            fingerprint,
            masked: mask_key(raw),
            secret: Arc::new(SecretString::from(raw.to_owned())),
        }
    }

    /// Owning provider name.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Short stable digest used as the health key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Loggable form: first and last five characters.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    /// The raw secret, for the completion backend only.
    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("masked", &self.masked)
            .finish_non_exhaustive()
    }
}

/// `abcde...vwxyz`, or `***` for keys too short to mask meaningfully.
pub fn mask_key(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    if chars.len() <= 10 {
        return "***".to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

/// Thresholds governing when a credential is quarantined.
#[derive(Clone, Debug)]
pub struct HealthPolicy {
    /// Consecutive failures that quarantine a credential.
    pub unhealthy_threshold: u32,
    /// Failures further apart than this restart the streak.
    pub failure_window: Duration,
    /// Quarantine length when the status gives no better hint.
    pub default_cooldown: Duration,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self::from(&CredentialSettings::default())
    }
}

impl From<&CredentialSettings> for HealthPolicy {
    fn from(s: &CredentialSettings) -> Self {
        Self {
            unhealthy_threshold: s.unhealthy_threshold.max(1),
            failure_window: Duration::from_secs(s.failure_window_secs),
            default_cooldown: Duration::from_secs(s.cooldown_secs),
        }
    }
}

impl HealthPolicy {
    /// Statuses that quarantine on the first occurrence.
    fn is_immediate(status: u16) -> bool {
        matches!(status, 401 | 429 | 503)
    }

    /// Quarantine length for a failure with this status.
    pub fn cooldown_for(&self, status: Option<u16>) -> Duration {
        match status {
            Some(401) => Duration::from_secs(3600),
            Some(429 | 500 | 502 | 504) => Duration::from_secs(300),
            Some(503) => Duration::from_secs(600),
            _ => self.default_cooldown,
        }
    }
}

#[derive(Debug, Default)]
struct CredentialHealth {
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    unhealthy_until: Option<Instant>,
    unhealthy_since: Option<Instant>,
}

impl CredentialHealth {
    fn is_unhealthy(&self, now: Instant) -> bool {
        self.unhealthy_until.is_some_and(|until| now < until)
    }
}

/// Per-credential entry in a [`CredentialStatusSummary`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnhealthyCredential {
    /// Masked key.
    pub masked_id: String,
    /// Current failure streak.
    pub failures: u32,
    /// Seconds until automatic recovery.
    pub recovers_in_secs: u64,
}

/// Health overview for one provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatusSummary {
    /// Provider name.
    pub provider: String,
    /// Credentials configured.
    pub total: usize,
    /// Credentials currently eligible.
    pub healthy: usize,
    /// Quarantined credentials.
    pub unhealthy: Vec<UnhealthyCredential>,
}

/// Picks credentials and tracks their outcomes.
///
/// Thread-safe; share via `Arc<CredentialRotator>`. Each credential's state
/// lives in its own `DashMap` shard entry so updates for different keys do
/// not contend.
#[derive(Debug, Default)]
pub struct CredentialRotator {
    health: DashMap<String, CredentialHealth>,
    policy: HealthPolicy,
}

impl CredentialRotator {
    /// Rotator with the given policy.
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            health: DashMap::new(),
            policy,
        }
    }

    /// Choose a credential for the next call to `provider`.
    ///
    /// Returns `None` only when the provider has no credentials at all.
    pub fn select(&self, provider: &Provider) -> Option<Credential> {
        let now = Instant::now();
        let all = provider.credentials();
        let healthy: Vec<&Credential> = all.iter().filter(|c| !self.unhealthy_at(c, now)).collect();

        let mut rng = rand::rng();
        if let Some(c) = healthy.choose(&mut rng) {
            return Some((*c).clone());
        }
        if !all.is_empty() {
            debug!(provider = provider.name(), "all credentials unhealthy, selecting from full set");
        }
        all.choose(&mut rng).cloned()
    }

    /// A call with `credential` succeeded: clear its streak and quarantine.
    pub fn record_success(&self, credential: &Credential) {
        if let Some(mut h) = self.health.get_mut(credential.fingerprint()) {
            if h.unhealthy_until.is_some() {
                debug!(provider = credential.provider(), key = credential.masked(), "credential recovered");
            }
            *h = CredentialHealth::default();
        }
    }

    /// A call with `credential` failed, optionally with an HTTP-like status.
    pub fn record_failure(&self, credential: &Credential, status: Option<u16>) {
        let now = Instant::now();
        let mut h = self.health.entry(credential.fingerprint().to_owned()).or_default();

        let within_window = h
            .last_failure
            .is_some_and(|t| now.duration_since(t) <= self.policy.failure_window);
        h.consecutive_failures = if within_window {
            h.consecutive_failures.saturating_add(1)
        } else {
            1
        };
        h.last_failure = Some(now);

        let trip = h.consecutive_failures >= self.policy.unhealthy_threshold
            || status.is_some_and(HealthPolicy::is_immediate);
        if trip {
            let newly = !h.is_unhealthy(now);
            let cooldown = self.policy.cooldown_for(status);
            h.unhealthy_until = Some(now + cooldown);
            if newly {
                h.unhealthy_since = Some(now);
                metrics::counter!("recap_credential_quarantined_total", "provider" => credential.provider().to_string())
                    .increment(1);
                warn!(
                    provider = credential.provider(),
                    key = credential.masked(),
                    failures = h.consecutive_failures,
                    status,
                    cooldown_secs = cooldown.as_secs(),
                    "credential marked unhealthy"
                );
            }
        }
    }

    /// Whether `credential` is eligible right now.
    pub fn is_healthy(&self, credential: &Credential) -> bool {
        !self.unhealthy_at(credential, Instant::now())
    }

    /// Health overview for `provider`.
    pub fn status_summary(&self, provider: &Provider) -> CredentialStatusSummary {
        let now = Instant::now();
        let mut unhealthy = Vec::new();
        for c in provider.credentials() {
            if let Some(h) = self.health.get(c.fingerprint()) {
                if let Some(until) = h.unhealthy_until.filter(|u| now < *u) {
                    unhealthy.push(UnhealthyCredential {
                        masked_id: c.masked().to_owned(),
                        failures: h.consecutive_failures,
                        recovers_in_secs: until.duration_since(now).as_secs(),
                    });
                }
            }
        }
        CredentialStatusSummary {
            provider: provider.name().to_owned(),
            total: provider.credentials().len(),
            healthy: provider.credentials().len() - unhealthy.len(),
            unhealthy,
        }
    }

    /// If every credential of `provider` is quarantined, how long that has
    /// been true.
    pub fn all_unhealthy_for(&self, provider: &Provider) -> Option<Duration> {
        let now = Instant::now();
        let mut latest: Option<Instant> = None;
        for c in provider.credentials() {
            let h = self.health.get(c.fingerprint())?;
            if !h.is_unhealthy(now) {
                return None;
            }
            let since = h.unhealthy_since?;
            latest = Some(latest.map_or(since, |l| l.max(since)));
        }
        latest.map(|since| now.duration_since(since))
    }

    /// Drop quarantine state whose cooldown has passed. Returns the number
    /// of credentials that recovered.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut recovered = 0;
        self.health.retain(|_, h| {
            let expired = h.unhealthy_until.is_some_and(|u| now >= u);
            if expired {
                recovered += 1;
                return false;
            }
            // Stale streaks that never tripped also go.
            h.unhealthy_until.is_some()
                || h.last_failure
                    .is_some_and(|t| now.duration_since(t) <= self.policy.failure_window)
        });
        if recovered > 0 {
            debug!(recovered, "expired credential quarantines cleared");
        }
        recovered
    }

    fn unhealthy_at(&self, credential: &Credential, now: Instant) -> bool {
        self.health
            .get(credential.fingerprint())
            .is_some_and(|h| h.is_unhealthy(now))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Model, Provider};
    use std::collections::HashSet;

    fn provider(keys: &[&str]) -> Provider {
        Provider::builder("OpenAI", "https://api.openai.com/v1")
            .credentials(keys.iter().copied())
            .model(Model::new("gpt-4o"))
            .build()
            .unwrap()
    }

    fn cred<'a>(p: &'a Provider, raw: &str) -> &'a Credential {
        p.credentials().iter().find(|c| c.expose() == raw).unwrap()
    }

    #[test]
    fn mask_key_formats() {
        assert_eq!(mask_key("sk-abcdefghijklmnop"), "sk-ab...lmnop");
        assert_eq!(mask_key("short"), "***");
    }

    #[test]
    fn debug_hides_secret() {
        let c = Credential::new("OpenAI", "sk-supersecretvalue123");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("supersecret"));
        assert!(dbg.contains("sk-su...ue123"));
    }

    #[test]
    fn identical_masks_do_not_collide() {
        let a = Credential::new("P", "aaaaa-one-zzzzz");
        let b = Credential::new("P", "aaaaa-two-zzzzz");
        assert_eq!(a.masked(), b.masked());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[tokio::test]
    async fn three_failures_exclude_credential() {
        let p = provider(&["key-aaaaaaaaaaaa", "key-bbbbbbbbbbbb"]);
        let rotator = CredentialRotator::default();
        let bad = cred(&p, "key-aaaaaaaaaaaa");

        rotator.record_failure(bad, Some(500));
        rotator.record_failure(bad, Some(500));
        assert!(rotator.is_healthy(bad));
        rotator.record_failure(bad, Some(500));
        assert!(!rotator.is_healthy(bad));

        for _ in 0..50 {
            let chosen = rotator.select(&p).unwrap();
            assert_eq!(chosen.expose(), "key-bbbbbbbbbbbb");
        }
    }

    #[tokio::test]
    async fn all_unhealthy_still_selects() {
        let p = provider(&["key-aaaaaaaaaaaa", "key-bbbbbbbbbbbb"]);
        let rotator = CredentialRotator::default();
        for c in p.credentials() {
            rotator.record_failure(c, Some(401));
        }
        let mut seen = HashSet::new();
        for _ in 0..200 {
            let _ = seen.insert(rotator.select(&p).unwrap().expose().to_owned());
        }
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn success_resets_streak() {
        let p = provider(&["key-aaaaaaaaaaaa"]);
        let rotator = CredentialRotator::default();
        let c = cred(&p, "key-aaaaaaaaaaaa");
        rotator.record_failure(c, None);
        rotator.record_failure(c, None);
        rotator.record_success(c);
        rotator.record_failure(c, None);
        rotator.record_failure(c, None);
        assert!(rotator.is_healthy(c));
    }

    #[tokio::test]
    async fn immediate_statuses_trip_on_first_failure() {
        let p = provider(&["key-aaaaaaaaaaaa"]);
        let rotator = CredentialRotator::default();
        let c = cred(&p, "key-aaaaaaaaaaaa");
        rotator.record_failure(c, Some(429));
        assert!(!rotator.is_healthy(c));
    }

    #[tokio::test(start_paused = true)]
    async fn quarantine_expires_by_status() {
        let p = provider(&["key-aaaaaaaaaaaa", "key-bbbbbbbbbbbb"]);
        let rotator = CredentialRotator::default();
        let a = cred(&p, "key-aaaaaaaaaaaa");
        let b = cred(&p, "key-bbbbbbbbbbbb");
        rotator.record_failure(a, Some(429)); // 300 s
        rotator.record_failure(b, Some(503)); // 600 s

        let summary = rotator.status_summary(&p);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.healthy, 0);
        assert_eq!(summary.unhealthy.len(), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(rotator.is_healthy(a));
        assert!(!rotator.is_healthy(b));

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(rotator.is_healthy(b));
        assert_eq!(rotator.cleanup_expired(), 2);
        assert_eq!(rotator.status_summary(&p).healthy, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn streak_restarts_outside_window() {
        let p = provider(&["key-aaaaaaaaaaaa"]);
        let rotator = CredentialRotator::new(HealthPolicy {
            unhealthy_threshold: 3,
            failure_window: Duration::from_secs(60),
            default_cooldown: Duration::from_secs(300),
        });
        let c = cred(&p, "key-aaaaaaaaaaaa");
        rotator.record_failure(c, None);
        rotator.record_failure(c, None);
        tokio::time::advance(Duration::from_secs(120)).await;
        rotator.record_failure(c, None);
        assert!(rotator.is_healthy(c));
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_outage_duration() {
        let p = provider(&["key-aaaaaaaaaaaa", "key-bbbbbbbbbbbb"]);
        let rotator = CredentialRotator::default();
        let a = cred(&p, "key-aaaaaaaaaaaa");
        let b = cred(&p, "key-bbbbbbbbbbbb");
        rotator.record_failure(a, Some(401));
        assert_eq!(rotator.all_unhealthy_for(&p), None);
        tokio::time::advance(Duration::from_secs(10)).await;
        rotator.record_failure(b, Some(401));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(rotator.all_unhealthy_for(&p), Some(Duration::from_secs(30)));
    }

    #[test]
    fn cooldown_table() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.cooldown_for(Some(401)), Duration::from_secs(3600));
        assert_eq!(policy.cooldown_for(Some(502)), Duration::from_secs(300));
        assert_eq!(policy.cooldown_for(Some(503)), Duration::from_secs(600));
        assert_eq!(policy.cooldown_for(None), Duration::from_secs(300));
    }
}
