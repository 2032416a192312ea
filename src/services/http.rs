//! Outbound HTTP with anti-bot fallback.
//!
//! All scraper traffic goes through [`HttpClient`]. Requests first try a
//! plain GET with a browser `User-Agent`; upstreams that answer 401/403 are
//! promoted to a per-scraper FlareSolverr session pool and stay there for
//! the process lifetime. Sessions are warmed at promotion time and re-warmed
//! periodically by a background sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call fetch options.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel: CancellationToken::new(),
        }
    }
}

impl FetchOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            cancel,
        }
    }
}

/// Settings for the FlareSolverr bypass service.
#[derive(Debug, Clone)]
pub struct BypassSettings {
    /// Base URL of the service, e.g. `http://flaresolverr:8191`.
    pub url: String,
    /// Hard cap on sessions per scraper pool.
    pub max_sessions: usize,
    /// Interval between background warmup sweeps.
    pub refresh_interval: Duration,
}

/// Shared HTTP client for every scraper.
pub struct HttpClient {
    client: reqwest::Client,
    bypass: Option<BypassClient>,
}

impl HttpClient {
    /// Build the client. `bypass` is optional; without it, blocked upstreams
    /// simply contribute nothing.
    pub fn new(bypass: Option<BypassSettings>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            bypass: bypass.map(|settings| BypassClient::new(client.clone(), settings)),
            client,
        }
    }

    /// Register a scraper with the bypass layer: allocate its session pool,
    /// probe the front page, and switch the pool to force-bypass right away
    /// when the probe is rejected with 401/403.
    pub async fn register_scraper(&self, key: &str, warmup_url: &str, parallelism: usize) {
        let Some(bypass) = &self.bypass else {
            return;
        };
        let pool = bypass.ensure_pool(key, warmup_url, parallelism).await;
        bypass.create_sessions(&pool).await;

        let opts = FetchOptions::default();
        match self.get_standard(warmup_url, &opts).await {
            StandardOutcome::Blocked(status) => {
                tracing::info!(scraper = %key, status = %status, "front-page probe rejected, forcing bypass");
                bypass.promote(&pool).await;
            }
            StandardOutcome::Body(_) => {
                tracing::debug!(scraper = %key, "front-page probe ok");
            }
            StandardOutcome::Failed => {
                tracing::debug!(scraper = %key, "front-page probe failed");
            }
        }
    }

    /// Fetch a URL as text. Returns `None` on any failure.
    pub async fn fetch_text(&self, scraper: &str, url: &str, opts: &FetchOptions) -> Option<String> {
        let pool = match &self.bypass {
            Some(bypass) => bypass.pool(scraper).await,
            None => None,
        };

        if let Some(pool) = &pool {
            if pool.force_bypass().await {
                return self.bypass.as_ref()?.request(pool, url, opts).await;
            }
        }

        match self.get_standard(url, opts).await {
            StandardOutcome::Body(body) => Some(body),
            StandardOutcome::Blocked(status) => {
                let bypass = self.bypass.as_ref()?;
                tracing::warn!(scraper = %scraper, url = %url, status = %status, "blocked upstream, promoting to bypass");
                // Pools normally exist from registration; create lazily for
                // scrapers that were never probed.
                let pool = match pool {
                    Some(pool) => pool,
                    None => bypass.ensure_pool(scraper, url, 1).await,
                };
                bypass.promote(&pool).await;
                bypass.request(&pool, url, opts).await
            }
            StandardOutcome::Failed => None,
        }
    }

    /// Fetch a URL and decode its body as JSON.
    ///
    /// Bypass responses wrap payloads in HTML, so a body is accepted when it
    /// starts with `{`/`[` after trimming, or when the contents of its first
    /// `<pre>` block do.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        scraper: &str,
        url: &str,
        opts: &FetchOptions,
    ) -> Option<T> {
        let body = self.fetch_text(scraper, url, opts).await?;
        let payload = extract_json_payload(&body)?;
        match serde_json::from_str(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(scraper = %scraper, url = %url, error = %e, "failed to decode JSON body");
                None
            }
        }
    }

    /// Spawn the periodic session warmup sweep. No-op without bypass.
    pub fn spawn_session_refresh(self: &Arc<Self>) {
        let Some(bypass) = &self.bypass else {
            return;
        };
        let interval = bypass.settings.refresh_interval;
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Some(bypass) = &client.bypass {
                    bypass.refresh_all().await;
                }
            }
        });
    }

    async fn get_standard(&self, url: &str, opts: &FetchOptions) -> StandardOutcome {
        let request = self.client.get(url).timeout(opts.timeout);
        let response = tokio::select! {
            _ = opts.cancel.cancelled() => return StandardOutcome::Failed,
            result = request.send() => match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "request failed");
                    return StandardOutcome::Failed;
                }
            },
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return StandardOutcome::Blocked(status.as_u16());
        }
        if !status.is_success() {
            tracing::debug!(url = %url, status = %status, "non-success response");
            return StandardOutcome::Failed;
        }

        tokio::select! {
            _ = opts.cancel.cancelled() => StandardOutcome::Failed,
            body = response.text() => match body {
                Ok(text) => StandardOutcome::Body(text),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "failed to read body");
                    StandardOutcome::Failed
                }
            },
        }
    }
}

enum StandardOutcome {
    Body(String),
    Blocked(u16),
    Failed,
}

/// Accept raw JSON or JSON wrapped in the first `<pre>` block of an HTML
/// document.
fn extract_json_payload(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }
    let open = body.find("<pre")?;
    let content_start = open + body[open..].find('>')? + 1;
    let content_end = content_start + body[content_start..].find("</pre>")?;
    let inner = body[content_start..content_end].trim();
    (inner.starts_with('{') || inner.starts_with('[')).then_some(inner)
}

/// One scraper's bypass session pool.
///
/// `force_bypass` is monotone: once set it stays set for the process
/// lifetime. All structural mutation goes through the state mutex.
pub struct BypassPool {
    key: String,
    warmup_url: String,
    desired_sessions: usize,
    state: Mutex<PoolState>,
    cursor: AtomicUsize,
    refresh_in_flight: AtomicBool,
}

#[derive(Default)]
struct PoolState {
    sessions: Vec<String>,
    force_bypass: bool,
}

impl BypassPool {
    async fn force_bypass(&self) -> bool {
        self.state.lock().await.force_bypass
    }

    async fn next_session(&self) -> Option<String> {
        let state = self.state.lock().await;
        if state.sessions.is_empty() {
            return None;
        }
        let n = self.cursor.fetch_add(1, Ordering::Relaxed);
        Some(state.sessions[n % state.sessions.len()].clone())
    }
}

struct BypassClient {
    client: reqwest::Client,
    settings: BypassSettings,
    pools: Mutex<HashMap<String, Arc<BypassPool>>>,
    session_seq: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct SolverResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    solution: Option<SolverSolution>,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    response: String,
}

impl BypassClient {
    fn new(client: reqwest::Client, settings: BypassSettings) -> Self {
        Self {
            client,
            settings,
            pools: Mutex::new(HashMap::new()),
            session_seq: AtomicU64::new(0),
        }
    }

    async fn pool(&self, key: &str) -> Option<Arc<BypassPool>> {
        self.pools.lock().await.get(key).cloned()
    }

    async fn ensure_pool(&self, key: &str, warmup_url: &str, parallelism: usize) -> Arc<BypassPool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(key) {
            return Arc::clone(pool);
        }
        let pool = Arc::new(BypassPool {
            key: key.to_string(),
            warmup_url: warmup_url.to_string(),
            desired_sessions: parallelism.clamp(1, self.settings.max_sessions),
            state: Mutex::new(PoolState::default()),
            cursor: AtomicUsize::new(0),
            refresh_in_flight: AtomicBool::new(false),
        });
        pools.insert(key.to_string(), Arc::clone(&pool));
        pool
    }

    /// Bring the pool up to its desired session count.
    async fn create_sessions(&self, pool: &BypassPool) {
        let mut state = pool.state.lock().await;
        while state.sessions.len() < pool.desired_sessions {
            match self.session_create(&pool.key).await {
                Some(id) => state.sessions.push(id),
                None => break,
            }
        }
    }

    /// Flip the pool to force-bypass, creating and warming sessions if they
    /// don't exist yet.
    async fn promote(&self, pool: &BypassPool) {
        let mut state = pool.state.lock().await;
        if !state.force_bypass {
            state.force_bypass = true;
        }
        while state.sessions.len() < pool.desired_sessions {
            match self.session_create(&pool.key).await {
                Some(id) => state.sessions.push(id),
                None => break,
            }
        }
        for session in state.sessions.clone() {
            if !self.warm(&session, &pool.warmup_url).await {
                tracing::debug!(scraper = %pool.key, session = %session, "session warmup failed");
            }
        }
    }

    /// Route one GET through the bypass service with a round-robin session.
    async fn request(&self, pool: &BypassPool, url: &str, opts: &FetchOptions) -> Option<String> {
        let mut body = json!({
            "cmd": "request.get",
            "url": url,
            "maxTimeout": opts.timeout.as_millis() as u64,
        });
        if let Some(session) = pool.next_session().await {
            body["session"] = json!(session);
        }

        let request = self
            .client
            .post(format!("{}/v1", self.settings.url))
            .timeout(opts.timeout + Duration::from_secs(5))
            .json(&body);
        let response = tokio::select! {
            _ = opts.cancel.cancelled() => return None,
            result = request.send() => result.ok()?,
        };
        let solver: SolverResponse = tokio::select! {
            _ = opts.cancel.cancelled() => return None,
            body = response.json() => body.ok()?,
        };

        if solver.status != "ok" {
            tracing::warn!(scraper = %pool.key, url = %url, message = %solver.message, "bypass request failed");
            return None;
        }
        let solution = solver.solution?;
        if !(200..300).contains(&solution.status) || solution.response.is_empty() {
            tracing::warn!(scraper = %pool.key, url = %url, status = solution.status, "bypass solution unusable");
            return None;
        }
        Some(solution.response)
    }

    async fn session_create(&self, key: &str) -> Option<String> {
        let n = self.session_seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("barestreams-{}-{}", key, n);
        let body = json!({ "cmd": "sessions.create", "session": id });
        let response = self
            .client
            .post(format!("{}/v1", self.settings.url))
            .timeout(DEFAULT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .ok()?;
        let solver: SolverResponse = response.json().await.ok()?;
        if solver.status == "ok" {
            tracing::debug!(scraper = %key, session = %id, "bypass session created");
            Some(id)
        } else {
            tracing::warn!(scraper = %key, message = %solver.message, "bypass session creation failed");
            None
        }
    }

    async fn session_destroy(&self, id: &str) {
        let body = json!({ "cmd": "sessions.destroy", "session": id });
        let result = self
            .client
            .post(format!("{}/v1", self.settings.url))
            .timeout(DEFAULT_TIMEOUT)
            .json(&body)
            .send()
            .await;
        if let Err(e) = result {
            tracing::debug!(session = %id, error = %e, "bypass session destroy failed");
        }
    }

    /// Load the warmup URL in a session and report whether it succeeded.
    async fn warm(&self, session: &str, warmup_url: &str) -> bool {
        let body = json!({
            "cmd": "request.get",
            "url": warmup_url,
            "maxTimeout": DEFAULT_TIMEOUT.as_millis() as u64,
            "session": session,
        });
        let Ok(response) = self
            .client
            .post(format!("{}/v1", self.settings.url))
            .timeout(DEFAULT_TIMEOUT + Duration::from_secs(5))
            .json(&body)
            .send()
            .await
        else {
            return false;
        };
        let Ok(solver) = response.json::<SolverResponse>().await else {
            return false;
        };
        solver.status == "ok"
            && solver
                .solution
                .map(|s| (200..300).contains(&s.status))
                .unwrap_or(false)
    }

    /// Re-warm every force-bypass pool; sessions that fail warmup are
    /// destroyed and recreated. At most one sweep per pool runs at a time.
    async fn refresh_all(&self) {
        let pools: Vec<Arc<BypassPool>> = self.pools.lock().await.values().cloned().collect();
        for pool in pools {
            if !pool.force_bypass().await {
                continue;
            }
            if pool.refresh_in_flight.swap(true, Ordering::SeqCst) {
                continue;
            }
            self.refresh_pool(&pool).await;
            pool.refresh_in_flight.store(false, Ordering::SeqCst);
        }
    }

    async fn refresh_pool(&self, pool: &BypassPool) {
        let sessions = pool.state.lock().await.sessions.clone();
        let mut replacements: Vec<(String, String)> = Vec::new();

        for session in &sessions {
            if self.warm(session, &pool.warmup_url).await {
                continue;
            }
            tracing::info!(scraper = %pool.key, session = %session, "recycling unhealthy bypass session");
            self.session_destroy(session).await;
            if let Some(fresh) = self.session_create(&pool.key).await {
                if !self.warm(&fresh, &pool.warmup_url).await {
                    tracing::debug!(scraper = %pool.key, session = %fresh, "fresh session warmup failed");
                }
                replacements.push((session.clone(), fresh));
            }
        }

        if !replacements.is_empty() {
            let mut state = pool.state.lock().await;
            for (old, new) in replacements {
                if let Some(slot) = state.sessions.iter_mut().find(|s| **s == old) {
                    *slot = new;
                } else {
                    state.sessions.push(new);
                }
            }
        }
    }
}
