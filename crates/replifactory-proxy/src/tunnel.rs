//! Tunnel supervisor.
//!
//! Runs the configured tunnel program as a child process, scrapes its
//! output for the public URL, and hands each new URL to a
//! [`UrlPublisher`]. A background monitor restarts the child when it is
//! down and a token is available.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use replifactory_api::GatewayClient;
use replifactory_api::models::TunnelStatus;
use replifactory_config::TunnelSettings;

use crate::error::ProxyError;
use crate::publish::UrlPublisher;

const DEFAULT_URL_WAIT: Duration = Duration::from_secs(20);
const EXIT_POLL: Duration = Duration::from_millis(200);
const UNKNOWN_HOST: &str = "unknown";

/// First public `https://` URL in a line of tunnel output.
///
/// A `url=` field wins over bare mentions so that log lines carrying
/// documentation links are not mistaken for the tunnel address.
pub fn extract_public_url(line: &str) -> Option<&str> {
    let start = line
        .find("url=https://")
        .map(|i| i + "url=".len())
        .or_else(|| line.find("https://"))?;
    let rest = line.get(start..)?;
    let end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | ',' | '<' | '>' | ')'))
        .unwrap_or(rest.len());
    let url = rest.get(..end)?;
    (url.len() > "https://".len()).then_some(url)
}

/// Substitute `{port}` and `{token}` into the argument template.
fn render_args(
    template: &[String],
    port: u16,
    token: Option<&SecretString>,
) -> Result<Vec<String>, ProxyError> {
    let port = port.to_string();
    template
        .iter()
        .map(|arg| {
            let arg = arg.replace("{port}", &port);
            if arg.contains("{token}") {
                let token = token.ok_or(ProxyError::MissingToken)?;
                Ok(arg.replace("{token}", token.expose_secret()))
            } else {
                Ok(arg)
            }
        })
        .collect()
}

struct Inner {
    settings: TunnelSettings,
    port: u16,
    url_wait: Duration,
    use_keyring: bool,
    runtime_token: StdMutex<Option<SecretString>>,
    child: Mutex<Option<Child>>,
    // Serializes start/stop so the URL wait does not hold `child`.
    lifecycle: Mutex<()>,
    generation: AtomicU64,
    url: watch::Sender<Option<String>>,
    publisher: Arc<dyn UrlPublisher>,
    host: Option<GatewayClient>,
}

/// Handle to the tunnel child process. Cheap to clone.
#[derive(Clone)]
pub struct TunnelManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TunnelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelManager")
            .field("program", &self.inner.settings.program)
            .field("port", &self.inner.port)
            .field("url", &*self.inner.url.borrow())
            .finish_non_exhaustive()
    }
}

impl TunnelManager {
    /// `port` is the public listen port substituted for `{port}`.
    /// `host` is asked for the hostname reported alongside each URL.
    pub fn new(
        settings: TunnelSettings,
        port: u16,
        publisher: Arc<dyn UrlPublisher>,
        host: Option<GatewayClient>,
    ) -> Self {
        let (url, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                settings,
                port,
                url_wait: DEFAULT_URL_WAIT,
                use_keyring: true,
                runtime_token: StdMutex::new(None),
                child: Mutex::new(None),
                lifecycle: Mutex::new(()),
                generation: AtomicU64::new(0),
                url,
                publisher,
                host,
            }),
        }
    }

    /// How long `start` waits for the URL before reporting without one.
    ///
    /// Only valid before the manager is cloned.
    pub fn with_url_wait(mut self, wait: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.url_wait = wait;
        }
        self
    }

    /// Ignore the system keyring for both lookup and storage.
    ///
    /// Only valid before the manager is cloned.
    pub fn without_keyring(mut self) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.use_keyring = false;
        }
        self
    }

    pub fn current_url(&self) -> Option<String> {
        self.inner.url.borrow().clone()
    }

    // ── Token ────────────────────────────────────────────────────────

    /// Runtime value, then keyring, then environment.
    fn resolve_token(&self) -> Option<SecretString> {
        let runtime = self.inner.runtime_token.lock().ok().and_then(|guard| {
            guard
                .as_ref()
                .map(|token| SecretString::from(token.expose_secret().to_owned()))
        });
        if runtime.is_some() {
            return runtime;
        }
        if self.inner.use_keyring {
            replifactory_config::resolve_tunnel_token()
        } else {
            None
        }
    }

    fn needs_token(&self) -> bool {
        self.inner
            .settings
            .args
            .iter()
            .any(|arg| arg.contains("{token}"))
    }

    /// Store `token` and restart the tunnel with it.
    pub async fn set_token(&self, token: SecretString) -> Result<TunnelStatus, ProxyError> {
        if token.expose_secret().trim().is_empty() {
            return Err(ProxyError::MissingToken);
        }
        if self.inner.use_keyring {
            if let Err(e) = replifactory_config::store_tunnel_token(token.expose_secret()) {
                warn!(error = %e, "could not persist tunnel token; keeping it in memory only");
            }
        }
        if let Ok(mut guard) = self.inner.runtime_token.lock() {
            *guard = Some(token);
        }

        self.stop().await;
        self.start().await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Collect the child if it exited. Returns its exit description.
    async fn reap(&self) -> Option<String> {
        let mut guard = self.inner.child.lock().await;
        let child = guard.as_mut()?;
        let exit = match child.try_wait() {
            Ok(None) => return None,
            Ok(Some(status)) => status.to_string(),
            Err(e) => e.to_string(),
        };
        *guard = None;
        drop(guard);

        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.url.send_replace(None);
        info!(program = %self.inner.settings.program, %exit, "tunnel process exited");
        Some(exit)
    }

    pub async fn is_running(&self) -> bool {
        self.reap().await;
        self.inner.child.lock().await.is_some()
    }

    pub async fn status(&self) -> TunnelStatus {
        let running = self.is_running().await;
        TunnelStatus {
            running,
            tunnel_url: if running { self.current_url() } else { None },
        }
    }

    /// Launch the tunnel unless it is already up, then wait briefly for
    /// its public URL.
    pub async fn start(&self) -> Result<TunnelStatus, ProxyError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_running().await {
            return Ok(self.status().await);
        }

        let token = self.resolve_token();
        let args = render_args(&self.inner.settings.args, self.inner.port, token.as_ref())?;
        let mut url_rx = self.inner.url.subscribe();

        let mut child = Command::new(&self.inner.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProxyError::Tunnel {
                message: format!("cannot launch {}: {e}", self.inner.settings.program),
            })?;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(stdout, Arc::clone(&self.inner), generation, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(stderr, Arc::clone(&self.inner), generation, "stderr"));
        }
        info!(
            program = %self.inner.settings.program,
            port = self.inner.port,
            pid = child.id(),
            "tunnel process started"
        );
        *self.inner.child.lock().await = Some(child);

        let deadline = tokio::time::sleep(self.inner.url_wait);
        tokio::pin!(deadline);
        let mut exit_check = tokio::time::interval(EXIT_POLL);
        loop {
            tokio::select! {
                changed = url_rx.changed() => {
                    if changed.is_err() || url_rx.borrow_and_update().is_some() {
                        break;
                    }
                }
                _ = exit_check.tick() => {
                    if let Some(exit) = self.reap().await {
                        return Err(ProxyError::Tunnel {
                            message: format!("{} exited ({exit})", self.inner.settings.program),
                        });
                    }
                }
                () = &mut deadline => {
                    warn!(
                        wait_secs = self.inner.url_wait.as_secs(),
                        "tunnel is running but has not reported a public URL yet"
                    );
                    break;
                }
            }
        }

        Ok(self.status().await)
    }

    /// Kill the child, if any.
    pub async fn stop(&self) -> TunnelStatus {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let child = self.inner.child.lock().await.take();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.url.send_replace(None);

        if let Some(mut child) = child {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill tunnel process");
            } else {
                info!(program = %self.inner.settings.program, "tunnel process stopped");
            }
        }
        TunnelStatus::default()
    }

    /// Start the tunnel whenever it is down and a token is available.
    ///
    /// The first check runs immediately. The child is stopped once
    /// `cancel` fires.
    pub fn spawn_monitor(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.monitor(every, &cancel).await })
    }

    async fn monitor(&self, every: Duration, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.is_running().await {
                        continue;
                    }
                    if self.needs_token() && self.resolve_token().is_none() {
                        debug!("tunnel down and no token configured");
                        continue;
                    }
                    if let Err(e) = self.start().await {
                        warn!(error = %e, "tunnel restart failed");
                    }
                }
            }
        }

        self.stop().await;
        debug!("tunnel monitor stopped");
    }
}

async fn scan_output<R>(reader: R, inner: Arc<Inner>, generation: u64, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream, %line, "tunnel output");
        if let Some(url) = extract_public_url(&line) {
            discover(&inner, generation, url);
        }
    }
}

fn discover(inner: &Arc<Inner>, generation: u64, url: &str) {
    if inner.generation.load(Ordering::SeqCst) != generation {
        return;
    }
    let first = inner.url.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(url.to_owned());
            true
        } else {
            false
        }
    });
    if !first {
        return;
    }

    info!(url, "tunnel URL discovered");
    let inner = Arc::clone(inner);
    let url = url.to_owned();
    tokio::spawn(async move {
        let hostname = match inner.host {
            Some(ref client) => client.hostname().await.unwrap_or_else(|e| {
                debug!(error = %e, "backend hostname unavailable");
                UNKNOWN_HOST.to_owned()
            }),
            None => UNKNOWN_HOST.to_owned(),
        };
        if let Err(e) = inner.publisher.publish(&hostname, &url).await {
            warn!(error = %e, "failed to publish tunnel URL");
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::publish::LogPublisher;
    use futures_util::future::BoxFuture;
    use tokio::sync::mpsc;

    struct ChannelPublisher(mpsc::UnboundedSender<(String, String)>);

    impl UrlPublisher for ChannelPublisher {
        fn publish<'a>(
            &'a self,
            hostname: &'a str,
            url: &'a str,
        ) -> BoxFuture<'a, Result<(), ProxyError>> {
            let _ = self.0.send((hostname.to_owned(), url.to_owned()));
            Box::pin(async { Ok(()) })
        }
    }

    fn shell(script: &str) -> TunnelSettings {
        TunnelSettings {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn url_field_wins_over_links() {
        let line = "t=1 lvl=info msg=\"see https://ngrok.com/docs\" url=https://ab12.ngrok.app";
        assert_eq!(extract_public_url(line), Some("https://ab12.ngrok.app"));
    }

    #[test]
    fn bare_url_is_trimmed_at_delimiters() {
        assert_eq!(
            extract_public_url("Forwarding \"https://pi.trycloudflare.com\", ok"),
            Some("https://pi.trycloudflare.com")
        );
        assert_eq!(extract_public_url("listening on http://localhost:3000"), None);
        assert_eq!(extract_public_url("https:// nothing"), None);
    }

    #[test]
    fn args_substitute_port_and_token() {
        let template: Vec<String> = ["http", "{port}", "--authtoken={token}"]
            .into_iter()
            .map(String::from)
            .collect();
        let token = SecretString::from("s3cret".to_owned());
        let args = render_args(&template, 3000, Some(&token)).unwrap();
        assert_eq!(args, ["http", "3000", "--authtoken=s3cret"]);

        let err = render_args(&template, 3000, None).unwrap_err();
        assert!(matches!(err, ProxyError::MissingToken));
    }

    #[tokio::test]
    async fn start_scrapes_url_and_publishes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let manager = TunnelManager::new(
            shell("echo booting; echo 'url=https://pi-{port}.example.net'; sleep 30"),
            3000,
            Arc::new(ChannelPublisher(tx)),
            None,
        )
        .with_url_wait(Duration::from_secs(10))
        .without_keyring();

        let status = manager.start().await.unwrap();
        assert!(status.running);
        assert_eq!(status.tunnel_url.as_deref(), Some("https://pi-3000.example.net"));

        let (host, url) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(host, "unknown");
        assert_eq!(url, "https://pi-3000.example.net");

        let stopped = manager.stop().await;
        assert!(!stopped.running);
        assert!(!manager.is_running().await);
        assert_eq!(manager.current_url(), None);
    }

    #[tokio::test]
    async fn early_exit_is_reported() {
        let manager = TunnelManager::new(shell("exit 3"), 3000, Arc::new(LogPublisher), None)
            .with_url_wait(Duration::from_secs(10))
            .without_keyring();

        let err = manager.start().await.unwrap_err();
        assert!(matches!(err, ProxyError::Tunnel { .. }));
        assert!(!manager.is_running().await);
    }

    #[tokio::test]
    async fn token_placeholder_requires_a_token() {
        let manager = TunnelManager::new(
            shell("echo {token}"),
            3000,
            Arc::new(LogPublisher),
            None,
        )
        .without_keyring();

        assert!(matches!(
            manager.start().await.unwrap_err(),
            ProxyError::MissingToken
        ));
    }

    #[tokio::test]
    async fn set_token_restarts_with_new_value() {
        let manager = TunnelManager::new(
            shell("echo url=https://{token}.example.net; sleep 30"),
            3000,
            Arc::new(LogPublisher),
            None,
        )
        .with_url_wait(Duration::from_secs(10))
        .without_keyring();

        let status = manager
            .set_token(SecretString::from("first".to_owned()))
            .await
            .unwrap();
        assert_eq!(status.tunnel_url.as_deref(), Some("https://first.example.net"));

        let status = manager
            .set_token(SecretString::from("second".to_owned()))
            .await
            .unwrap();
        assert_eq!(status.tunnel_url.as_deref(), Some("https://second.example.net"));

        manager.stop().await;
    }
}
