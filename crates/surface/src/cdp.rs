//! Chromium adapter speaking the DevTools protocol.
//!
//! Launches a Chromium-family browser with a persistent profile directory
//! (the out-of-band `setup` command authenticates it once), discovers the
//! DevTools WebSocket endpoint over HTTP, then drives a single page target
//! with flat session attachment: navigation, synthetic keyboard input, and
//! the browser-level download lifecycle.
//!
//! All the gallery-specific interaction quirks live here and nowhere else:
//! the right-arrow press that focuses the newest grid item, the Shift+D
//! download chord, and the injected click standing in for an unreliable
//! native click on the previous-item arrow.

use crate::error::{ErrorKind, Result};
use crate::{Download, GallerySurface, Locator};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, instrument, trace, warn};

/// Browser binaries probed, in order, when none is configured explicitly.
const BROWSER_CANDIDATES: &[&str] = &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"];

/// How long to keep polling the DevTools HTTP endpoint after spawning the
/// browser before declaring the launch dead.
const ENDPOINT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);
/// Poll interval for both endpoint discovery and locator-change waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// The grid needs a beat after load before keyboard focus behaves.
const GRID_SETTLE: Duration = Duration::from_millis(2000);
/// And another beat between the focus key press and reading the result.
const FOCUS_SETTLE: Duration = Duration::from_millis(500);

/// Everything needed to spawn and attach to a browser session.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Persistent profile directory carrying the authenticated session.
    pub session_dir: PathBuf,
    /// Run without a visible window. `setup` wants this off.
    pub headless: bool,
    /// Locale the browser renders under (`--lang`). Must match the locale
    /// the date resolver is configured with, since scraped labels are
    /// locale-rendered text.
    pub locale: String,
    /// IANA timezone identifier exported as `TZ` to the browser process.
    pub timezone: String,
    /// Explicit browser binary; otherwise well-known names are probed.
    pub browser_binary: Option<PathBuf>,
    /// DevTools debugging port.
    pub debug_port: u16,
    /// Upper bound on individual page navigations.
    pub navigation_timeout: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            session_dir: PathBuf::from("./session"),
            headless: true,
            locale: "en-US".to_string(),
            timezone: "UTC".to_string(),
            browser_binary: None,
            debug_port: 9222,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

/// An event pushed by the browser outside any request/response pair.
#[derive(Debug)]
struct CdpEvent {
    method: String,
    params: Value,
}

/// The WebSocket connection plus protocol bookkeeping. Lives behind a
/// `Mutex` in [`CdpSurface`] so trait methods can take `&self`; the engine
/// is strictly sequential so the lock is never contended.
struct Transport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    next_id: u64,
    /// Events that arrived while waiting for a command response. Consumed by
    /// [`Transport::wait_event`].
    events: VecDeque<CdpEvent>,
}

impl Transport {
    /// Issue one protocol command and block until its response arrives.
    /// Events interleaved with the response are queued, not dropped.
    async fn call(&mut self, session: Option<&str>, method: &str, params: Value) -> Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let mut message = json!({ "id": id, "method": method, "params": params });
        if let Some(session) = session {
            message["sessionId"] = json!(session);
        }
        trace!(method, id, "cdp send");
        self.stream
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| ErrorKind::Transport(e.to_string()))?;

        loop {
            let received = self.receive().await?;
            if received.get("id").and_then(Value::as_u64) == Some(id) {
                if let Some(error) = received.get("error") {
                    exn::bail!(ErrorKind::Protocol(format!("{method}: {error}")));
                }
                return Ok(received.get("result").cloned().unwrap_or(Value::Null));
            }
            self.queue_event(received);
        }
    }

    /// Block until an event satisfying `predicate` arrives (or was already
    /// queued). The caller wraps this in a timeout.
    async fn wait_event(&mut self, mut predicate: impl FnMut(&CdpEvent) -> bool) -> Result<CdpEvent> {
        if let Some(position) = self.events.iter().position(&mut predicate)
            && let Some(event) = self.events.remove(position)
        {
            return Ok(event);
        }
        loop {
            let received = self.receive().await?;
            if received.get("id").is_some() {
                // A response nobody is waiting for; stale, drop it.
                continue;
            }
            let Some(event) = Self::into_event(received) else {
                continue;
            };
            if predicate(&event) {
                return Ok(event);
            }
            self.events.push_back(event);
        }
    }

    /// Read the next text frame and parse it. Non-text frames are skipped
    /// (tungstenite answers pings internally).
    async fn receive(&mut self) -> Result<Value> {
        loop {
            let frame = self
                .stream
                .next()
                .await
                .ok_or_raise(|| ErrorKind::Transport("devtools connection closed".to_string()))?
                .map_err(|e| ErrorKind::Transport(e.to_string()))?;
            if let Message::Text(text) = frame {
                return serde_json::from_str(&text).or_raise(|| ErrorKind::Protocol("unparseable frame".to_string()));
            }
        }
    }

    fn queue_event(&mut self, received: Value) {
        if let Some(event) = Self::into_event(received) {
            self.events.push_back(event);
        }
    }

    fn into_event(mut received: Value) -> Option<CdpEvent> {
        let method = received.get("method")?.as_str()?.to_string();
        let params = received.get_mut("params").map(Value::take).unwrap_or(Value::Null);
        Some(CdpEvent { method, params })
    }
}

/// A live browser session implementing [`GallerySurface`].
///
/// # Examples
///
/// ```no_run
/// use picvault_surface::cdp::{CdpSurface, LaunchOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let surface = CdpSurface::launch(LaunchOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub struct CdpSurface {
    child: Mutex<Option<Child>>,
    transport: Mutex<Transport>,
    session_id: String,
    download_dir: PathBuf,
    navigation_timeout: Duration,
}

impl CdpSurface {
    /// Spawn the browser, attach to a fresh page target, and route its
    /// downloads into a scratch directory under the profile.
    #[instrument(skip_all, fields(headless = options.headless, locale = %options.locale))]
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let binary = Self::find_binary(options.browser_binary.as_deref())?;
        let download_dir = options.session_dir.join("picvault-downloads");
        tokio::fs::create_dir_all(&download_dir).await.map_err(ErrorKind::Io)?;

        let mut command = Command::new(&binary);
        command
            .arg(format!("--remote-debugging-port={}", options.debug_port))
            .arg(format!("--user-data-dir={}", options.session_dir.display()))
            .arg(format!("--lang={}", options.locale))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .env("TZ", &options.timezone)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if options.headless {
            command.arg("--headless=new");
        }
        let child = command.spawn().map_err(|e| ErrorKind::Launch(format!("{}: {e}", binary.display())))?;
        debug!(binary = %binary.display(), port = options.debug_port, "browser spawned");

        let ws_url = Self::discover_endpoint(options.debug_port).await?;
        let (stream, _response) = connect_async(&ws_url).await.map_err(|e| ErrorKind::Transport(e.to_string()))?;
        let mut transport = Transport { stream, next_id: 0, events: VecDeque::new() };

        let target = transport.call(None, "Target.createTarget", json!({ "url": "about:blank" })).await?;
        let target_id = target
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_raise(|| ErrorKind::Protocol("createTarget returned no targetId".to_string()))?
            .to_string();
        let attached = transport
            .call(None, "Target.attachToTarget", json!({ "targetId": target_id, "flatten": true }))
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_raise(|| ErrorKind::Protocol("attachToTarget returned no sessionId".to_string()))?
            .to_string();

        transport.call(Some(&session_id), "Page.enable", json!({})).await?;
        transport.call(Some(&session_id), "Runtime.enable", json!({})).await?;
        // `allowAndName` stores each download under its GUID, which the
        // lifecycle events also carry, so completed files can be located
        // without trusting the suggested filename.
        transport
            .call(
                None,
                "Browser.setDownloadBehavior",
                json!({
                    "behavior": "allowAndName",
                    "downloadPath": download_dir.display().to_string(),
                    "eventsEnabled": true,
                }),
            )
            .await?;

        Ok(Self {
            child: Mutex::new(Some(child)),
            transport: Mutex::new(transport),
            session_id,
            download_dir,
            navigation_timeout: options.navigation_timeout,
        })
    }

    /// Block until the operator closes the browser window. Used by the
    /// interactive `setup` flow.
    pub async fn wait_closed(&self) -> Result<()> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            child.wait().await.map_err(ErrorKind::Io)?;
        }
        Ok(())
    }

    fn find_binary(configured: Option<&std::path::Path>) -> Result<PathBuf> {
        if let Some(path) = configured {
            return Ok(path.to_path_buf());
        }
        BROWSER_CANDIDATES
            .iter()
            .find_map(|candidate| which::which(candidate).ok())
            .ok_or_raise(|| ErrorKind::Launch(format!("no browser found, tried {}", BROWSER_CANDIDATES.join(", "))))
    }

    /// Poll the DevTools HTTP endpoint until the freshly-spawned browser
    /// starts answering, then pull the WebSocket debugger URL out of
    /// `/json/version`.
    async fn discover_endpoint(port: u16) -> Result<String> {
        let url = format!("http://127.0.0.1:{port}/json/version");
        let client = reqwest::Client::new();
        let discovery = async {
            loop {
                if let Ok(response) = client.get(&url).send().await
                    && let Ok(body) = response.json::<Value>().await
                    && let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(Value::as_str)
                {
                    return ws_url.to_string();
                }
                sleep(POLL_INTERVAL).await;
            }
        };
        timeout(ENDPOINT_DISCOVERY_TIMEOUT, discovery).await.or_raise(|| ErrorKind::Timeout("devtools endpoint"))
    }

    /// Evaluate a JavaScript expression in the page, returning its value.
    async fn eval(&self, expression: &str, await_promise: bool) -> Result<Value> {
        let mut transport = self.transport.lock().await;
        let result = transport
            .call(
                Some(&self.session_id),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": await_promise,
                }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            exn::bail!(ErrorKind::Protocol(format!("evaluate threw: {exception}")));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut transport = self.transport.lock().await;
        let result = transport.call(Some(&self.session_id), "Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str)
            && !error_text.is_empty()
        {
            exn::bail!(ErrorKind::Protocol(format!("navigation to {url} failed: {error_text}")));
        }
        timeout(self.navigation_timeout, transport.wait_event(|event| event.method == "Page.loadEventFired"))
            .await
            .or_raise(|| ErrorKind::Timeout("page load"))??;
        Ok(())
    }

    /// Dispatch one full key press (down + up).
    async fn press_key(&self, key: &str, code: &str, key_code: u32, modifiers: u32) -> Result<()> {
        let mut transport = self.transport.lock().await;
        for kind in ["rawKeyDown", "keyUp"] {
            transport
                .call(
                    Some(&self.session_id),
                    "Input.dispatchKeyEvent",
                    json!({
                        "type": kind,
                        "key": key,
                        "code": code,
                        "windowsVirtualKeyCode": key_code,
                        "nativeVirtualKeyCode": key_code,
                        "modifiers": modifiers,
                    }),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GallerySurface for CdpSurface {
    async fn open(&self, root: &str) -> Result<()> {
        self.navigate(root).await
    }

    async fn current_locator(&self) -> Result<Locator> {
        let value = self.eval("window.location.href", false).await?;
        let href =
            value.as_str().ok_or_raise(|| ErrorKind::Protocol("location.href was not a string".to_string()))?;
        Ok(Locator::new(href))
    }

    #[instrument(skip(self))]
    async fn focus_newest(&self) -> Result<Option<Locator>> {
        // The first right-arrow press from the freshly-loaded grid moves
        // focus onto the newest item's anchor.
        sleep(GRID_SETTLE).await;
        self.press_key("ArrowRight", "ArrowRight", 39, 0).await?;
        sleep(FOCUS_SETTLE).await;
        let value = self
            .eval("document.activeElement instanceof HTMLAnchorElement ? document.activeElement.href : null", false)
            .await?;
        Ok(value.as_str().map(Locator::new))
    }

    async fn goto(&self, locator: &Locator) -> Result<()> {
        self.navigate(locator.as_str()).await
    }

    async fn request_previous(&self) -> Result<()> {
        // Neither a left-arrow key press nor a native protocol click lands
        // reliably on the previous-item arrow, so click it from inside the
        // page instead. The class name is the gallery's obfuscated one.
        // TODO: find a stable selector for the previous-item control.
        self.eval(
            "(() => { const el = document.getElementsByClassName('SxgK2b OQEhnd')[0]; if (el) el.click(); })()",
            false,
        )
        .await?;
        Ok(())
    }

    async fn await_locator_change(&self, old: &Locator, limit: Duration) -> Result<Locator> {
        let poll = async {
            loop {
                let current = self.current_locator().await?;
                if &current != old {
                    return Ok(current);
                }
                sleep(POLL_INTERVAL).await;
            }
        };
        timeout(limit, poll).await.or_raise(|| ErrorKind::Timeout("locator change"))?
    }

    #[instrument(skip(self))]
    async fn trigger_download(&self, limit: Duration) -> Result<Download> {
        // Shift+D is the gallery's download-original chord.
        self.press_key("D", "KeyD", 68, 8).await?;

        let mut transport = self.transport.lock().await;
        let begin = timeout(limit, transport.wait_event(|event| event.method == "Browser.downloadWillBegin"))
            .await
            .or_raise(|| ErrorKind::Timeout("download start"))??;
        let guid = begin
            .params
            .get("guid")
            .and_then(Value::as_str)
            .ok_or_raise(|| ErrorKind::Protocol("downloadWillBegin carried no guid".to_string()))?
            .to_string();
        let suggested_filename = begin
            .params
            .get("suggestedFilename")
            .and_then(Value::as_str)
            .unwrap_or("download.bin")
            .to_string();

        let done = timeout(
            limit,
            transport.wait_event(|event| {
                event.method == "Browser.downloadProgress"
                    && event.params.get("guid").and_then(Value::as_str) == Some(&guid)
                    && matches!(event.params.get("state").and_then(Value::as_str), Some("completed" | "canceled"))
            }),
        )
        .await
        .or_raise(|| ErrorKind::Timeout("download completion"))??;
        if done.params.get("state").and_then(Value::as_str) != Some("completed") {
            exn::bail!(ErrorKind::DownloadFailed);
        }

        Ok(Download { temp_path: self.download_dir.join(&guid), suggested_filename })
    }

    async fn fetch_raw_markup(&self, locator: &Locator) -> Result<String> {
        // Fetched from inside the page so the session's cookies ride along.
        let quoted = Value::String(locator.as_str().to_string()).to_string();
        let value = self.eval(&format!("fetch({quoted}).then(r => r.text())"), true).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_raise(|| ErrorKind::Protocol("markup fetch returned no text".to_string()))
    }

    async fn close(&self) -> Result<()> {
        {
            let mut transport = self.transport.lock().await;
            if let Err(error) = transport.call(None, "Browser.close", json!({})).await {
                warn!(%error, "browser refused graceful close, killing process");
            }
        }
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            // Graceful close may already have reaped it; a second kill is a
            // no-op either way.
            let _ = child.kill().await;
        }
        Ok(())
    }
}
