//! CDP browser session: a thin client over `tokio-tungstenite`.
//!
//! Launches a headless Chrome with a debugging port, connects to the page
//! WebSocket, and pumps commands through a handler task that pairs request
//! IDs with responses. Only the handful of CDP commands this crate needs
//! are implemented.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::error::BrowserError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingTx = oneshot::Sender<Result<Value, String>>;

const CDP_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// JS function locating a clickable element by text, label, or selector,
/// and clicking it.
const CLICK_FN: &str = r#"(target) => {
    const norm = (s) => (s || '').trim().toLowerCase();
    const wanted = norm(target);
    const clickables = Array.from(document.querySelectorAll(
        'button, a, input[type="submit"], input[type="button"], [role="button"]'));
    let el = clickables.find((c) => norm(c.innerText || c.value) === wanted)
        || clickables.find((c) => norm(c.innerText || c.value).includes(wanted) && wanted.length > 2);
    if (!el) {
        try { el = document.querySelector(target); } catch (e) { el = null; }
    }
    if (!el) return 'notfound';
    el.click();
    return 'clicked';
}"#;

/// JS function locating a form field by label, placeholder, name, id, or
/// selector, and filling it.
const FILL_FN: &str = r#"(field, value) => {
    const norm = (s) => (s || '').trim().toLowerCase();
    const wanted = norm(field);
    const inputs = Array.from(document.querySelectorAll('input, textarea'))
        .filter((i) => i.type !== 'hidden');
    const labelOf = (i) => (i.labels && i.labels[0] && i.labels[0].innerText)
        || i.getAttribute('aria-label') || i.placeholder || i.name || i.id || '';
    let el = inputs.find((i) => norm(labelOf(i)) === wanted)
        || inputs.find((i) => norm(labelOf(i)).includes(wanted) && wanted.length > 1);
    if (!el) {
        try { el = document.querySelector(field); } catch (e) { el = null; }
    }
    if (!el) return 'notfound';
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return 'filled';
}"#;

/// JS function selecting a dropdown option by visible text or value.
const SELECT_FN: &str = r#"(field, value) => {
    const norm = (s) => (s || '').trim().toLowerCase();
    const wanted = norm(field);
    const selects = Array.from(document.querySelectorAll('select'));
    const labelOf = (s) => (s.labels && s.labels[0] && s.labels[0].innerText)
        || s.getAttribute('aria-label') || s.name || s.id || '';
    let el = selects.find((s) => norm(labelOf(s)) === wanted)
        || selects.find((s) => norm(labelOf(s)).includes(wanted) && wanted.length > 1);
    if (!el) {
        try { el = document.querySelector(field); } catch (e) { el = null; }
        if (el && el.tagName !== 'SELECT') el = null;
    }
    if (!el) return 'notfound';
    const target = norm(value);
    const option = Array.from(el.options).find(
        (o) => norm(o.value) === target || norm(o.innerText) === target);
    if (!option) return 'nooption';
    el.value = option.value;
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return 'selected';
}"#;

/// JS function tagging a file input so the CDP layer can address it by a
/// stable selector.
const MARK_FILE_INPUT_FN: &str = r#"(field) => {
    const norm = (s) => (s || '').trim().toLowerCase();
    const wanted = norm(field);
    const inputs = Array.from(document.querySelectorAll('input[type="file"]'));
    const labelOf = (i) => (i.labels && i.labels[0] && i.labels[0].innerText)
        || i.getAttribute('aria-label') || i.name || i.id || '';
    let el = inputs.find((i) => norm(labelOf(i)) === wanted)
        || inputs.find((i) => norm(labelOf(i)).includes(wanted) && wanted.length > 1)
        || (inputs.length === 1 ? inputs[0] : null);
    if (!el) {
        try { el = document.querySelector(field); } catch (e) { el = null; }
        if (el && el.type !== 'file') el = null;
    }
    if (!el) return 'notfound';
    document.querySelectorAll('[data-upload-target]')
        .forEach((n) => n.removeAttribute('data-upload-target'));
    el.setAttribute('data-upload-target', '1');
    return 'marked';
}"#;

/// JS expression producing a structured description of the page: URL,
/// title, form fields with fill state, clickable labels, visible text.
const SNAPSHOT_JS: &str = r#"(() => {
    const parts = [];
    parts.push('URL: ' + location.href);
    parts.push('TITLE: ' + document.title);
    const fields = [];
    document.querySelectorAll('input, textarea, select').forEach((el) => {
        if (el.type === 'hidden') return;
        const label = (el.labels && el.labels[0] && el.labels[0].innerText)
            || el.getAttribute('aria-label') || el.placeholder || el.name || el.id || '(unlabeled)';
        const kind = el.tagName === 'SELECT' ? 'select' : (el.type || 'text');
        const state = (el.type === 'checkbox' || el.type === 'radio')
            ? (el.checked ? 'checked' : 'unchecked')
            : (el.value ? 'filled' : 'empty');
        fields.push('- [' + kind + '] ' + label.trim() + ' (' + state + ')');
    });
    if (fields.length) parts.push('FORM FIELDS:\n' + fields.join('\n'));
    const buttons = [];
    document.querySelectorAll(
        'button, a[href], input[type="submit"], [role="button"]').forEach((el) => {
        const text = (el.innerText || el.value || '').trim().replace(/\s+/g, ' ');
        if (text && text.length < 80) buttons.push('- ' + text);
    });
    if (buttons.length) parts.push('BUTTONS/LINKS:\n' + buttons.slice(0, 40).join('\n'));
    const text = document.body ? document.body.innerText : '';
    parts.push('VISIBLE TEXT:\n' + text.slice(0, 4000));
    return parts.join('\n');
})()"#;

struct CdpCommand {
    method: String,
    params: Value,
    response_tx: PendingTx,
}

/// A live CDP session over one headless Chrome page.
pub struct CdpSession {
    cmd_tx: mpsc::Sender<CdpCommand>,
    chrome_process: Mutex<Option<Child>>,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl CdpSession {
    /// Launch a headless Chrome and connect to its page WebSocket.
    pub async fn launch(chrome_path: &std::path::Path) -> Result<Self, BrowserError> {
        let port = free_port()?;

        let mut child = Command::new(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--remote-debugging-port={port}"))
            .arg("--window-size=1280,900")
            .arg("about:blank")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed {
                context: e.to_string(),
            })?;

        let ws_url = wait_for_ws_url(port, &mut child).await?;

        let (ws, _) = connect_async(&ws_url)
            .await
            .map_err(|e| BrowserError::LaunchFailed {
                context: format!("websocket connect: {e}"),
            })?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<CdpCommand>(64);
        let handler = tokio::spawn(cdp_handler_loop(ws, cmd_rx));

        let session = Self {
            cmd_tx,
            chrome_process: Mutex::new(Some(child)),
            handler: Mutex::new(Some(handler)),
        };

        let _ = session.send_cdp("Page.enable", json!({})).await;
        let _ = session.send_cdp("Runtime.enable", json!({})).await;
        Ok(session)
    }

    async fn send_cdp(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(CdpCommand {
                method: method.into(),
                params,
                response_tx: tx,
            })
            .await
            .map_err(|_| BrowserError::Cdp("handler closed".into()))?;

        let result = tokio::time::timeout(Duration::from_millis(CDP_COMMAND_TIMEOUT_MS), rx)
            .await
            .map_err(|_| BrowserError::Timeout {
                timeout_ms: CDP_COMMAND_TIMEOUT_MS,
                context: method.to_owned(),
            })?
            .map_err(|_| BrowserError::Cdp("response dropped".into()))?;

        result.map_err(BrowserError::Cdp)
    }

    /// Evaluate a JS expression, returning its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .send_cdp(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(Value::as_str)
                .unwrap_or("uncaught exception");
            return Err(BrowserError::Script(text.to_owned()));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Call one of the locator functions with JSON-encoded arguments.
    async fn call_fn(&self, function: &str, args: &[&str]) -> Result<String, BrowserError> {
        let encoded: Vec<String> = args
            .iter()
            .map(|a| serde_json::to_string(a).unwrap_or_else(|_| "\"\"".into()))
            .collect();
        let expression = format!("({function})({})", encoded.join(", "));
        let value = self.evaluate(&expression).await?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    /// Navigate and wait for the document to become interactive.
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let result = self
            .send_cdp("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            if !error_text.is_empty() {
                return Err(BrowserError::Cdp(format!("navigation failed: {error_text}")));
            }
        }
        self.wait_for_ready(10).await
    }

    /// Poll `document.readyState` until the page settles or the budget runs
    /// out. Never fails on a slow page; the snapshot shows what loaded.
    pub async fn wait_for_ready(&self, max_seconds: u64) -> Result<(), BrowserError> {
        for _ in 0..max_seconds.saturating_mul(4) {
            match self.evaluate("document.readyState").await {
                Ok(Value::String(state)) if state == "complete" || state == "interactive" => {
                    return Ok(());
                }
                Ok(_) => {}
                Err(BrowserError::Script(_)) => {}
                Err(e) => return Err(e),
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        Ok(())
    }

    /// Structured page description.
    pub async fn snapshot(&self) -> Result<String, BrowserError> {
        let value = self.evaluate(SNAPSHOT_JS).await?;
        Ok(value.as_str().unwrap_or("(empty page)").to_owned())
    }

    /// Click an element. Returns `"clicked"` or `"notfound"`.
    pub async fn click(&self, target: &str) -> Result<String, BrowserError> {
        self.call_fn(CLICK_FN, &[target]).await
    }

    /// Fill a field. Returns `"filled"` or `"notfound"`.
    pub async fn fill(&self, field: &str, value: &str) -> Result<String, BrowserError> {
        self.call_fn(FILL_FN, &[field, value]).await
    }

    /// Select an option. Returns `"selected"`, `"nooption"`, or `"notfound"`.
    pub async fn select_option(&self, field: &str, value: &str) -> Result<String, BrowserError> {
        self.call_fn(SELECT_FN, &[field, value]).await
    }

    /// Attach a local file to a file input. Returns `"uploaded"` or
    /// `"notfound"`.
    pub async fn upload_file(&self, field: &str, path: &str) -> Result<String, BrowserError> {
        if self.call_fn(MARK_FILE_INPUT_FN, &[field]).await? != "marked" {
            return Ok("notfound".to_owned());
        }

        let document = self.send_cdp("DOM.getDocument", json!({})).await?;
        let root_id = document
            .get("root")
            .and_then(|r| r.get("nodeId"))
            .and_then(Value::as_i64)
            .ok_or_else(|| BrowserError::Cdp("DOM.getDocument returned no root".into()))?;

        let node = self
            .send_cdp(
                "DOM.querySelector",
                json!({ "nodeId": root_id, "selector": "[data-upload-target]" }),
            )
            .await?;
        let node_id = node.get("nodeId").and_then(Value::as_i64).unwrap_or(0);
        if node_id == 0 {
            return Ok("notfound".to_owned());
        }

        let _ = self
            .send_cdp(
                "DOM.setFileInputFiles",
                json!({ "nodeId": node_id, "files": [path] }),
            )
            .await?;
        Ok("uploaded".to_owned())
    }

    /// Scroll the page by a signed pixel delta.
    pub async fn scroll_by(&self, delta_y: i64) -> Result<(), BrowserError> {
        let _ = self
            .evaluate(&format!("window.scrollBy(0, {delta_y})"))
            .await?;
        Ok(())
    }

    /// Capture a screenshot as base64 PNG.
    pub async fn screenshot(&self) -> Result<String, BrowserError> {
        let result = self
            .send_cdp("Page.captureScreenshot", json!({ "format": "png" }))
            .await?;
        result
            .get("data")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| BrowserError::Cdp("captureScreenshot returned no data".into()))
    }

    /// Current page URL.
    pub async fn current_url(&self) -> Result<String, BrowserError> {
        let value = self.evaluate("window.location.href").await?;
        Ok(value.as_str().unwrap_or("about:blank").to_owned())
    }

    /// Tear down the session: close the socket pump and kill Chrome.
    /// Safe to call more than once.
    pub async fn close(&self) {
        if let Some(handle) = self.handler.lock().await.take() {
            handle.abort();
        }
        if let Some(mut child) = self.chrome_process.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill chrome process");
            }
        }
    }
}

fn free_port() -> Result<u16, BrowserError> {
    let listener =
        std::net::TcpListener::bind("127.0.0.1:0").map_err(|e| BrowserError::LaunchFailed {
            context: format!("bind port: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::LaunchFailed {
            context: format!("local_addr: {e}"),
        })?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll the debugging endpoint until Chrome exposes a page target.
async fn wait_for_ws_url(port: u16, child: &mut Child) -> Result<String, BrowserError> {
    let list_url = format!("http://127.0.0.1:{port}/json/list");
    for _ in 0..50 {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(BrowserError::LaunchFailed {
                context: format!("chrome exited early: {status}"),
            });
        }

        if let Ok(response) = reqwest::get(&list_url).await {
            if let Ok(targets) = response.json::<Value>().await {
                let page_ws = targets.as_array().and_then(|items| {
                    items
                        .iter()
                        .find(|t| t.get("type").and_then(Value::as_str) == Some("page"))
                        .and_then(|t| t.get("webSocketDebuggerUrl"))
                        .and_then(Value::as_str)
                });
                if let Some(ws) = page_ws {
                    return Ok(ws.to_owned());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Err(BrowserError::LaunchFailed {
        context: "debugging endpoint never became ready".into(),
    })
}

/// Pump CDP commands out and pair responses back by request ID.
async fn cdp_handler_loop(mut ws: WsStream, mut cmd_rx: mpsc::Receiver<CdpCommand>) {
    let mut next_id: u64 = 0;
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();

    loop {
        tokio::select! {
            command = cmd_rx.recv() => {
                let Some(command) = command else { break };
                next_id += 1;
                let payload = json!({
                    "id": next_id,
                    "method": command.method,
                    "params": command.params,
                })
                .to_string();
                let _ = pending.insert(next_id, command.response_tx);
                if let Err(e) = ws.send(Message::Text(payload.into())).await {
                    if let Some(tx) = pending.remove(&next_id) {
                        let _ = tx.send(Err(format!("websocket send failed: {e}")));
                    }
                    break;
                }
            }
            message = ws.next() => {
                let Some(Ok(message)) = message else { break };
                let Ok(text) = message.to_text() else { continue };
                let Ok(parsed) = serde_json::from_str::<Value>(text) else { continue };
                let Some(id) = parsed.get("id").and_then(Value::as_u64) else {
                    // Unsolicited event; this client does not subscribe to any.
                    continue;
                };
                if let Some(tx) = pending.remove(&id) {
                    let outcome = if let Some(error) = parsed.get("error") {
                        Err(error
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("unknown cdp error")
                            .to_owned())
                    } else {
                        Ok(parsed.get("result").cloned().unwrap_or(Value::Null))
                    };
                    let _ = tx.send(outcome);
                }
            }
        }
    }

    debug!("cdp handler loop exited");
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err("session closed".into()));
    }
}
