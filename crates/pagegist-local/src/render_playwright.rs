use pagegist_core::{RenderOutcome, Renderer};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::VisitConfig;

fn node_path_candidates() -> Vec<String> {
    // Best-effort Node global module roots across common setups.
    let mut out: Vec<String> = Vec::new();

    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(
            home.join(".npm-global")
                .join("lib")
                .join("node_modules")
                .to_string_lossy()
                .to_string(),
        );
    }
    out.push("/opt/homebrew/lib/node_modules".to_string());
    out.push("/usr/local/lib/node_modules".to_string());
    out.push("/usr/lib/node_modules".to_string());
    out
}

fn detect_node_path_for_playwright() -> Option<String> {
    fn has_playwright(root: &str) -> bool {
        root.split(':')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .any(|p| std::path::Path::new(p).join("playwright").is_dir())
    }

    let existing = std::env::var("NODE_PATH").ok().unwrap_or_default();
    if has_playwright(&existing) {
        return None;
    }
    let found = node_path_candidates()
        .into_iter()
        .find(|root| has_playwright(root))?;
    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

fn check_url(url: &str) -> Result<(), String> {
    let u = url::Url::parse(url.trim()).map_err(|e| format!("invalid url {url:?}: {e}"))?;
    match u.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("unsupported url scheme: {other}")),
    }
}

// Stdout is JSON-only: exactly one object per run.
const JS: &str = r#"
const fs = require('fs');

function ok(obj) { process.stdout.write(JSON.stringify(obj)); }
function bad(message) { ok({ ok: false, error: { message } }); }

async function main() {
  let arg = '';
  try { arg = fs.readFileSync(0, 'utf8'); } catch (_) {}
  let req;
  try { req = JSON.parse(arg); } catch (e) { return bad('bad JSON args'); }

  let pw;
  try { pw = require('playwright'); } catch (e) {
    return bad('Playwright is not installed for Node.js (require("playwright") failed). Install with `npm i -g playwright && npx playwright install chromium`.');
  }

  let browser;
  try {
    browser = await pw.chromium.launch({ headless: true });
    const page = await browser.newPage();
    await page.goto(String(req.url), { timeout: Number(req.timeout_ms || 60000) });
    const html = await page.content();
    ok({ ok: true, html });
  } catch (e) {
    bad(String(e && e.message ? e.message : e));
  } finally {
    try { if (browser) await browser.close(); } catch (_) {}
  }
}

main().catch((e) => bad(String(e && e.message ? e.message : e)));
"#;

/// Renders a page by running headless Chromium (via Node + Playwright) in a child process.
///
/// One process per call, never pooled. If the child outlives `deadline` it is killed and the
/// call reports `RenderOutcome::Timeout`; partial output from a killed child is discarded.
#[derive(Debug, Clone)]
pub struct PlaywrightRenderer {
    node_bin: String,
    deadline: Duration,
    navigation_timeout: Duration,
}

impl PlaywrightRenderer {
    pub fn new(node_bin: impl Into<String>, deadline: Duration, navigation_timeout: Duration) -> Self {
        Self {
            node_bin: node_bin.into(),
            deadline,
            navigation_timeout,
        }
    }

    pub fn from_config(cfg: &VisitConfig) -> Self {
        Self::new(
            cfg.node_bin.clone(),
            cfg.render_deadline,
            cfg.navigation_timeout,
        )
    }

    async fn run_child(&self, url: &str) -> RenderOutcome {
        let args_json = serde_json::json!({
            "url": url,
            "timeout_ms": self.navigation_timeout.as_millis() as u64,
        })
        .to_string();

        let mut cmd = tokio::process::Command::new(&self.node_bin);
        if let Some(node_path) = detect_node_path_for_playwright() {
            cmd.env("NODE_PATH", node_path);
        }
        let mut child = match cmd
            .arg("-e")
            .arg(JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return RenderOutcome::Failure {
                    reason: format!(
                        "rendering requires Node.js (`{}`) and the Playwright npm package: {e}",
                        self.node_bin
                    ),
                }
            }
        };

        // `wait_with_output` consumes the child, which prevents killing it on timeout.
        // Read both pipes concurrently and `wait()` under the deadline instead.
        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take())
        else {
            return RenderOutcome::Failure {
                reason: "renderer child is missing its stdio pipes".to_string(),
            };
        };
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut stdout, &mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = tokio::io::AsyncReadExt::read_to_end(&mut stderr, &mut buf).await;
            buf
        });

        // The deadline covers handing over the args too: a child that never reads stdin
        // would otherwise block a large write forever.
        let stdin = child.stdin.take();
        let run = async {
            if let Some(mut stdin) = stdin {
                // If this fails the child reports bad args.
                let _ = stdin.write_all(args_json.as_bytes()).await;
                let _ = stdin.shutdown().await;
            }
            child.wait().await
        };

        match tokio::time::timeout(self.deadline, run).await {
            Ok(Ok(_status)) => {}
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return RenderOutcome::Failure {
                    reason: format!("waiting for renderer child failed: {e}"),
                };
            }
            Err(_) => {
                let _ = child.kill().await;
                // Reap it so no zombie is left behind.
                let _ = child.wait().await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::warn!(
                    url,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "renderer child exceeded its deadline; killed"
                );
                return RenderOutcome::Timeout;
            }
        }

        let out_stdout = stdout_task.await.unwrap_or_default();
        let out_stderr = stderr_task.await.unwrap_or_default();
        parse_child_stdout(&out_stdout, &out_stderr)
    }
}

/// Interpret the child's JSON stdout; a non-zero exit still gets a parse attempt.
fn parse_child_stdout(stdout: &[u8], stderr: &[u8]) -> RenderOutcome {
    let stdout = String::from_utf8_lossy(stdout);
    let v: serde_json::Value = match serde_json::from_str(stdout.trim()) {
        Ok(v) => v,
        Err(e) => {
            let stderr = String::from_utf8_lossy(stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("renderer returned invalid JSON: {e}")
            } else {
                format!("renderer returned invalid JSON: {e}. stderr: {stderr}")
            };
            return RenderOutcome::Failure { reason };
        }
    };

    if v.get("ok").and_then(|x| x.as_bool()) != Some(true) {
        let message = v
            .pointer("/error/message")
            .and_then(|x| x.as_str())
            .unwrap_or("Playwright render failed");
        return RenderOutcome::Failure {
            reason: message.to_string(),
        };
    }

    let html = v
        .get("html")
        .and_then(|x| x.as_str())
        .unwrap_or("")
        .to_string();
    RenderOutcome::Success { html }
}

#[async_trait::async_trait]
impl Renderer for PlaywrightRenderer {
    async fn render(&self, url: &str) -> RenderOutcome {
        if let Err(reason) = check_url(url) {
            return RenderOutcome::Failure { reason };
        }
        let t0 = std::time::Instant::now();
        let outcome = self.run_child(url).await;
        match &outcome {
            RenderOutcome::Success { html } => tracing::debug!(
                url,
                html_bytes = html.len(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                "page rendered"
            ),
            RenderOutcome::Failure { reason } => {
                tracing::warn!(url, %reason, "page render failed")
            }
            RenderOutcome::Timeout => {}
        }
        outcome
    }
}
