//! Message delivery: hand the draft to the user (console) or to Messages.app (iMessage).

use anyhow::{bail, Result};
use async_trait::async_trait;
use cakeday_core::{MessageTransport, SendOutcome};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TransportKind;

/// Prints the draft and asks whether it went out. For people who send from
/// their phone and only want the tracking.
pub struct ConsoleTransport;

fn parse_answer(answer: &str) -> SendOutcome {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "sent" => SendOutcome::Sent,
        "f" | "fail" | "failed" => SendOutcome::Failed,
        _ => SendOutcome::Cancelled,
    }
}

/// Closed input counts as "not sent".
fn read_confirmation<R: BufRead>(input: &mut R) -> io::Result<SendOutcome> {
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(SendOutcome::Cancelled);
    }
    Ok(parse_answer(&answer))
}

#[async_trait]
impl MessageTransport for ConsoleTransport {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome {
        let phone = phone.to_string();
        let body = body.to_string();
        let asked = tokio::task::spawn_blocking(move || -> io::Result<SendOutcome> {
            let mut out = io::stdout().lock();
            writeln!(out, "\n  To: {phone}\n  {body}\n")?;
            write!(out, "Did you send it? [y]es / [n]o / [f]ailed: ")?;
            out.flush()?;
            read_confirmation(&mut io::stdin().lock())
        })
        .await;

        match asked {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(error = %e, "could not read confirmation");
                SendOutcome::Failed
            }
            Err(e) => {
                warn!(error = %e, "confirmation prompt task failed");
                SendOutcome::Failed
            }
        }
    }
}

/// Sends through Messages.app with `osascript` (macOS only).
pub struct IMessageTransport {
    osascript: std::path::PathBuf,
}

impl IMessageTransport {
    pub fn new() -> Result<Self> {
        if !cfg!(target_os = "macos") {
            bail!("iMessage delivery is macOS-only; set [outreach].transport = \"console\"");
        }
        let osascript = which::which("osascript")
            .map_err(|_| anyhow::anyhow!("osascript not found on PATH"))?;
        Ok(Self { osascript })
    }
}

fn imessage_script(to: &str, text: &str) -> String {
    let escaped_to = escape_applescript(to);
    let escaped_text = escape_applescript(text);
    format!(
        r#"tell application "Messages"
    set targetService to 1st account whose service type = iMessage
    set targetBuddy to participant "{escaped_to}" of targetService
    send "{escaped_text}" to targetBuddy
end tell"#
    )
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

#[async_trait]
impl MessageTransport for IMessageTransport {
    async fn send(&self, phone: &str, body: &str) -> SendOutcome {
        let output = tokio::process::Command::new(&self.osascript)
            .arg("-e")
            .arg(imessage_script(phone, body))
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => {
                info!(to = phone, "sent iMessage");
                SendOutcome::Sent
            }
            Ok(o) => {
                warn!(to = phone, stderr = %String::from_utf8_lossy(&o.stderr), "iMessage send failed");
                SendOutcome::Failed
            }
            Err(e) => {
                warn!(error = %e, "running osascript");
                SendOutcome::Failed
            }
        }
    }
}

pub fn build_transport(kind: TransportKind) -> Result<Arc<dyn MessageTransport>> {
    Ok(match kind {
        TransportKind::Console => Arc::new(ConsoleTransport),
        TransportKind::Imessage => Arc::new(IMessageTransport::new()?),
    })
}
