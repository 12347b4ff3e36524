use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::error::AgentError;
use crate::browser::driver::PageDriver;

/// Request sent to the browser sidecar over stdin (one JSON line).
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum BrowserRequest {
    Navigate { cmd: &'static str, url: String },
    Eval { cmd: &'static str, script: String },
    Click { cmd: &'static str, selector: String },
    Fill { cmd: &'static str, selector: String, value: String },
    SelectOption { cmd: &'static str, selector: String, label: String },
    Url { cmd: &'static str },
    Title { cmd: &'static str },
    Quit { cmd: &'static str },
}

impl BrowserRequest {
    pub fn navigate(url: &str) -> Self {
        BrowserRequest::Navigate { cmd: "navigate", url: url.to_string() }
    }

    pub fn eval(script: &str) -> Self {
        BrowserRequest::Eval { cmd: "eval", script: script.to_string() }
    }

    pub fn click(selector: &str) -> Self {
        BrowserRequest::Click { cmd: "click", selector: selector.to_string() }
    }

    pub fn fill(selector: &str, value: &str) -> Self {
        BrowserRequest::Fill {
            cmd: "fill",
            selector: selector.to_string(),
            value: value.to_string(),
        }
    }

    pub fn select_option(selector: &str, label: &str) -> Self {
        BrowserRequest::SelectOption {
            cmd: "select_option",
            selector: selector.to_string(),
            label: label.to_string(),
        }
    }

    pub fn url() -> Self {
        BrowserRequest::Url { cmd: "url" }
    }

    pub fn title() -> Self {
        BrowserRequest::Title { cmd: "title" }
    }

    pub fn quit() -> Self {
        BrowserRequest::Quit { cmd: "quit" }
    }
}

/// Response received from the sidecar over stdout (one JSON line).
#[derive(Debug, Deserialize)]
pub struct BrowserResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ready: Option<bool>,
    #[serde(default)]
    pub selected: Option<bool>,
}

/// A persistent browser page backed by a long-lived sidecar process
/// that keeps one Chromium page open. Commands are sent as NDJSON over
/// stdin, responses read from stdout. The sidecar applies a ~5s
/// timeout to each element action and clears fields before filling.
pub struct BrowserSession {
    child: Child,
    stdin: std::process::ChildStdin,
    reader: BufReader<std::process::ChildStdout>,
    closed: bool,
}

impl BrowserSession {
    /// Launch the sidecar (`node <server_script>`) and wait for its
    /// ready signal.
    pub fn launch(server_script: &str) -> Result<Self, AgentError> {
        let mut child = Command::new("node")
            .arg(server_script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AgentError::SidecarLaunch {
                script: server_script.to_string(),
                source: e,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::SessionIO("sidecar stdin was not piped".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::SessionIO("sidecar stdout was not piped".into()))?;

        let mut reader = BufReader::new(stdout);

        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|e| AgentError::SessionIO(format!("could not read the ready line: {}", e)))?;

        let response: BrowserResponse =
            serde_json::from_str(line.trim()).map_err(|e| AgentError::Json {
                context: "decoding the sidecar ready line".into(),
                source: e,
            })?;

        if !response.ok || response.ready != Some(true) {
            return Err(AgentError::SessionProtocol {
                command: "launch".into(),
                error: "sidecar did not announce ready".into(),
            });
        }

        Ok(BrowserSession {
            child,
            stdin,
            reader,
            closed: false,
        })
    }

    /// Send a request and read the response.
    fn send(&mut self, request: &BrowserRequest) -> Result<BrowserResponse, AgentError> {
        let json = serde_json::to_string(request).map_err(|e| AgentError::Json {
            context: "encoding a sidecar request".into(),
            source: e,
        })?;

        writeln!(self.stdin, "{}", json)
            .map_err(|e| AgentError::SessionIO(format!("writing a request failed: {}", e)))?;

        self.stdin
            .flush()
            .map_err(|e| AgentError::SessionIO(format!("flushing the request pipe failed: {}", e)))?;

        let mut line = String::new();
        self.reader
            .read_line(&mut line)
            .map_err(|e| AgentError::SessionIO(format!("reading a response failed: {}", e)))?;

        if line.trim().is_empty() {
            return Err(AgentError::SessionIO(
                "sidecar closed its stdout before answering".into(),
            ));
        }

        serde_json::from_str(line.trim()).map_err(|e| AgentError::Json {
            context: "decoding a sidecar response".into(),
            source: e,
        })
    }

    /// Send a request and verify it succeeded.
    fn send_ok(
        &mut self,
        request: &BrowserRequest,
        command_name: &str,
    ) -> Result<BrowserResponse, AgentError> {
        let response = self.send(request)?;
        if !response.ok {
            return Err(AgentError::SessionProtocol {
                command: command_name.into(),
                error: response.error.unwrap_or_else(|| "Unknown error".into()),
            });
        }
        Ok(response)
    }
}

impl PageDriver for BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), AgentError> {
        self.send_ok(&BrowserRequest::navigate(url), "navigate")?;
        Ok(())
    }

    fn eval(&mut self, script: &str) -> Result<Value, AgentError> {
        let response = self.send_ok(&BrowserRequest::eval(script), "eval")?;
        Ok(response.data.unwrap_or(Value::Null))
    }

    fn click(&mut self, selector: &str) -> Result<(), AgentError> {
        self.send_ok(&BrowserRequest::click(selector), "click")?;
        Ok(())
    }

    fn fill(&mut self, selector: &str, text: &str) -> Result<(), AgentError> {
        self.send_ok(&BrowserRequest::fill(selector, text), "fill")?;
        Ok(())
    }

    fn select_option(&mut self, selector: &str, label: &str) -> Result<bool, AgentError> {
        let response = self.send_ok(&BrowserRequest::select_option(selector, label), "select_option")?;
        Ok(response.selected.unwrap_or(false))
    }

    fn url(&mut self) -> Result<String, AgentError> {
        let response = self.send_ok(&BrowserRequest::url(), "url")?;
        response.url.ok_or_else(|| AgentError::SessionProtocol {
            command: "url".into(),
            error: "No URL in response".into(),
        })
    }

    fn title(&mut self) -> Result<String, AgentError> {
        let response = self.send_ok(&BrowserRequest::title(), "title")?;
        response.title.ok_or_else(|| AgentError::SessionProtocol {
            command: "title".into(),
            error: "No title in response".into(),
        })
    }

    fn close(&mut self) -> Result<(), AgentError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Best-effort quit; the process may already be gone.
        let _ = self.send(&BrowserRequest::quit());
        let _ = self.child.wait();
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
