//! Task trace: one JSONL line per record, framing every task with a
//! start and end record around its per-step records. The trace is an
//! observer of the loop; any failure here downgrades to a stderr note
//! and switches tracing off rather than disturbing the task.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum TraceRecord<'a> {
    TaskStart {
        at: String,
        task_id: &'a str,
        task: &'a str,
    },
    Step {
        at: String,
        task_id: &'a str,
        step: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        goal: Option<&'a str>,
        action: &'a str,
        output: &'a str,
    },
    TaskEnd {
        at: String,
        task_id: &'a str,
        success: bool,
        data: &'a str,
    },
}

fn stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Append-only trace writer for agent tasks. Each record is flushed as
/// it is written so the file is readable while the task still runs.
pub struct StepTrace {
    writer: Option<BufWriter<File>>,
}

impl StepTrace {
    /// Open (or create) the trace file. An unopenable path disables
    /// tracing for the session; the agent keeps running.
    pub fn open(path: &str) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                writer: Some(BufWriter::new(file)),
            },
            Err(e) => {
                eprintln!("trace disabled: '{}' cannot be opened: {}", path, e);
                Self { writer: None }
            }
        }
    }

    pub fn task_started(&mut self, task_id: &str, task: &str) {
        self.write(&TraceRecord::TaskStart {
            at: stamp(),
            task_id,
            task,
        });
    }

    pub fn step(
        &mut self,
        task_id: &str,
        step: u64,
        goal: Option<&str>,
        action: &str,
        output: &str,
    ) {
        self.write(&TraceRecord::Step {
            at: stamp(),
            task_id,
            step,
            goal,
            action,
            output,
        });
    }

    pub fn task_finished(&mut self, task_id: &str, success: bool, data: &str) {
        self.write(&TraceRecord::TaskEnd {
            at: stamp(),
            task_id,
            success,
            data,
        });
    }

    fn write(&mut self, record: &TraceRecord<'_>) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let outcome = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .and_then(|line| writeln!(writer, "{}", line))
            .and_then(|_| writer.flush());
        if let Err(e) = outcome {
            // One bad write means the sink is gone; stop trying.
            eprintln!("trace disabled after a failed write: {}", e);
            self.writer = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn temp_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "page-pilot-{}-{}.jsonl",
            tag,
            std::process::id()
        ))
    }

    #[test]
    fn records_frame_the_task() {
        let path = temp_path("frame");
        let _ = std::fs::remove_file(&path);
        let mut trace = StepTrace::open(&path.to_string_lossy());

        trace.task_started("t1", "find the docs");
        trace.step("t1", 1, Some("click the docs link"), "click_element_by_index", "Clicked");
        trace.task_finished("t1", true, "found them");

        let content = std::fs::read_to_string(&path).unwrap();
        let records: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["record"], "task_start");
        assert_eq!(records[1]["record"], "step");
        assert_eq!(records[1]["goal"], "click the docs link");
        assert_eq!(records[2]["record"], "task_end");
        assert_eq!(records[2]["success"], true);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_path_disables_tracing_silently() {
        // A directory path cannot be opened as a file.
        let mut trace = StepTrace::open(&std::env::temp_dir().to_string_lossy());
        trace.task_started("t1", "noop");
        trace.step("t1", 1, None, "wait", "Waited");
        trace.task_finished("t1", false, "nothing happened");
    }

    #[test]
    fn step_without_goal_omits_the_field() {
        let path = temp_path("no-goal");
        let _ = std::fs::remove_file(&path);
        let mut trace = StepTrace::open(&path.to_string_lossy());
        trace.step("t2", 1, None, "wait", "Waited");

        let content = std::fs::read_to_string(&path).unwrap();
        let record: Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert!(record.get("goal").is_none());
        let _ = std::fs::remove_file(&path);
    }
}
