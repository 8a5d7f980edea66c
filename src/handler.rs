//! Event handler sinks (spec Design Notes "keep handler execution
//! entirely outside the core"): the pipeline never runs arbitrary
//! handler code in-process. A `ProcessSink` spawns a child process per
//! event instead, the same `std::process::Command` idiom the Git Worker
//! uses for every git invocation.

use std::io::Write;
use std::process::{Command, Stdio};

use log::{info, warn};

use crate::event::Event;

pub trait HandlerSink {
    fn handle(&self, event: &Event);
}

/// Discards every event. Default when no handler is configured.
pub struct NullSink;

impl HandlerSink for NullSink {
    fn handle(&self, _event: &Event) {}
}

/// Routes every event through the `log` crate at `info` level, exactly
/// as the teacher's CLI reports progress.
pub struct LoggingSink;

impl HandlerSink for LoggingSink {
    fn handle(&self, event: &Event) {
        info!("{}", event.to_json());
    }
}

/// Spawns `command` once per event, piping the event's JSON encoding to
/// its stdin. Failures to spawn or a non-zero exit are logged, never
/// propagated — a misbehaving handler must not abort the pipeline.
pub struct ProcessSink {
    command: String,
    args: Vec<String>,
}

impl ProcessSink {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ProcessSink {
            command: command.into(),
            args,
        }
    }
}

impl HandlerSink for ProcessSink {
    fn handle(&self, event: &Event) {
        let mut child = match Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("failed to spawn handler {}: {e}", self.command);
                return;
            }
        };

        if let Some(stdin) = child.stdin.as_mut() {
            let payload = event.to_json().to_string();
            if let Err(e) = stdin.write_all(payload.as_bytes()) {
                warn!("failed to write to handler {}: {e}", self.command);
            }
        }

        match child.wait() {
            Ok(status) if !status.success() => {
                warn!("handler {} exited with {status}", self.command);
            }
            Err(e) => warn!("failed to wait on handler {}: {e}", self.command),
            Ok(_) => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{AuthRepoRecord, CommitsRecord};
    use crate::types::{FullName, Outcome};

    fn sample_event() -> Event {
        Event {
            event: Outcome::Succeeded,
            auth_repo: AuthRepoRecord {
                name: FullName {
                    namespace: "ns".to_string(),
                    name: "repo".to_string(),
                },
                path: "/tmp/ns/repo".to_string(),
                urls: vec!["https://example.com/ns/repo.git".to_string()],
                commits: CommitsRecord::default(),
            },
            target_repos: Default::default(),
            error_msg: None,
        }
    }

    #[test]
    fn null_sink_does_not_panic() {
        NullSink.handle(&sample_event());
    }

    #[test]
    fn process_sink_feeds_event_json_to_stdin() {
        let sink = ProcessSink::new("cat", vec![]);
        sink.handle(&sample_event());
    }
}
