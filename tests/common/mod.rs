// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process fake workers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};

use conductor::config::ResolvedConfig;
use conductor::process::{LaunchedWorker, ProcessError, WorkerLauncher, WorkerSpec};
use conductor::rpc::{decode, encode, Notification, Request, Response, RpcMessage};
use conductor::runtime::Runtime;

/// What a fake worker does with one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Report progress, then answer with this result.
    Ok(Value),
    /// Answer with an error response.
    Fail(String),
    /// Never answer.
    Hang,
    /// Close the streams without answering.
    Die,
}

/// Decides the reply for `(tool, request, nth call to this tool)`.
pub type Script = Arc<dyn Fn(&str, &Request, usize) -> Reply + Send + Sync>;

/// Launches duplex-backed workers driven by a [`Script`].
///
/// Call counts are per tool and survive relaunches.
pub struct FakeLauncher {
    script: Script,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    launches: Mutex<HashMap<String, usize>>,
}

impl FakeLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(Mutex::new(HashMap::new())),
            launches: Mutex::new(HashMap::new()),
        }
    }

    pub fn launches(&self, tool: &str) -> usize {
        self.launches.lock().unwrap().get(tool).copied().unwrap_or(0)
    }

    pub fn calls(&self, tool: &str) -> usize {
        self.calls.lock().unwrap().get(tool).copied().unwrap_or(0)
    }
}

#[async_trait]
impl WorkerLauncher for FakeLauncher {
    async fn launch(&self, spec: &WorkerSpec, _workspace: &Path) -> Result<LaunchedWorker, ProcessError> {
        *self.launches.lock().unwrap().entry(spec.name.clone()).or_default() += 1;

        let (ours, theirs) = duplex(64 * 1024);
        let (reader, writer) = split(ours);
        let (their_reader, mut their_writer) = split(theirs);

        let tool = spec.name.clone();
        let script = Arc::clone(&self.script);
        let calls = Arc::clone(&self.calls);

        tokio::spawn(async move {
            let mut lines = BufReader::new(their_reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let Ok(RpcMessage::Request(req)) = decode(&line) else { continue };
                let nth = {
                    let mut calls = calls.lock().unwrap();
                    let count = calls.entry(tool.clone()).or_default();
                    *count += 1;
                    *count - 1
                };

                let frames = match script(&tool, &req, nth) {
                    Reply::Ok(result) => {
                        let note = Notification::new(
                            "progress",
                            json!({"progress": 0.5, "message": format!("{} working", tool), "requestId": req.id}),
                        );
                        vec![
                            encode(&note.into()).unwrap(),
                            encode(&Response::ok(req.id, result).into()).unwrap(),
                        ]
                    }
                    Reply::Fail(message) => {
                        vec![encode(&Response::error(req.id, -32000, message).into()).unwrap()]
                    }
                    Reply::Hang => continue,
                    Reply::Die => return,
                };

                for frame in frames {
                    if their_writer.write_all(frame.as_bytes()).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(LaunchedWorker::detached(Box::new(reader), Box::new(writer)))
    }
}

/// The patch each agent operation returns on the happy path.
pub fn pipeline_result(method: &str) -> Value {
    match method {
        "research" => json!({"researchContext": {"files": ["src/main.rs"], "notes": "cli uses clap"}}),
        "design" => json!({"architecture": {"approach": "add a flag to the Cli struct"}}),
        "generate" => json!({"generatedFiles": [{"path": "src/main.rs", "content": "..."}]}),
        "validate" => json!({"validationResults": {"checks": 3, "failures": 0}, "validationPassed": true}),
        "format_response" => json!({"userResponse": "Added the --verbose flag."}),
        "escalate" => json!({"userResponse": "A human will review this request."}),
        _ => json!({}),
    }
}

/// Every tool answers with [`pipeline_result`].
pub fn happy_script() -> Script {
    Arc::new(|_, req, _| Reply::Ok(pipeline_result(&req.method)))
}

/// Configuration with every tool served by the fake launcher and short timeouts.
pub fn test_config() -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    config.process.default_command = Some("fake-worker".to_string());
    config.timeouts.decision_ms = 500;
    config.timeouts.generation_ms = 500;
    config.timeouts.default_ms = 500;
    config
}

pub fn runtime(config: &ResolvedConfig, script: Script) -> (Runtime, Arc<FakeLauncher>) {
    let launcher = Arc::new(FakeLauncher::new(script));
    let runtime = Runtime::with_launcher(config, launcher.clone());
    (runtime, launcher)
}
