use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::{EngineFactory, ResearchContext, ResearchEngine};
use crate::{ProgressSink, ResearchPhase, ResearchRequest, ResolvedConfig};

/// How long a finished engine may take to exit on its own before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// How to launch an external engine process.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEngineConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandEngineConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Factory for engines running out of process and speaking JSON lines on stdio.
#[derive(Debug, Clone)]
pub struct CommandEngineFactory {
    config: CommandEngineConfig,
}

impl CommandEngineFactory {
    pub fn new(config: CommandEngineConfig) -> Self {
        Self { config }
    }
}

impl EngineFactory for CommandEngineFactory {
    fn create(
        &self,
        config: &ResolvedConfig,
        request: &ResearchRequest,
    ) -> Result<Box<dyn ResearchEngine>> {
        Ok(Box::new(CommandEngine::new(
            self.config.clone(),
            config,
            request,
        )))
    }

    fn mode(&self) -> &'static str {
        "command"
    }
}

struct RunningEngine {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// Engine instance backed by a child process.
///
/// Protocol: stdin receives one `init` command carrying the request and the
/// resolved report options, then one command per phase. stdout carries the
/// engine's progress mappings; `phase_complete` ends a phase and `error`
/// fails it. The resolved configuration is the child's environment.
pub struct CommandEngine {
    launch: CommandEngineConfig,
    env: Vec<(&'static str, String)>,
    init: Value,
    running: Option<RunningEngine>,
}

impl CommandEngine {
    pub fn new(
        launch: CommandEngineConfig,
        config: &ResolvedConfig,
        request: &ResearchRequest,
    ) -> Self {
        let init = json!({
            "command": "init",
            "query": request.query,
            "documents": request.documents,
            "report_type": config.report_type.as_str(),
            "tone": config.tone.description(),
            "report_source": config.report_source.as_str(),
            "prompt_family": config.prompt_family.map(|family| family.as_str()),
            "doc_path": config.doc_path.as_ref().map(|path| path.display().to_string()),
        });
        Self {
            launch,
            env: config.env_vars(),
            init,
            running: None,
        }
    }

    async fn ensure_started(&mut self) -> Result<&mut RunningEngine> {
        if self.running.is_none() {
            let mut command = Command::new(&self.launch.program);
            command
                .args(&self.launch.args)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true);
            for key in ResolvedConfig::MANAGED_KEYS {
                command.env_remove(key);
            }
            command.envs(self.env.iter().map(|(key, value)| (*key, value.as_str())));

            let mut child = command
                .spawn()
                .with_context(|| format!("failed to launch engine `{}`", self.launch.program))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("engine stdin unavailable"))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| anyhow!("engine stdout unavailable"))?;
            info!(program = %self.launch.program, pid = ?child.id(), "engine process started");

            let mut running = RunningEngine {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            };
            send_line(&mut running.stdin, &self.init).await?;
            self.running = Some(running);
        }

        self.running
            .as_mut()
            .ok_or_else(|| anyhow!("engine process not running"))
    }

    async fn run_phase(
        &mut self,
        phase: ResearchPhase,
        sink: &mut dyn ProgressSink,
    ) -> Result<Value> {
        let running = self.ensure_started().await?;
        send_line(&mut running.stdin, &json!({"command": phase.as_str()})).await?;

        loop {
            let line = running
                .stdout
                .next_line()
                .await
                .context("failed to read engine output")?;
            let Some(line) = line else {
                let status = running.child.wait().await.ok();
                bail!("engine process exited during {phase} (status: {status:?})");
            };
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(err) => {
                    debug!(%phase, error = %err, "ignoring non-JSON engine output");
                    continue;
                }
            };

            match value.get("type").and_then(Value::as_str) {
                Some("phase_complete") => return Ok(value),
                Some("error") => {
                    let message = value
                        .get("output")
                        .and_then(Value::as_str)
                        .unwrap_or("engine reported an error without details");
                    bail!("{message}");
                }
                _ => sink.send_json(value).await?,
            }
        }
    }

    /// Close stdin and reap the child, killing it if it outlives the grace period.
    async fn shutdown(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        drop(running.stdin);
        let exited = match timeout(EXIT_GRACE, running.child.wait()).await {
            Ok(exited) => exited,
            Err(_) => {
                warn!(grace = ?EXIT_GRACE, "engine still running after its report; killing it");
                if let Err(err) = running.child.start_kill() {
                    warn!(error = %err, "failed to kill engine process");
                }
                running.child.wait().await
            }
        };
        match exited {
            Ok(status) if status.success() => debug!("engine process exited"),
            Ok(status) => warn!(%status, "engine process exited with failure status"),
            Err(err) => warn!(error = %err, "failed to reap engine process"),
        }
    }
}

async fn send_line(stdin: &mut ChildStdin, value: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    stdin
        .write_all(&line)
        .await
        .context("failed to write to engine stdin")?;
    stdin.flush().await.context("failed to flush engine stdin")?;
    Ok(())
}

#[async_trait]
impl ResearchEngine for CommandEngine {
    #[instrument(name = "engine.command.research", skip_all)]
    async fn conduct_research(&mut self, sink: &mut dyn ProgressSink) -> Result<ResearchContext> {
        let complete = self.run_phase(ResearchPhase::ConductResearch, sink).await?;
        let context = complete
            .get("metadata")
            .cloned()
            .map(serde_json::from_value::<ResearchContext>)
            .transpose()
            .context("invalid research metadata from engine")?
            .unwrap_or_default();
        Ok(context)
    }

    #[instrument(name = "engine.command.report", skip_all)]
    async fn write_report(&mut self, sink: &mut dyn ProgressSink) -> Result<String> {
        let complete = self.run_phase(ResearchPhase::WriteReport, sink).await?;
        self.shutdown().await;
        Ok(complete
            .get("output")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::{
        ConfigResolver, ProgressBridge, RecordingPort, Settings, SettingsProfile,
    };

    const ENGINE_SCRIPT: &str = r##"
while IFS= read -r line; do
  case "$line" in
    *'"init"'*) ;;
    *conduct_research*)
      echo 'not json'
      printf '{"type":"logs","output":"searching %s"}\n' "$RETRIEVER"
      echo '{"type":"phase_complete","metadata":{"sources":["https://example.com/tariffs"]}}'
      ;;
    *write_report*)
      echo '{"type":"report","output":"# Tariffs"}'
      echo '{"type":"phase_complete","output":"# Tariffs"}'
      ;;
  esac
done
"##;

    const LINGERING_SCRIPT: &str = r##"
while IFS= read -r line; do
  case "$line" in
    *conduct_research*) echo '{"type":"phase_complete"}' ;;
    *write_report*)
      echo '{"type":"report","output":"# done"}'
      echo '{"type":"phase_complete","output":"# done"}'
      exec sleep 60
      ;;
  esac
done
"##;

    const FAILING_SCRIPT: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *conduct_research*) echo '{"type":"error","output":"search backend unreachable"}' ;;
  esac
done
"#;

    fn engine(script: &str) -> Box<dyn ResearchEngine> {
        let request = ResearchRequest::new("impact of tariffs");
        let settings = Settings::defaults(SettingsProfile::Granite);
        let config = ConfigResolver::resolve(&settings, &request).unwrap();
        let launch = CommandEngineConfig::new("sh").with_args(vec!["-c".into(), script.into()]);
        CommandEngineFactory::new(launch)
            .create(&config, &request)
            .unwrap()
    }

    #[tokio::test]
    async fn drives_both_phases_over_stdio() {
        let mut engine = engine(ENGINE_SCRIPT);
        let mut bridge = ProgressBridge::new(RecordingPort::default());

        let context = engine.conduct_research(&mut bridge).await.unwrap();
        assert_eq!(context.sources, vec!["https://example.com/tariffs"]);
        let report = engine.write_report(&mut bridge).await.unwrap();

        assert_eq!(report, "# Tariffs");
        let result = bridge.result();
        assert_eq!(result.text, "# Tariffs");
        assert_eq!(result.logs.len(), 1);
        assert_eq!(result.logs[0].message, "searching duckduckgo");
    }

    #[tokio::test]
    async fn lingering_engine_is_killed_after_its_report() {
        let mut engine = engine(LINGERING_SCRIPT);
        let mut bridge = ProgressBridge::new(RecordingPort::default());

        engine.conduct_research(&mut bridge).await.unwrap();
        let report = tokio::time::timeout(
            EXIT_GRACE + Duration::from_secs(5),
            engine.write_report(&mut bridge),
        )
        .await
        .expect("write_report waited on a lingering engine")
        .unwrap();

        assert_eq!(report, "# done");
        assert_eq!(bridge.result().text, "# done");
    }

    #[tokio::test]
    async fn error_event_fails_the_phase() {
        let mut engine = engine(FAILING_SCRIPT);
        let mut bridge = ProgressBridge::new(RecordingPort::default());

        let err = engine.conduct_research(&mut bridge).await.unwrap_err();
        assert!(err.to_string().contains("search backend unreachable"));
    }

    #[tokio::test]
    async fn early_exit_is_reported() {
        let mut engine = engine("read init; read command; exit 3");
        let mut bridge = ProgressBridge::new(RecordingPort::default());

        let err = engine.conduct_research(&mut bridge).await.unwrap_err();
        assert!(err.to_string().contains("exited during conduct_research"));
    }
}
