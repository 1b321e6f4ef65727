//! Execution supervisor
//!
//! Owns the lifecycle of one isolated execution: build the invocation, launch
//! it under a deadline, classify how it ended and decode its output. Every path
//! ends in an `ExecutionResult`; nothing is returned as an error.

use std::path::Path;
use tracing::{debug, info, warn};

use super::config::SandboxConfig;
use super::policy::{encode_flags, CapabilityConfig};
use crate::core::{ExecutionRequest, ExecutionResult};
use crate::error::{ConfigError, SandboxError};
use crate::runner::{CommandSpec, ProcessRunner, RunOutcome, RunStatus, Runner};

/// Launcher subcommand that executes a script
const RUN_SUBCOMMAND: &str = "run";

/// Runs untrusted code through the runtime launcher with per-request permissions.
///
/// Holds no per-execution state, so one instance can serve concurrent calls.
#[derive(Debug, Clone)]
pub struct Sandbox<R = ProcessRunner> {
    config: SandboxConfig,
    runner: R,
}

impl Sandbox<ProcessRunner> {
    /// Create a sandbox; fails if the entry script does not exist
    pub fn new(config: SandboxConfig) -> Result<Self, ConfigError> {
        Self::with_runner(config, ProcessRunner::new())
    }
}

impl<R: Runner> Sandbox<R> {
    pub fn with_runner(config: SandboxConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Full launcher invocation: `<launcher> run [flags...] <entry script> <code>`
    pub fn invocation(&self, capabilities: &CapabilityConfig, code: &str) -> CommandSpec {
        build_invocation(
            &self.config.launcher,
            &self.config.entry_script,
            capabilities,
            code,
        )
    }

    /// Run one request to completion, blocking the calling thread.
    ///
    /// Inside an async runtime the execution is driven on a separate thread, so
    /// the caller's runtime is never re-entered. Prefer [`Sandbox::execute`] there.
    pub fn run(&self, request: &ExecutionRequest) -> ExecutionResult {
        if tokio::runtime::Handle::try_current().is_err() {
            return self.run_on_own_runtime(request);
        }

        debug!("Blocking run called inside a runtime, using a helper thread");
        std::thread::scope(|scope| {
            scope
                .spawn(|| self.run_on_own_runtime(request))
                .join()
                .unwrap_or_else(|_| {
                    SandboxError::Runtime(std::io::Error::other("execution thread panicked"))
                        .into()
                })
        })
    }

    fn run_on_own_runtime(&self, request: &ExecutionRequest) -> ExecutionResult {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => return SandboxError::Runtime(e).into(),
        };
        runtime.block_on(self.execute(request))
    }

    /// Run one request to completion.
    ///
    /// Dropping the returned future before it completes kills the runtime process.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let cmd = self.invocation(&request.capabilities, &request.code);
        debug!(
            "Invocation: {:?} (code: {} bytes)",
            &cmd.args[..cmd.args.len() - 1],
            request.code.len()
        );

        let result = match self.runner.run(&cmd, self.config.timeout).await {
            Ok(outcome) => classify(outcome),
            Err(e) => {
                warn!("Execution could not be supervised: {}", e);
                e.into()
            }
        };

        info!(
            "Execution finished: success={}, output={} bytes, error={} bytes",
            result.success,
            result.output.len(),
            result.error.len()
        );
        result
    }
}

fn build_invocation(
    launcher: &str,
    entry_script: &Path,
    capabilities: &CapabilityConfig,
    code: &str,
) -> CommandSpec {
    CommandSpec::new(launcher)
        .arg(RUN_SUBCOMMAND)
        .args(encode_flags(capabilities))
        .arg(entry_script.to_string_lossy())
        .arg(code)
}

/// Map how the child ended onto a result
fn classify(outcome: RunOutcome) -> ExecutionResult {
    match outcome.status {
        RunStatus::TimedOut => ExecutionResult::timed_out(),
        RunStatus::Exited(0) => ExecutionResult::decode(&outcome.stdout),
        RunStatus::Exited(code) => {
            debug!("Runtime exited with status {}", code);
            ExecutionResult::failure(outcome.stderr)
        }
        RunStatus::Signaled(signal) => {
            debug!("Runtime killed by signal {}", signal);
            ExecutionResult::failure(outcome.stderr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::NetworkPolicy;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Runner that replays a canned outcome
    struct Canned(fn() -> Result<RunOutcome, SandboxError>);

    #[async_trait]
    impl Runner for Canned {
        async fn run(&self, _: &CommandSpec, _: Duration) -> Result<RunOutcome, SandboxError> {
            (self.0)()
        }
    }

    fn canned(
        outcome: fn() -> Result<RunOutcome, SandboxError>,
    ) -> (tempfile::TempDir, Sandbox<Canned>) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("core.ts");
        std::fs::write(&script, "").unwrap();
        let sandbox = Sandbox::with_runner(SandboxConfig::new("deno", script), Canned(outcome))
            .unwrap();
        (dir, sandbox)
    }

    fn exited(code: i32, stdout: &str, stderr: &str) -> RunOutcome {
        RunOutcome {
            status: RunStatus::Exited(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_invocation_shape() {
        let caps = CapabilityConfig::default()
            .with_network(NetworkPolicy::allow_list(["api.github.com", "x.org"]))
            .with_env_access(true);
        let cmd = build_invocation("deno", Path::new("/srv/core.ts"), &caps, "print('hi')");
        assert_eq!(
            cmd.to_vec(),
            vec![
                "deno",
                "run",
                "--allow-net=api.github.com,x.org",
                "--allow-read",
                "--allow-env",
                "/srv/core.ts",
                "print('hi')",
            ]
        );
    }

    #[test]
    fn test_invocation_without_permissions() {
        let cmd = build_invocation(
            "deno",
            Path::new("core.ts"),
            &CapabilityConfig::locked_down(),
            "x = 1\nprint(x)",
        );
        assert_eq!(cmd.args, vec!["run", "core.ts", "x = 1\nprint(x)"]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(exited(0, r#"{"output":"hi","error":"","success":true}"#, "")),
            ExecutionResult::ok("hi")
        );
        assert_eq!(
            classify(exited(0, "hello world", "warning")),
            ExecutionResult::ok("hello world")
        );
        assert_eq!(
            classify(exited(1, "ignored", "boom")),
            ExecutionResult::failure("boom")
        );
        assert_eq!(
            classify(RunOutcome {
                status: RunStatus::Signaled(9),
                stdout: "ignored".into(),
                stderr: "killed\n".into(),
            }),
            ExecutionResult::failure("killed\n")
        );
        assert_eq!(classify(RunOutcome::timed_out()), ExecutionResult::timed_out());
    }

    #[test]
    fn test_runner_error_becomes_failed_result() {
        let (_dir, sandbox) = canned(|| {
            Err(SandboxError::Spawn {
                program: "deno".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            })
        });
        let result = tokio_test::block_on(sandbox.execute(&ExecutionRequest::new("print(1)")));
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert_eq!(result.error, "failed to spawn `deno`: not found");
    }

    #[test]
    fn test_blocking_run_uses_runner() {
        let (_dir, sandbox) = canned(|| Ok(exited(0, "{\"output\":\"3\",\"success\":true}\n", "")));
        assert_eq!(
            sandbox.run(&ExecutionRequest::new("print(1 + 2)")),
            ExecutionResult::ok("3")
        );
    }

    #[tokio::test]
    async fn test_blocking_run_inside_runtime() {
        let (_dir, sandbox) = canned(|| Ok(exited(0, "{\"output\":\"3\",\"success\":true}", "")));
        assert_eq!(
            sandbox.run(&ExecutionRequest::new("print(1 + 2)")),
            ExecutionResult::ok("3")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_run_inside_multi_thread_runtime() {
        let (_dir, sandbox) = canned(|| Ok(exited(2, "", "boom")));
        assert_eq!(
            sandbox.run(&ExecutionRequest::new("raise")),
            ExecutionResult::failure("boom")
        );
    }

    #[test]
    fn test_new_rejects_missing_entry_script() {
        let err = Sandbox::new(SandboxConfig::new("deno", "/nonexistent/core.ts")).unwrap_err();
        assert!(matches!(err, ConfigError::EntryScriptMissing(_)));
    }
}

#[cfg(all(test, unix))]
mod process_tests {
    use super::*;
    use crate::sandbox::NetworkPolicy;
    use crate::test_support::{entry_script, fake_launcher, is_running};
    use std::time::Duration;

    fn sandbox(dir: &Path, body: &str, timeout: Duration) -> Sandbox {
        let launcher = fake_launcher(dir, body);
        let config = SandboxConfig::new(launcher.to_string_lossy(), entry_script(dir))
            .with_timeout(timeout);
        Sandbox::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_structured_success() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(
            dir.path(),
            r#"echo '{"output":"hi","error":"","success":true}'"#,
            Duration::from_secs(10),
        );
        let result = sandbox.execute(&ExecutionRequest::new("print('hi')")).await;
        assert_eq!(result, ExecutionResult::ok("hi"));
    }

    #[tokio::test]
    async fn test_plain_text_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(dir.path(), "printf 'hello world'", Duration::from_secs(10));
        let result = sandbox.execute(&ExecutionRequest::new("")).await;
        assert_eq!(result, ExecutionResult::ok("hello world"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(
            dir.path(),
            "echo '{\"output\":\"x\",\"success\":true}'; printf boom >&2; exit 1",
            Duration::from_secs(10),
        );
        let result = sandbox.execute(&ExecutionRequest::new("raise")).await;
        assert_eq!(result, ExecutionResult::failure("boom"));
    }

    #[tokio::test]
    async fn test_launcher_receives_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let args_file = dir.path().join("args");
        let body = format!(
            "printf '%s\\n' \"$@\" > {}\necho '{{\"output\":\"\",\"error\":\"\",\"success\":true}}'",
            args_file.display()
        );
        let sandbox = sandbox(dir.path(), &body, Duration::from_secs(10));

        let request = ExecutionRequest::new("print('a b')").with_capabilities(
            CapabilityConfig::default().with_network(NetworkPolicy::allow_list(["a.com"])),
        );
        let result = sandbox.execute(&request).await;
        assert!(result.success);

        let args = std::fs::read_to_string(&args_file).unwrap();
        let expected = format!(
            "run\n--allow-net=a.com\n--allow-read\n{}\nprint('a b')\n",
            sandbox.config().entry_script.display()
        );
        assert_eq!(args, expected);
    }

    #[tokio::test]
    async fn test_timeout_kills_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let body = format!(
            "echo $$ > {}\nprintf partial\nsleep 60",
            pid_file.display()
        );
        let sandbox = sandbox(dir.path(), &body, Duration::from_millis(500));

        let result = sandbox.execute(&ExecutionRequest::new("while True: pass")).await;
        assert_eq!(result, ExecutionResult::timed_out());

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        for _ in 0..40 {
            if !is_running(pid) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("runtime process {} still running", pid);
    }

    #[test]
    fn test_missing_launcher_is_a_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let config = SandboxConfig::new("/nonexistent/deno", entry_script(dir.path()));
        let result = Sandbox::new(config)
            .unwrap()
            .run(&ExecutionRequest::new("print(1)"));
        assert!(!result.success);
        assert!(result.output.is_empty());
        assert!(!result.error.is_empty());
    }

    #[tokio::test]
    async fn test_blocking_run_from_async_context() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = sandbox(
            dir.path(),
            r#"echo '{"output":"hi","error":"","success":true}'"#,
            Duration::from_secs(10),
        );
        let result = sandbox.run(&ExecutionRequest::new("print('hi')"));
        assert_eq!(result, ExecutionResult::ok("hi"));
    }

    #[test]
    fn test_concurrent_blocking_runs() {
        let dir = tempfile::tempdir().unwrap();
        // Echo the code back as the output
        let sandbox = sandbox(
            dir.path(),
            r#"eval "code=\${$#}"; printf '{"output":"%s","success":true}' "$code""#,
            Duration::from_secs(10),
        );

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let sandbox = &sandbox;
                    scope.spawn(move || sandbox.run(&ExecutionRequest::new(format!("job{}", i))))
                })
                .collect();
            for (i, handle) in handles.into_iter().enumerate() {
                assert_eq!(handle.join().unwrap(), ExecutionResult::ok(format!("job{}", i)));
            }
        });
    }
}
