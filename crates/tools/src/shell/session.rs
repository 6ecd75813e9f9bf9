//! Long-lived shell process with sentinel-framed command output.
//!
//! A [`ShellSession`] owns one spawned shell and its standard streams. Two
//! reader tasks pump stdout and stderr into growable buffers; [`ShellSession::run`]
//! writes a framed command to stdin and waits until the sentinel shows up in
//! both buffers, or the configured timeout elapses.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proto::ToolError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

/// Marker echoed after every command to delimit its output.
pub const DEFAULT_SENTINEL: &str = "<<exit>>";
/// Maximum time a single command may take before the session is declared dead.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Upper bound between two inspections of the stdout buffer.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// System note returned when the shell process has gone away.
pub const RESTART_REQUIRED_NOTE: &str = "tool must be restarted";

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const READ_CHUNK: usize = 4096;

/// Platform shell dialect: which program to spawn and how to frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// POSIX `bash` reading commands from stdin.
    Bash,
    /// Windows `cmd.exe` with echo turned off.
    Cmd,
}

impl ShellFlavor {
    /// Picks the flavor for an OS name as reported by `std::env::consts::OS`.
    pub fn for_os(os: &str) -> Self {
        if os.eq_ignore_ascii_case("windows") {
            Self::Cmd
        } else {
            Self::Bash
        }
    }

    /// Flavor for the OS this binary runs on.
    pub fn native() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    /// Short name used in log lines and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Cmd => "cmd",
        }
    }

    /// Default program spawned for this flavor.
    pub fn program(self) -> &'static str {
        match self {
            Self::Bash => "/bin/bash",
            Self::Cmd => "cmd.exe",
        }
    }

    fn default_args(self) -> Vec<String> {
        match self {
            Self::Bash => Vec::new(),
            Self::Cmd => vec!["/Q".to_string()],
        }
    }

    /// Builds the line written to the shell's stdin for `command`.
    ///
    /// The sentinel is echoed to stdout and then to stderr, so each stream
    /// marks where the command's output ends. It is quoted/escaped so that the
    /// echoed text is the literal sentinel while the command line itself never
    /// contains it verbatim.
    pub fn frame(self, command: &str, sentinel: &str) -> String {
        match self {
            // A separate line keeps heredocs, trailing `&` and comments intact.
            Self::Bash => {
                let quoted = sentinel.replace('\'', r"'\''");
                format!("{command}\necho '{quoted}'; echo '{quoted}' >&2\n")
            }
            Self::Cmd => {
                let escaped = escape_cmd(sentinel);
                format!("{command} & echo {escaped} & echo {escaped} 1>&2\n")
            }
        }
    }
}

fn escape_cmd(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if matches!(c, '<' | '>' | '|' | '&' | '^') {
            out.push('^');
        }
        out.push(c);
    }
    out
}

/// Immutable session configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Shell dialect used for framing.
    pub flavor: ShellFlavor,
    /// Program to spawn.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Maximum wait for a command's sentinel.
    pub timeout: Duration,
    /// Maximum delay between two buffer inspections.
    pub poll_interval: Duration,
    /// Marker that terminates each command's output.
    pub sentinel: String,
}

impl SessionConfig {
    /// Default configuration for a shell flavor.
    pub fn new(flavor: ShellFlavor) -> Self {
        Self {
            flavor,
            program: flavor.program().to_string(),
            args: flavor.default_args(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            sentinel: DEFAULT_SENTINEL.to_string(),
        }
    }

    /// `/bin/bash` session.
    pub fn bash() -> Self {
        Self::new(ShellFlavor::Bash)
    }

    /// `cmd.exe` session.
    pub fn cmd() -> Self {
        Self::new(ShellFlavor::Cmd)
    }

    /// Session for the current platform.
    pub fn native() -> Self {
        Self::new(ShellFlavor::native())
    }

    /// Overrides the spawned program, keeping the flavor's framing.
    pub fn with_program(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.sentinel = sentinel.into();
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::native()
    }
}

/// Lifecycle state of a [`ShellSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// `start()` has not been called yet.
    NotStarted,
    /// The shell is alive and accepting commands.
    Running,
    /// The shell process exited; the exit code is `None` when killed by a signal.
    Exited(Option<i32>),
    /// A command missed its deadline. Terminal: the session must be replaced.
    TimedOut,
}

/// Output of one command executed in a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    /// Command stdout with the sentinel and one trailing newline removed.
    pub stdout: String,
    /// Command stderr with the sentinel and one trailing newline removed.
    pub stderr: String,
    /// Set only when the session must be restarted; never paired with stdout.
    pub system: Option<String>,
}

impl CommandResult {
    /// Result signalling that the shell exited and the tool must be restarted.
    pub fn restart_required(shell: &str, code: Option<i32>) -> Self {
        let code = code.map_or_else(|| "none (terminated by signal)".to_string(), |c| c.to_string());
        Self {
            stdout: String::new(),
            stderr: format!("{shell} has exited with returncode {code}"),
            system: Some(RESTART_REQUIRED_NOTE.to_string()),
        }
    }

    /// True when this result asks the caller to restart the tool.
    pub fn needs_restart(&self) -> bool {
        self.system.is_some()
    }
}

/// One live shell process plus its read/write state.
pub struct ShellSession {
    config: SessionConfig,
    state: SessionState,
    process: Option<ShellProcess>,
}

impl ShellSession {
    /// Creates an unstarted session.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::NotStarted,
            process: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration this session was built with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// OS process id of the shell, if it is still running.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.child.id())
    }

    /// Spawns the shell. Calling it on a started session does nothing.
    pub fn start(&mut self) -> Result<(), ToolError> {
        if self.process.is_some() {
            return Ok(());
        }

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        let child = command.spawn().map_err(|source| ToolError::Spawn {
            program: self.config.program.clone(),
            source,
        })?;
        let process = ShellProcess::spawn(child)?;

        debug!(
            program = %self.config.program,
            pid = ?process.child.id(),
            "Shell session started"
        );
        self.process = Some(process);
        self.state = SessionState::Running;
        Ok(())
    }

    /// Executes `command` and returns its output once the sentinel is seen.
    ///
    /// Only one call may be in flight per session; callers serialize.
    pub async fn run(&mut self, command: &str) -> Result<CommandResult, ToolError> {
        let Self {
            config,
            state,
            process,
        } = self;
        let shell = config.flavor.name();
        let Some(process) = process.as_mut() else {
            return Err(ToolError::NotStarted);
        };
        if *state == SessionState::TimedOut {
            return Err(timed_out(config));
        }
        if let Some(status) = process.child.try_wait()? {
            *state = SessionState::Exited(status.code());
            warn!(shell, status = %status, "Shell exited before command was sent");
            return Ok(CommandResult::restart_required(shell, status.code()));
        }

        let framed = config.flavor.frame(command, &config.sentinel);
        debug!(shell, command, "Sending framed command");
        if let Err(e) = process.send(framed.as_bytes()).await {
            // The shell may have died between the exit check and the write.
            if let Some(status) = process.child.try_wait()? {
                *state = SessionState::Exited(status.code());
                warn!(shell, status = %status, "Shell exited while receiving command");
                return Ok(CommandResult::restart_required(shell, status.code()));
            }
            return Err(ToolError::Io(e));
        }

        let waited = timeout(
            config.timeout,
            process.wait_for(config.sentinel.as_bytes(), config.poll_interval),
        )
        .await;

        match waited {
            Ok(Ok(Completion::Output { stdout, stderr })) => {
                debug!(
                    shell,
                    stdout_len = stdout.len(),
                    stderr_len = stderr.len(),
                    "Command output extracted"
                );
                Ok(CommandResult {
                    stdout,
                    stderr,
                    system: None,
                })
            }
            Ok(Ok(Completion::Exited(status))) => {
                *state = SessionState::Exited(status.code());
                warn!(shell, status = %status, "Shell exited while running command");
                Ok(CommandResult::restart_required(shell, status.code()))
            }
            Ok(Err(e)) => Err(ToolError::Io(e)),
            Err(_) => {
                *state = SessionState::TimedOut;
                warn!(
                    shell,
                    timeout_secs = config.timeout.as_secs_f64(),
                    command,
                    "Command timed out, session is now unusable"
                );
                Err(timed_out(config))
            }
        }
    }

    /// Requests termination without waiting for the process to exit.
    ///
    /// No-op when the session never started or the shell already exited.
    pub fn stop(&mut self) -> Result<(), ToolError> {
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };
        if process.child.try_wait()?.is_some() {
            return Ok(());
        }
        debug!(pid = ?process.child.id(), "Stopping shell session");
        process.child.start_kill()?;
        Ok(())
    }

    /// Kills the shell and waits (bounded) for it to be reaped.
    pub async fn shutdown(&mut self) -> Result<(), ToolError> {
        self.stop()?;
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };
        match timeout(SHUTDOWN_GRACE, process.child.wait()).await {
            Ok(Ok(status)) => {
                if self.state == SessionState::Running {
                    self.state = SessionState::Exited(status.code());
                }
                debug!(status = %status, "Shell session reaped");
                Ok(())
            }
            Ok(Err(e)) => Err(ToolError::Io(e)),
            Err(_) => {
                warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Shell did not exit after kill"
                );
                Ok(())
            }
        }
    }
}

fn timed_out(config: &SessionConfig) -> ToolError {
    ToolError::TimedOut {
        shell: config.flavor.name().to_string(),
        secs: config.timeout.as_secs_f64(),
    }
}

enum Completion {
    Output { stdout: String, stderr: String },
    Exited(ExitStatus),
}

/// Bytes read from one shell stream, plus how far they have been searched.
#[derive(Debug, Default)]
struct StreamBuffer {
    data: Vec<u8>,
    scanned: usize,
    marker: Option<usize>,
}

impl StreamBuffer {
    /// Offset of the first `sentinel`. Only bytes appended since the last
    /// call are searched, plus enough overlap to catch a split sentinel.
    fn find(&mut self, sentinel: &[u8]) -> Option<usize> {
        if self.marker.is_none() && !sentinel.is_empty() {
            let start = self.scanned.saturating_sub(sentinel.len() - 1);
            self.marker = find_subslice(&self.data[start..], sentinel).map(|i| start + i);
            self.scanned = self.data.len();
        }
        self.marker
    }

    /// Text before `end` minus one trailing newline. Empties the buffer.
    fn take_until(&mut self, end: usize) -> String {
        let text = strip_trailing_newline(&String::from_utf8_lossy(&self.data[..end])).to_string();
        self.clear();
        text
    }

    fn clear(&mut self) {
        self.data.clear();
        self.scanned = 0;
        self.marker = None;
    }
}

type SharedBuffer = Arc<Mutex<StreamBuffer>>;

struct ShellProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: SharedBuffer,
    stderr: SharedBuffer,
    activity: Arc<Notify>,
    readers: Vec<JoinHandle<()>>,
}

impl ShellProcess {
    /// Takes the child's pipes and starts one reader task per output stream.
    fn spawn(mut child: Child) -> Result<Self, ToolError> {
        let missing = |stream: &str| ToolError::ExecutionFailed(format!("shell {stream} is not piped"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let out = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let err = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let stdout = SharedBuffer::default();
        let stderr = SharedBuffer::default();
        let activity = Arc::new(Notify::new());
        let readers = vec![
            tokio::spawn(pump(out, stdout.clone(), activity.clone())),
            tokio::spawn(pump(err, stderr.clone(), activity.clone())),
        ];
        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            activity,
            readers,
        })
    }

    async fn send(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(line).await?;
        self.stdin.flush().await
    }

    /// Cuts both streams at their sentinel and empties the buffers.
    ///
    /// Returns `None` until the sentinel has arrived on stdout and stderr.
    fn extract(&self, sentinel: &[u8]) -> Option<Completion> {
        let mut stdout = self.stdout.lock();
        let mut stderr = self.stderr.lock();
        let out_end = stdout.find(sentinel)?;
        let err_end = stderr.find(sentinel)?;
        Some(Completion::Output {
            stdout: stdout.take_until(out_end),
            stderr: stderr.take_until(err_end),
        })
    }

    async fn wait_for(
        &mut self,
        sentinel: &[u8],
        poll_interval: Duration,
    ) -> std::io::Result<Completion> {
        loop {
            tokio::select! {
                _ = self.activity.notified() => {}
                _ = sleep(poll_interval) => {}
            }
            if let Some(output) = self.extract(sentinel) {
                return Ok(output);
            }
            if let Some(status) = self.child.try_wait()? {
                self.drain_readers().await;
                if let Some(output) = self.extract(sentinel) {
                    return Ok(output);
                }
                return Ok(Completion::Exited(status));
            }
        }
    }

    /// Gives the readers a moment to flush the tail of a dead shell's output.
    async fn drain_readers(&self) {
        let deadline = Instant::now() + Duration::from_millis(100);
        while !self.readers.iter().all(|r| r.is_finished()) && Instant::now() < deadline {
            sleep(Duration::from_millis(5)).await;
        }
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

async fn pump<R>(mut reader: R, buffer: SharedBuffer, activity: Arc<Notify>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.lock().data.extend_from_slice(&chunk[..n]);
                activity.notify_one();
            }
            Err(e) => {
                debug!("Shell stream read failed: {e}");
                break;
            }
        }
    }
    activity.notify_one();
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Removes exactly one trailing line terminator (`\n` or `\r\n`).
fn strip_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_bash() -> SessionConfig {
        SessionConfig::bash()
            .with_timeout(Duration::from_secs(10))
            .with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn flavor_follows_operating_system() {
        assert_eq!(ShellFlavor::for_os("windows"), ShellFlavor::Cmd);
        assert_eq!(ShellFlavor::for_os("Windows"), ShellFlavor::Cmd);
        assert_eq!(ShellFlavor::for_os("linux"), ShellFlavor::Bash);
        assert_eq!(ShellFlavor::for_os("macos"), ShellFlavor::Bash);
    }

    #[test]
    fn cmd_frame_uses_ampersand_and_escapes_sentinel() {
        let line = ShellFlavor::Cmd.frame("dir", "<<exit>>");
        assert_eq!(line, "dir & echo ^<^<exit^>^> & echo ^<^<exit^>^> 1>&2\n");
        assert!(!line.contains("<<exit>>"));
    }

    #[test]
    fn bash_frame_quotes_sentinel_on_its_own_line() {
        let line = ShellFlavor::Bash.frame("ls -la", "<<exit>>");
        assert_eq!(line, "ls -la\necho '<<exit>>'; echo '<<exit>>' >&2\n");
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn bash_frame_escapes_single_quotes() {
        let line = ShellFlavor::Bash.frame("true", "it's");
        assert_eq!(line, "true\necho 'it'\\''s'; echo 'it'\\''s' >&2\n");
    }

    #[test]
    fn default_config_uses_documented_tunables() {
        let cfg = SessionConfig::bash();
        assert_eq!(cfg.program, "/bin/bash");
        assert!(cfg.args.is_empty());
        assert_eq!(cfg.timeout, Duration::from_secs(120));
        assert_eq!(cfg.poll_interval, Duration::from_millis(200));
        assert_eq!(cfg.sentinel, "<<exit>>");
        assert_eq!(SessionConfig::cmd().args, vec!["/Q".to_string()]);
    }

    #[test]
    fn strip_trailing_newline_removes_exactly_one() {
        assert_eq!(strip_trailing_newline("a\n\n"), "a\n");
        assert_eq!(strip_trailing_newline("a\r\n"), "a");
        assert_eq!(strip_trailing_newline("a"), "a");
        assert_eq!(strip_trailing_newline(""), "");
    }

    #[test]
    fn find_subslice_locates_first_match() {
        assert_eq!(find_subslice(b"abc<<exit>>\n", b"<<exit>>"), Some(3));
        assert_eq!(find_subslice(b"<<exi", b"<<exit>>"), None);
        assert_eq!(find_subslice(b"abc", b""), None);
    }

    #[test]
    fn stream_buffer_finds_sentinel_split_across_reads() {
        let mut buffer = StreamBuffer::default();
        buffer.data.extend_from_slice(b"abc<<ex");
        assert_eq!(buffer.find(b"<<exit>>"), None);
        assert_eq!(buffer.scanned, 7);

        buffer.data.extend_from_slice(b"it>>\ntail");
        assert_eq!(buffer.find(b"<<exit>>"), Some(3));
        assert_eq!(buffer.take_until(3), "abc");
        assert!(buffer.data.is_empty());
        assert_eq!(buffer.scanned, 0);
        assert_eq!(buffer.marker, None);
    }

    #[test]
    fn stream_buffer_keeps_first_marker() {
        let mut buffer = StreamBuffer::default();
        buffer.data.extend_from_slice(b"one\n<<exit>>\n");
        assert_eq!(buffer.find(b"<<exit>>"), Some(4));
        buffer.data.extend_from_slice(b"<<exit>>\n");
        assert_eq!(buffer.find(b"<<exit>>"), Some(4));
        assert_eq!(buffer.take_until(4), "one");
    }

    #[test]
    fn restart_required_result_carries_exit_code() {
        let result = CommandResult::restart_required("bash", Some(3));
        assert!(result.needs_restart());
        assert!(result.stdout.is_empty());
        assert_eq!(result.stderr, "bash has exited with returncode 3");
        assert_eq!(result.system.as_deref(), Some("tool must be restarted"));
    }

    #[tokio::test]
    async fn run_before_start_is_an_error() {
        let mut session = ShellSession::new(fast_bash());
        let err = session.run("echo hi").await.unwrap_err();
        assert!(matches!(err, ToolError::NotStarted));
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let mut session = ShellSession::new(fast_bash());
        session.stop().expect("stop");
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[tokio::test]
    async fn spawn_failure_is_propagated() {
        let cfg = fast_bash().with_program("/definitely/not/a/shell", Vec::new());
        let mut session = ShellSession::new(cfg);
        let err = session.start().unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
        assert_eq!(session.state(), SessionState::NotStarted);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_is_idempotent() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let pid = session.pid();
        session.start().expect("second start");
        assert_eq!(session.pid(), pid);
        assert_eq!(session.state(), SessionState::Running);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn run_strips_sentinel_and_one_newline() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let result = session.run("echo hello").await.expect("run");
        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "");
        assert!(result.system.is_none());

        let result = session.run("printf 'a\\n\\n'").await.expect("run");
        assert_eq!(result.stdout, "a\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn buffers_are_cleared_between_commands() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let first = session
            .run("echo first; echo oops 1>&2")
            .await
            .expect("run");
        assert_eq!(first.stdout, "first");
        assert_eq!(first.stderr, "oops");
        {
            let process = session.process.as_ref().expect("process");
            assert!(process.stdout.lock().data.is_empty());
            assert!(process.stderr.lock().data.is_empty());
        }

        let second = session.run("true").await.expect("run");
        assert_eq!(second.stdout, "");
        assert_eq!(second.stderr, "");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interleaved_streams_never_leak_into_next_command() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        for i in 0..200 {
            let result = session
                .run(&format!("echo out{i}; echo err{i} 1>&2"))
                .await
                .expect("run");
            assert_eq!(result.stdout, format!("out{i}"), "stdout of command {i}");
            assert_eq!(result.stderr, format!("err{i}"), "stderr of command {i}");
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stderr_without_trailing_newline_is_framed() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let result = session.run("printf warn 1>&2").await.expect("run");
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "warn");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multi_megabyte_output_completes_quickly() {
        const SIZE: usize = 16 * 1024 * 1024;
        let mut session = ShellSession::new(fast_bash().with_timeout(Duration::from_secs(30)));
        session.start().expect("start");
        let started = Instant::now();
        let result = session
            .run(&format!("head -c {SIZE} /dev/zero | tr '\\0' a"))
            .await
            .expect("run");
        assert_eq!(result.stdout.len(), SIZE);
        assert!(result.stdout.bytes().all(|b| b == b'a'));
        assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());

        let next = session.run("echo after").await.expect("run");
        assert_eq!(next.stdout, "after");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multiline_output_is_preserved() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let result = session.run("printf 'one\\ntwo\\n'").await.expect("run");
        assert_eq!(result.stdout, "one\ntwo");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_state_persists_across_commands() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        session.run("export GREETING=persisted").await.expect("run");
        let result = session.run("echo $GREETING").await.expect("run");
        assert_eq!(result.stdout, "persisted");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_shell_returns_restart_note() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        session.shutdown().await.expect("shutdown");
        let result = session.run("echo never").await.expect("run");
        assert!(result.needs_restart());
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("has exited with returncode"));
        assert!(matches!(session.state(), SessionState::Exited(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_while_running_returns_restart_note() {
        let mut session = ShellSession::new(fast_bash());
        session.start().expect("start");
        let result = session.run("exit 3").await.expect("run");
        assert!(result.needs_restart());
        assert_eq!(result.stderr, "bash has exited with returncode 3");
        assert_eq!(session.state(), SessionState::Exited(Some(3)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_terminal() {
        let cfg = fast_bash().with_timeout(Duration::from_millis(300));
        let mut session = ShellSession::new(cfg);
        session.start().expect("start");

        let err = session.run("sleep 5").await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(session.state(), SessionState::TimedOut);

        let err = session.run("echo still-dead").await.unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
    }
}
