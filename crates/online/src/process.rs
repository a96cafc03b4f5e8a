//! The engine process and its standard streams.
//!
//! Each [`ProcessChannel`] runs its engine inside a private temporary working
//! directory. The child is spawned with `kill_on_drop`, so dropping the
//! channel on any path (including an error or panic mid-session) terminates
//! the engine, and the directory is removed with it.

use log::{debug, info, trace, warn};
use pgfkit_traits::{ChannelError, ChannelExit, TexChannel};
use pgfkit_types::EngineProfile;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;

/// Line width the engine is told to use so report lines are never wrapped.
const MAX_PRINT_LINE: &str = "10000";

#[derive(Debug)]
pub struct ProcessChannel {
    command: String,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<BufReader<ChildStdout>>,
    /// Bytes of a line whose terminator has not arrived yet.
    pending: Vec<u8>,
    /// Lines read while a write was waiting for the engine to take input.
    backlog: VecDeque<String>,
    workdir: TempDir,
}

impl ProcessChannel {
    /// Starts the profile's engine in a fresh temporary directory.
    pub fn start(profile: &EngineProfile) -> Result<Self, ChannelError> {
        Self::start_with_search_dirs(profile, &[])
    }

    /// Starts the engine with `search_dirs` prepended to its input search path,
    /// so relative `\input`s resolve against them as well as the working directory.
    pub fn start_with_search_dirs(
        profile: &EngineProfile,
        search_dirs: &[PathBuf],
    ) -> Result<Self, ChannelError> {
        let spawn_failed = |message: String| ChannelError::SpawnFailed {
            command: profile.command.clone(),
            message,
        };
        let workdir = tempfile::Builder::new()
            .prefix("pgfkit-")
            .tempdir()
            .map_err(|e| spawn_failed(format!("cannot create working directory: {e}")))?;

        let mut command = engine_command(profile, workdir.path(), search_dirs);
        let mut child = command.spawn().map_err(|e| spawn_failed(e.to_string()))?;

        let stdin = child.stdin.take().ok_or_else(|| spawn_failed("stdin not captured".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| spawn_failed("stdout not captured".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let name = profile.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] stderr: {}", name, line);
                }
            });
        }

        info!(
            "Started '{}' (pid {:?}) in {}",
            profile.command,
            child.id(),
            workdir.path().display()
        );

        Ok(Self {
            command: profile.command.clone(),
            child: Some(child),
            stdin: Some(stdin),
            stdout: Some(BufReader::new(stdout)),
            pending: Vec::new(),
            backlog: VecDeque::new(),
            workdir,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    fn exit_status(&mut self) -> Option<i32> {
        self.child
            .as_mut()
            .and_then(|c| c.try_wait().ok().flatten())
            .and_then(|s| s.code())
    }
}

/// Builds the engine invocation shared by online sessions and one-shot runs.
pub fn engine_command(profile: &EngineProfile, workdir: &Path, search_dirs: &[PathBuf]) -> Command {
    let mut command = Command::new(&profile.command);
    command
        .args(profile.invocation_arguments())
        .current_dir(workdir)
        .env("max_print_line", MAX_PRINT_LINE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = search_path(search_dirs) {
        command.env("TEXINPUTS", path);
    }
    command
}

/// `TEXINPUTS` value listing `dirs` ahead of any inherited entries, with a
/// trailing empty entry so the engine's default search path still applies.
pub fn search_path(dirs: &[PathBuf]) -> Option<OsString> {
    if dirs.is_empty() {
        return None;
    }
    let mut entries: Vec<PathBuf> = dirs.to_vec();
    if let Some(existing) = std::env::var_os("TEXINPUTS") {
        entries.extend(std::env::split_paths(&existing).filter(|p| !p.as_os_str().is_empty()));
    }
    entries.push(PathBuf::new());
    std::env::join_paths(entries).ok()
}

/// Removes the buffered line from `pending` and decodes it.
fn take_line(pending: &mut Vec<u8>) -> String {
    while matches!(pending.last(), Some(b'\n' | b'\r')) {
        pending.pop();
    }
    let line = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    line
}

impl TexChannel for ProcessChannel {
    async fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        trace!("[{}] <- {}", self.command, line);
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let written = {
            let Self { stdin, stdout, pending, backlog, .. } = &mut *self;
            let stdin = stdin.as_mut().ok_or(ChannelError::Closed)?;
            // The engine answers every input line with a prompt. If nobody reads
            // its output while the input pipe is full, both sides block, so
            // output is drained into the backlog until the write goes through.
            let write = async {
                stdin.write_all(&data).await?;
                stdin.flush().await
            };
            tokio::pin!(write);
            let mut draining = stdout.is_some();
            loop {
                tokio::select! {
                    written = &mut write => break written,
                    more = async {
                        let Some(out) = stdout.as_mut() else { return false };
                        match out.read_until(b'\n', pending).await {
                            Ok(0) | Err(_) => false,
                            Ok(_) => {
                                if pending.last() == Some(&b'\n') {
                                    backlog.push_back(take_line(pending));
                                }
                                true
                            }
                        }
                    }, if draining => draining = more,
                }
            }
        };
        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                Err(ChannelError::ProcessExited { status: self.exit_status() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, ChannelError> {
        if let Some(line) = self.backlog.pop_front() {
            trace!("[{}] -> {}", self.command, line);
            return Ok(line);
        }
        let stdout = self.stdout.as_mut().ok_or(ChannelError::Closed)?;
        // `read_until` keeps partial data in `pending`, so a timeout loses nothing.
        let read = tokio::time::timeout(timeout, stdout.read_until(b'\n', &mut self.pending)).await;
        match read {
            Err(_) => Err(ChannelError::Timeout(timeout)),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(0)) if self.pending.is_empty() => {
                Err(ChannelError::ProcessExited { status: self.exit_status() })
            }
            Ok(Ok(_)) => {
                let line = take_line(&mut self.pending);
                trace!("[{}] -> {}", self.command, line);
                Ok(line)
            }
        }
    }

    async fn shutdown(&mut self, farewell: &str, grace: Duration) -> Result<ChannelExit, ChannelError> {
        let mut child = self.child.take().ok_or(ChannelError::Closed)?;
        let deadline = Instant::now() + grace;

        if let Some(mut stdin) = self.stdin.take() {
            if !farewell.is_empty() {
                let mut data = farewell.as_bytes().to_vec();
                data.push(b'\n');
                let sent = tokio::time::timeout_at(deadline, async {
                    stdin.write_all(&data).await?;
                    stdin.flush().await
                })
                .await;
                match sent {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!("[{}] could not send end of document: {}", self.command, e),
                    Err(_) => debug!("[{}] engine stopped taking input before the end of document", self.command),
                }
            }
            // Closing stdin lets an engine stuck waiting for input run into end of file.
            drop(stdin);
        }

        let mut trailing: Vec<String> = self.backlog.drain(..).collect();
        if let Some(mut stdout) = self.stdout.take() {
            loop {
                let read = tokio::time::timeout_at(deadline, stdout.read_until(b'\n', &mut self.pending)).await;
                match read {
                    Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                    Ok(Ok(_)) => trailing.push(take_line(&mut self.pending)),
                }
            }
            if !self.pending.is_empty() {
                trailing.push(take_line(&mut self.pending));
            }
        }

        let (code, killed) = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                warn!("[{}] failed to wait for engine: {}", self.command, e);
                let _ = child.kill().await;
                (None, true)
            }
            Err(_) => {
                warn!("[{}] engine did not exit within {:?}, killing it", self.command, grace);
                let _ = child.kill().await;
                (None, true)
            }
        };
        info!("Engine '{}' finished (code: {:?}, killed: {})", self.command, code, killed);
        Ok(ChannelExit { code, killed, trailing })
    }

    fn working_dir(&self) -> Option<&Path> {
        Some(self.workdir.path())
    }

    fn name(&self) -> &'static str {
        "ProcessChannel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_strips_terminators() {
        let mut buf = b"hello\r\n".to_vec();
        assert_eq!(take_line(&mut buf), "hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_search_path_keeps_default_entry() {
        assert!(search_path(&[]).is_none());
        let path = search_path(&[PathBuf::from("/a"), PathBuf::from("/b")]).unwrap();
        let entries: Vec<PathBuf> = std::env::split_paths(&path).collect();
        assert_eq!(entries.first(), Some(&PathBuf::from("/a")));
        assert_eq!(entries.last(), Some(&PathBuf::new()));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let profile = EngineProfile::plain_tex().with_command("pgfkit-no-such-engine");
        let err = ProcessChannel::start(&profile).unwrap_err();
        assert!(matches!(err, ChannelError::SpawnFailed { ref command, .. } if command == "pgfkit-no-such-engine"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_line_round_trip_through_cat() {
        // `cat` echoes every input line, which is enough to exercise the plumbing.
        // The job-name argument lands in `$0` of the shell.
        let profile = EngineProfile::plain_tex().with_command("sh").with_arguments(["-c", "cat"]);
        let mut channel = match ProcessChannel::start(&profile) {
            Ok(c) => c,
            Err(_) => return,
        };
        channel.write_line("first").await.unwrap();
        assert_eq!(channel.read_line(Duration::from_secs(5)).await.unwrap(), "first");
        assert!(matches!(
            channel.read_line(Duration::from_millis(50)).await,
            Err(ChannelError::Timeout(_))
        ));
        let exit = channel.shutdown("bye", Duration::from_secs(5)).await.unwrap();
        assert_eq!(exit.trailing, vec!["bye".to_string()]);
        assert!(!exit.killed);
        assert!(matches!(channel.shutdown("", Duration::ZERO).await, Err(ChannelError::Closed)));
    }
}
