use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Stdio;
use tokio::process::{Child, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_std(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
            #[cfg(not(unix))]
            signal: None,
        }
    }

    pub fn new(code: Option<i32>, signal: Option<i32>) -> Self {
        Self { code, signal }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn signal(&self) -> Option<i32> {
        self.signal
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit status {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => write!(f, "unknown status"),
        }
    }
}

/// Builds a `<shell> -c <command>` child process.
pub struct ProcessBuilder {
    shell: String,
    command: String,
    own_group: bool,
    kill_on_drop: bool,
    stdout: Stdio,
    stderr: Stdio,
    stdin: Stdio,
}

impl ProcessBuilder {
    pub fn shell(shell: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            command: command.into(),
            own_group: false,
            kill_on_drop: false,
            stdout: Stdio::inherit(),
            stderr: Stdio::inherit(),
            stdin: Stdio::null(),
        }
    }

    /// Start the child as the leader of a new process group, so a group
    /// signal reaches everything it spawns.
    pub fn own_process_group(mut self, own_group: bool) -> Self {
        self.own_group = own_group;
        self
    }

    pub fn kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    pub fn stdout(mut self, stdout: Stdio) -> Self {
        self.stdout = stdout;
        self
    }

    pub fn stderr(mut self, stderr: Stdio) -> Self {
        self.stderr = stderr;
        self
    }

    pub fn stdin(mut self, stdin: Stdio) -> Self {
        self.stdin = stdin;
        self
    }

    /// Spawns without awaiting, so callers may do it while holding a lock.
    pub fn spawn(self) -> crate::Result<Child> {
        tracing::debug!("Spawning process: {} -c '{}'", self.shell, self.command);

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(&self.command)
            .stdout(self.stdout)
            .stderr(self.stderr)
            .stdin(self.stdin)
            .kill_on_drop(self.kill_on_drop);

        #[cfg(unix)]
        {
            if self.own_group {
                cmd.process_group(0);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.own_group;
        }

        cmd.spawn().map_err(|e| {
            crate::Error::SpawnFailed(format!("{} -c '{}': {}", self.shell, self.command, e))
        })
    }
}

/// Sends SIGINT to the process group led by `pid`.
pub fn interrupt_group(pid: u32) -> crate::Result<()> {
    signal_group(pid, GroupSignal::Interrupt)
}

/// Sends SIGKILL to the process group led by `pid`.
pub fn kill_group(pid: u32) -> crate::Result<()> {
    signal_group(pid, GroupSignal::Kill)
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Interrupt,
    Kill,
}

#[cfg(unix)]
fn signal_group(pid: u32, sig: GroupSignal) -> crate::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let pgid = i32::try_from(pid)
        .ok()
        .and_then(i32::checked_neg)
        .ok_or_else(|| crate::Error::Signal(format!("PID {} too large for process group", pid)))?;

    let sig = match sig {
        GroupSignal::Interrupt => Signal::SIGINT,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    signal::kill(Pid::from_raw(pgid), sig)?;
    Ok(())
}

#[cfg(not(unix))]
fn signal_group(pid: u32, sig: GroupSignal) -> crate::Result<()> {
    Err(crate::Error::Signal(format!(
        "Process group signals are not supported on this platform ({:?} to pid {})",
        sig, pid
    )))
}
