use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::server::{is_local_host, Server};
use crate::utils::shell;

use super::{Connector, ExecutionResult, Session};

/// Session implementation backed by the system `ssh` binary.
///
/// Each `exec`/`execute_script` call spawns one ssh process; the per-job
/// timeout bounds the remote command via `timeout(1)`.
pub struct SshSession {
    host: String,
    user: String,
    port: u16,
    identity_file: Option<String>,
    run_as: Option<String>,
    timeout_secs: u64,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the server host is localhost/127.0.0.1/::1.
    is_local: bool,
}

pub struct SshConnector;

impl Connector for SshConnector {
    fn connect(
        &self,
        server: &Server,
        run_as: Option<&str>,
        timeout: Duration,
    ) -> Result<Box<dyn Session>> {
        Ok(Box::new(SshSession::connect(server, run_as, timeout)?))
    }
}

impl SshSession {
    pub fn connect(server: &Server, run_as: Option<&str>, timeout: Duration) -> Result<Self> {
        if !server.is_valid() {
            return Err(Error::Connect(format!(
                "server '{}' has no host or user configured",
                server.id
            )));
        }

        let identity_file = match &server.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::Connect(format!(
                        "identity file '{}' for server '{}' not found",
                        expanded, server.id
                    )));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&server.host);
        if is_local {
            log_status!("ssh", "Server '{}' is localhost - using local execution", server.id);
        }

        Ok(Self {
            host: server.host.clone(),
            user: server.user.clone(),
            port: server.port,
            identity_file,
            run_as: run_as.map(str::to_string),
            timeout_secs: timeout.as_secs(),
            is_local,
        })
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Timeout and keepalive options prevent hangs on stalled
        // connections or unexpected prompts.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    /// Wrap a remote command with impersonation and the per-job timeout.
    fn remote_command(&self, command: &str) -> String {
        let quoted = shell::escape_command_for_shell(command);
        match &self.run_as {
            Some(user) => format!(
                "timeout {} sudo -H -u {} sh -c {}",
                self.timeout_secs,
                shell::quote_arg(user),
                quoted
            ),
            None => format!("timeout {} sh -c {}", self.timeout_secs, quoted),
        }
    }

    fn run_local(&self, command: &str, stdin: Option<&str>) -> Result<std::process::Output> {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        if let (Some(script), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(script.as_bytes())?;
        }
        Ok(child.wait_with_output()?)
    }
}

impl Session for SshSession {
    fn exec(&self, command: &str) -> Result<ExecutionResult> {
        let started = Instant::now();

        let output = if self.is_local {
            self.run_local(&format!("{} 2>&1", self.remote_command(command)), None)?
        } else {
            let args = self.build_ssh_args(&format!("{} 2>&1", self.remote_command(command)));
            Command::new("ssh")
                .args(&args)
                .output()
                .map_err(|e| Error::Connect(format!("failed to spawn ssh: {}", e)))?
        };

        let exit_code = output.status.code().unwrap_or(-1);

        // ssh exit code 255 = connection error, not a remote command failure
        if !self.is_local && exit_code == 255 {
            return Err(Error::Connect(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        Ok(ExecutionResult {
            output: String::from_utf8_lossy(&output.stdout).to_string(),
            exit_code,
            duration: started.elapsed(),
        })
    }

    fn execute_script(
        &self,
        script: &str,
        on_chunk: Option<&dyn Fn(&str)>,
    ) -> Result<ExecutionResult> {
        let started = Instant::now();

        let interpreter = match &self.run_as {
            Some(user) => format!(
                "timeout {} sudo -H -u {} bash -s 2>&1",
                self.timeout_secs,
                shell::quote_arg(user)
            ),
            None => format!("timeout {} bash -s 2>&1", self.timeout_secs),
        };

        let mut cmd = if self.is_local {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", &interpreter]);
            cmd
        } else {
            let mut cmd = Command::new("ssh");
            cmd.args(self.build_ssh_args(&interpreter));
            cmd
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Connect(format!("failed to spawn ssh: {}", e)))?;

        // Feed the script from a separate thread so a large script cannot
        // deadlock against a full stdout pipe.
        let stdin = child.stdin.take();
        let script_text = script.to_string();
        let writer = std::thread::spawn(move || {
            if let Some(mut pipe) = stdin {
                let _ = pipe.write_all(script_text.as_bytes());
            }
        });

        let mut output = String::new();
        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let line = line?;
                if let Some(callback) = on_chunk {
                    callback(&line);
                }
                output.push_str(&line);
                output.push('\n');
            }
        }

        let _ = writer.join();
        let status = child.wait()?;
        let exit_code = status.code().unwrap_or(-1);

        if !self.is_local && exit_code == 255 {
            return Err(Error::Connect(format!(
                "connection lost while executing script on {}@{}",
                self.user, self.host
            )));
        }

        Ok(ExecutionResult {
            output,
            exit_code,
            duration: started.elapsed(),
        })
    }

    fn get_file_content(&self, path: &str) -> Result<Option<String>> {
        let result = self.exec(&format!("cat {}", shell::quote_path(path)))?;
        if result.successful() {
            Ok(Some(result.output))
        } else {
            Ok(None)
        }
    }

    fn set_timeout(&mut self, secs: u64) {
        self.timeout_secs = secs;
    }

    fn disconnect(&mut self) {
        // Process-per-exec transport holds no persistent connection; the
        // method exists so callers release sessions on every exit path.
        log_status!("ssh", "Session to {}@{} closed", self.user, self.host);
    }
}
