//! Server process startup, readiness polling and teardown

pub mod pidfile;

use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;

use crate::config::{ServerConfig, TimingConfig};
use crate::error::{Result, SandboxError};
use crate::initialize::spawn_error;
use crate::models::{ConnectionParams, Sandbox, SandboxState};

/// Starts and stops sandbox server processes
pub struct Supervisor<'a> {
    server: &'a ServerConfig,
    timing: &'a TimingConfig,
}

impl<'a> Supervisor<'a> {
    /// Create a supervisor with the given layout and timing
    pub fn new(server: &'a ServerConfig, timing: &'a TimingConfig) -> Self {
        Self { server, timing }
    }

    /// Launch the sandbox's start script and wait for its pid file.
    ///
    /// `args` are forwarded to the daemon launcher. A pid file that already
    /// exists is never reused or overwritten. When the attempt ceiling is
    /// reached the sandbox stays `Starting` and a readiness timeout is
    /// reported; the server may still come up later.
    pub fn start(&self, sandbox: &mut Sandbox, args: &[String]) -> Result<ConnectionParams> {
        let pid_file = sandbox.paths.pid_file.clone();
        if pid_file.exists() {
            return Err(SandboxError::AlreadyRunning { pid_file });
        }
        sandbox.expect_state(SandboxState::Initialized, SandboxState::Starting)?;

        let script = sandbox.paths.start_script.clone();
        let mut command = Command::new(&script);
        command
            .args(args)
            .current_dir(&sandbox.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if self.server.debug {
            command.env("SBDEBUG", "1");
        }

        // Safety: setsid is async-signal-safe and only affects the child,
        // giving it its own session and process group.
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }

        let mut child = command
            .spawn()
            .map_err(|e| spawn_error(&script, args, e))?;
        tracing::info!(
            "Launched {} (pid {}), waiting for {}",
            script.display(),
            child.id(),
            pid_file.display()
        );

        let outcome = self.wait_ready(sandbox, &mut child, &script);
        reap(child);
        outcome
    }

    /// Poll for the pid file while watching the start script for an early
    /// failing exit
    fn wait_ready(
        &self,
        sandbox: &mut Sandbox,
        child: &mut Child,
        script: &Path,
    ) -> Result<ConnectionParams> {
        sandbox.advance(SandboxState::Starting)?;
        sandbox.save_manifest()?;

        let pid_file = sandbox.paths.pid_file.clone();
        let started = Instant::now();
        let attempts = self.timing.ready_attempts;
        for attempt in 1..=attempts {
            if pid_file.exists() {
                sandbox.advance(SandboxState::Running)?;
                sandbox.save_manifest()?;
                tracing::info!(
                    "Sandbox {} running on port {} ({})",
                    sandbox.root.display(),
                    sandbox.port,
                    sandbox.paths.socket.display()
                );
                return Ok(sandbox.connection());
            }

            if let Some(status) = child.try_wait()? {
                if !status.success() {
                    return Err(SandboxError::LaunchFailed {
                        root: sandbox.root.clone(),
                        message: format!("{} exited with {}", script.display(), status),
                    });
                }
            }

            tracing::debug!("Waiting for pid file ({}/{})", attempt, attempts);
            if attempt < attempts {
                std::thread::sleep(self.timing.poll_interval());
            }
        }

        Err(SandboxError::ReadinessTimeout {
            root: sandbox.root.clone(),
            pid_file,
            waited_ms: started.elapsed().as_millis(),
        })
    }

    /// Stop the sandbox's server and delete its tree
    pub fn stop(&self, sandbox: &mut Sandbox) -> Result<()> {
        if self.terminate(&sandbox.paths.pid_file)? && sandbox.state == SandboxState::Running {
            sandbox.advance(SandboxState::Stopped)?;
        }

        remove_root(&sandbox.root)?;
        sandbox.advance(SandboxState::Removed)?;
        tracing::info!("Removed sandbox {}", sandbox.root.display());
        Ok(())
    }

    /// Tear down whatever lives at `root`, using only the root path and the
    /// pid file location. Works without a manifest or a live process.
    pub fn teardown(&self, root: &Path) -> Result<()> {
        self.terminate(&self.pid_file_under(root))?;
        remove_root(root)?;
        tracing::info!("Removed sandbox {}", root.display());
        Ok(())
    }

    /// Pid file location for a sandbox rooted at `root`
    pub fn pid_file_under(&self, root: &Path) -> PathBuf {
        root.join("data").join(&self.server.pid_filename)
    }

    /// Release the pid file, then kill the recorded process and wait out the
    /// grace period. Returns whether a pid was found.
    ///
    /// mysqld_safe only restarts the daemon while the pid file exists, so
    /// the file goes before the signal.
    fn terminate(&self, pid_file: &Path) -> Result<bool> {
        let Some(pid) = pidfile::take_pid(pid_file)? else {
            return Ok(false);
        };

        pidfile::kill(pid);
        std::thread::sleep(self.timing.grace_period());
        Ok(true)
    }
}

/// Wait for the start script in the background so it never lingers as a
/// zombie of the calling process
fn reap(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{}", pid))
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!("Start script {} exited with {}", pid, status),
            Err(e) => tracing::warn!("Could not wait for start script {}: {}", pid, e),
        });
    if let Err(e) = spawned {
        tracing::warn!("Could not reap start script {}: {}", pid, e);
    }
}

fn remove_root(root: &Path) -> Result<()> {
    match std::fs::remove_dir_all(root) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SandboxError::Teardown {
            root: root.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configure::Configurator;
    use crate::initialize::Initializer;
    use crate::provision::tests::{fake_distribution, FAKE_INSTALL_DB, FAKE_LAUNCHER};
    use crate::provision::Provisioner;
    use serial_test::serial;
    use tempfile::TempDir;

    fn fast_timing() -> TimingConfig {
        TimingConfig {
            poll_interval_ms: 50,
            ready_attempts: 100,
            grace_period_ms: 100,
        }
    }

    fn initialized_sandbox(dir: &Path, launcher: &str, server: &ServerConfig) -> Sandbox {
        let archive = fake_distribution(dir, launcher, FAKE_INSTALL_DB);
        let mut sandbox = Provisioner::new(server)
            .provision(&archive, &dir.join("sb1"), None)
            .unwrap();
        Configurator::new(server).configure(&mut sandbox).unwrap();
        Initializer::new(server).initialize(&mut sandbox).unwrap();
        sandbox
    }

    #[test]
    #[serial]
    fn test_full_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        let mut sandbox = initialized_sandbox(temp_dir.path(), FAKE_LAUNCHER, &server);
        let supervisor = Supervisor::new(&server, &timing);

        let params = supervisor.start(&mut sandbox, &[]).unwrap();
        assert_eq!(sandbox.state, SandboxState::Running);
        assert_eq!(params.port, 5510);
        assert_eq!(params.socket, temp_dir.path().join("sb1/data/sandbox.sock"));
        assert!(pidfile::read_pid(&sandbox.paths.pid_file).unwrap().is_some());

        supervisor.stop(&mut sandbox).unwrap();
        assert_eq!(sandbox.state, SandboxState::Removed);
        assert!(!sandbox.paths.pid_file.exists());
        assert!(!sandbox.root.exists());
    }

    #[test]
    #[serial]
    fn test_refuses_stale_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        let mut sandbox = initialized_sandbox(temp_dir.path(), FAKE_LAUNCHER, &server);
        std::fs::write(&sandbox.paths.pid_file, "4242\n").unwrap();

        let err = Supervisor::new(&server, &timing)
            .start(&mut sandbox, &[])
            .unwrap_err();
        assert!(matches!(err, SandboxError::AlreadyRunning { .. }));
        assert_eq!(sandbox.state, SandboxState::Initialized);
        assert_eq!(std::fs::read_to_string(&sandbox.paths.pid_file).unwrap(), "4242\n");
    }

    #[test]
    #[serial]
    fn test_readiness_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = TimingConfig {
            poll_interval_ms: 20,
            ready_attempts: 5,
            grace_period_ms: 0,
        };
        // Launcher that never writes a pid file
        let mut sandbox =
            initialized_sandbox(temp_dir.path(), "#!/bin/sh\nexec sleep 5\n", &server);

        let err = Supervisor::new(&server, &timing)
            .start(&mut sandbox, &[])
            .unwrap_err();
        assert!(err.is_readiness_timeout());
        assert_eq!(sandbox.state, SandboxState::Starting);
        assert!(!sandbox.paths.pid_file.exists());
    }

    #[test]
    #[serial]
    fn test_readiness_timeout_outlasting_start_script() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig {
            start_timeout_secs: 1,
            ..ServerConfig::default()
        };
        // Polls for about 3 s, well past the script's own 1 s wait
        let timing = TimingConfig {
            poll_interval_ms: 50,
            ready_attempts: 60,
            grace_period_ms: 0,
        };
        let mut sandbox =
            initialized_sandbox(temp_dir.path(), "#!/bin/sh\nexec sleep 10\n", &server);

        let err = Supervisor::new(&server, &timing)
            .start(&mut sandbox, &[])
            .unwrap_err();
        assert!(err.is_readiness_timeout(), "unexpected error: {}", err);
        assert_eq!(sandbox.state, SandboxState::Starting);
    }

    /// Zombie children of this process, from /proc
    #[cfg(target_os = "linux")]
    fn zombie_children() -> usize {
        let me = std::process::id().to_string();
        std::fs::read_dir("/proc")
            .unwrap()
            .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("stat")).ok())
            .filter(|stat| {
                // Fields after the parenthesised command name: state, ppid, ...
                let rest = match stat.rfind(')') {
                    Some(i) => &stat[i + 1..],
                    None => return false,
                };
                let mut fields = rest.split_whitespace();
                fields.next() == Some("Z") && fields.next() == Some(me.as_str())
            })
            .count()
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_start_script_is_reaped() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        let mut sandbox = initialized_sandbox(temp_dir.path(), FAKE_LAUNCHER, &server);
        let supervisor = Supervisor::new(&server, &timing);
        let before = zombie_children();

        supervisor.start(&mut sandbox, &[]).unwrap();

        // The script exits within a second of the pid file showing up
        std::thread::sleep(std::time::Duration::from_secs(2));
        let mut after = zombie_children();
        for _ in 0..20 {
            if after <= before {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(100));
            after = zombie_children();
        }
        assert!(after <= before, "zombies before={} after={}", before, after);

        supervisor.stop(&mut sandbox).unwrap();
    }

    #[test]
    #[serial]
    fn test_launch_failure_is_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        let mut sandbox = initialized_sandbox(temp_dir.path(), FAKE_LAUNCHER, &server);
        std::fs::remove_file(sandbox.paths.basedir.join("bin/mysqld_safe")).unwrap();

        let err = Supervisor::new(&server, &timing)
            .start(&mut sandbox, &[])
            .unwrap_err();
        assert!(matches!(err, SandboxError::LaunchFailed { .. }));
        assert!(!err.is_readiness_timeout());
    }

    #[test]
    fn test_teardown_without_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sb1");
        std::fs::create_dir_all(root.join("data")).unwrap();
        std::fs::create_dir_all(root.join("tmp")).unwrap();

        let server = ServerConfig::default();
        let timing = fast_timing();
        Supervisor::new(&server, &timing).teardown(&root).unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_teardown_dead_pid_releases_lock() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sb1");
        std::fs::create_dir_all(root.join("data")).unwrap();

        let server = ServerConfig::default();
        let timing = TimingConfig {
            grace_period_ms: 0,
            ..fast_timing()
        };
        let supervisor = Supervisor::new(&server, &timing);
        let pid_file = supervisor.pid_file_under(&root);
        // Largest pid value; no such process on any sane system
        std::fs::write(&pid_file, format!("{}\n", i32::MAX)).unwrap();

        supervisor.teardown(&root).unwrap();
        assert!(!pid_file.exists());
        assert!(!root.exists());
    }

    #[test]
    fn test_teardown_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        Supervisor::new(&server, &timing)
            .teardown(&temp_dir.path().join("never-created"))
            .unwrap();
    }

    #[test]
    #[serial]
    fn test_stop_never_started() {
        let temp_dir = TempDir::new().unwrap();
        let server = ServerConfig::default();
        let timing = fast_timing();
        let mut sandbox = initialized_sandbox(temp_dir.path(), FAKE_LAUNCHER, &server);

        Supervisor::new(&server, &timing).stop(&mut sandbox).unwrap();
        assert_eq!(sandbox.state, SandboxState::Removed);
        assert!(!sandbox.root.exists());
    }
}
