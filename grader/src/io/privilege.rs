//! Privilege dropping for commands run on a benchmark's behalf.

use std::process::Command;

use tracing::debug;

/// Rewrites a command so it executes as another user.
///
/// `None` must return the command unchanged. Implementations preserve the
/// working directory and environment bindings already set on the command.
pub trait PrivilegeDropper: Send + Sync {
    fn as_user(&self, cmd: Command, uid: Option<u32>) -> Command;
}

/// Uses the platform's native mechanism where there is one (`setuid` on unix),
/// otherwise a `sudo` wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDropper;

impl PrivilegeDropper for NativeDropper {
    fn as_user(&self, cmd: Command, uid: Option<u32>) -> Command {
        let Some(uid) = uid else {
            return cmd;
        };
        debug!(uid, program = ?cmd.get_program(), "dropping privileges");
        run_as_uid(cmd, uid)
    }
}

#[cfg(unix)]
fn run_as_uid(mut cmd: Command, uid: u32) -> Command {
    use std::os::unix::process::CommandExt;
    cmd.uid(uid);
    cmd
}

#[cfg(not(unix))]
fn run_as_uid(cmd: Command, uid: u32) -> Command {
    sudo_wrapper(&cmd, uid)
}

/// Wrap `cmd` in `sudo -n -u #<uid> --preserve-env --`, copying its working
/// directory and environment overrides onto the wrapper.
pub fn sudo_wrapper(cmd: &Command, uid: u32) -> Command {
    let mut wrapped = Command::new("sudo");
    wrapped
        .arg("-n")
        .arg("-u")
        .arg(format!("#{uid}"))
        .arg("--preserve-env")
        .arg("--")
        .arg(cmd.get_program())
        .args(cmd.get_args());
    if let Some(dir) = cmd.get_current_dir() {
        wrapped.current_dir(dir);
    }
    for (key, value) in cmd.get_envs() {
        match value {
            Some(value) => {
                wrapped.env(key, value);
            }
            None => {
                wrapped.env_remove(key);
            }
        }
    }
    wrapped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::path::Path;

    #[test]
    fn none_returns_command_unchanged() {
        let mut cmd = Command::new("echo");
        cmd.arg("hi").current_dir("/tmp").env("A", "1");
        let cmd = NativeDropper.as_user(cmd, None);
        assert_eq!(cmd.get_program(), OsStr::new("echo"));
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), vec![OsStr::new("hi")]);
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/tmp")));
    }

    #[test]
    fn sudo_wrapper_preserves_dir_and_env() {
        let mut cmd = Command::new("make");
        cmd.arg("test").current_dir("/work").env("MODE", "ci").env_remove("SECRET");
        let wrapped = sudo_wrapper(&cmd, 1000);
        assert_eq!(wrapped.get_program(), OsStr::new("sudo"));
        let args: Vec<_> = wrapped.get_args().collect();
        assert_eq!(
            args,
            ["-n", "-u", "#1000", "--preserve-env", "--", "make", "test"]
                .map(OsStr::new)
                .to_vec()
        );
        assert_eq!(wrapped.get_current_dir(), Some(Path::new("/work")));
        let envs: Vec<_> = wrapped.get_envs().collect();
        assert!(envs.contains(&(OsStr::new("MODE"), Some(OsStr::new("ci")))));
        assert!(envs.contains(&(OsStr::new("SECRET"), None)));
    }

    #[test]
    fn native_drop_keeps_program_and_args() {
        let mut cmd = Command::new("id");
        cmd.arg("-u");
        let cmd = NativeDropper.as_user(cmd, Some(65534));
        #[cfg(unix)]
        assert_eq!(cmd.get_program(), OsStr::new("id"));
        #[cfg(not(unix))]
        assert_eq!(cmd.get_program(), OsStr::new("sudo"));
    }
}
