use std::path::PathBuf;

use tokio::process::Command;

/// Builds the command that runs one bot identity.
pub trait Launcher: Send + Sync {
    fn command(&self, identity: &str) -> Command;
}

impl<F> Launcher for F
where
    F: Fn(&str) -> Command + Send + Sync,
{
    fn command(&self, identity: &str) -> Command {
        self(identity)
    }
}

/// Re-invokes a relay executable as `<exe> bot <identity>`.
#[derive(Debug, Clone)]
pub struct ExeLauncher {
    exe: PathBuf,
}

impl ExeLauncher {
    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }

    /// The currently running executable.
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?))
    }
}

impl Launcher for ExeLauncher {
    fn command(&self, identity: &str) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.arg("bot").arg(identity);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exe_launcher_passes_identity() {
        let cmd = ExeLauncher::new("/usr/local/bin/relay").command("alpha");
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "/usr/local/bin/relay");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, vec!["bot", "alpha"]);
    }
}
