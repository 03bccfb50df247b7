//! Device tool location and argument building.

use std::path::{Path, PathBuf};

use medicart_core::DeviceKind;
use medicart_core::config::ToolsConfig;

/// The device command-line tool and the arguments it is launched with.
#[derive(Debug, Clone)]
pub struct DeviceTool {
    /// Executable name or path, resolved at launch time.
    program: String,
    /// Arguments appended after the mode flag.
    extra_args: Vec<String>,
}

impl DeviceTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
        }
    }

    /// Build from the `tools` config section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            program: tools.device_cli.clone(),
            extra_args: tools.device_args.clone(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument list for launching the tool in `kind` mode.
    pub fn args_for(&self, kind: DeviceKind) -> Vec<String> {
        std::iter::once(kind.mode_flag().to_string())
            .chain(self.extra_args.iter().cloned())
            .collect()
    }

    /// Executable path the tool will be launched from.
    pub fn resolve(&self) -> PathBuf {
        resolve_executable(&self.program)
    }
}

/// Resolve a tool executable.
///
/// Names with a directory component are used as given. Bare names are
/// looked up on `PATH` first, then fall back to the current working
/// directory (`./<name>`), where the tools ship next to the bridge.
pub fn resolve_executable(name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.to_path_buf();
    }
    search_path(name).unwrap_or_else(|| Path::new(".").join(name))
}

fn search_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| is_executable(path))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_flag_comes_first() {
        let tool = DeviceTool::new("lepu_cli.exe").with_args(vec!["-port".into(), "COM3".into()]);
        assert_eq!(tool.args_for(DeviceKind::Nibp), vec!["-nibp", "-port", "COM3"]);
        assert_eq!(tool.args_for(DeviceKind::Glucose), vec!["-glu", "-port", "COM3"]);
    }

    #[test]
    fn missing_tool_falls_back_to_working_directory() {
        let resolved = resolve_executable("definitely_not_installed_tool.exe");
        assert_eq!(resolved, Path::new(".").join("definitely_not_installed_tool.exe"));
    }

    #[test]
    fn explicit_paths_are_kept() {
        assert_eq!(
            resolve_executable("/opt/lepu/lepu_cli"),
            PathBuf::from("/opt/lepu/lepu_cli")
        );
        assert_eq!(resolve_executable("./lepu_cli"), PathBuf::from("./lepu_cli"));
    }

    #[cfg(unix)]
    #[test]
    fn tools_on_path_are_found() {
        let resolved = resolve_executable("sh");
        assert!(resolved.is_absolute(), "resolved to {}", resolved.display());
        assert!(resolved.ends_with("sh"));
    }
}
