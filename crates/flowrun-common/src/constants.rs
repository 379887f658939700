// Platform constants, directory names, and exit codes shared by every
// flowrun crate.

use std::fmt;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Well-known directories under the runner root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownDirectory {
    Root,
    Diag,
    Temp,
    Tools,
    Work,
}

impl fmt::Display for WellKnownDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Operating system platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsPlatform {
    Linux,
    MacOS,
    Windows,
}

impl fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsPlatform::Linux => write!(f, "Linux"),
            OsPlatform::MacOS => write!(f, "macOS"),
            OsPlatform::Windows => write!(f, "Windows"),
        }
    }
}

impl OsPlatform {
    /// Label name used when matching `runs-on` entries.
    pub fn label_name(&self) -> &'static str {
        match self {
            OsPlatform::Linux => "Linux",
            OsPlatform::MacOS => "macOS",
            OsPlatform::Windows => "Windows",
        }
    }

    /// Value exposed as `runner.os` in the expression context.
    pub fn context_name(&self) -> &'static str {
        self.label_name()
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label_name())
    }
}

impl Architecture {
    /// Label name used when matching `runs-on` entries.
    pub fn label_name(&self) -> &'static str {
        match self {
            Architecture::X86 => "X86",
            Architecture::X64 => "X64",
            Architecture::Arm => "ARM",
            Architecture::Arm64 => "ARM64",
        }
    }
}

// ---------------------------------------------------------------------------
// Platform detection (compile-time)
// ---------------------------------------------------------------------------

/// The current OS platform, detected at compile time.
#[cfg(target_os = "linux")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux;
#[cfg(target_os = "macos")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::MacOS;
#[cfg(target_os = "windows")]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Windows;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
pub const CURRENT_PLATFORM: OsPlatform = OsPlatform::Linux; // default fallback

/// The current CPU architecture, detected at compile time.
#[cfg(target_arch = "x86")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X86;
#[cfg(target_arch = "x86_64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X64;
#[cfg(target_arch = "arm")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm;
#[cfg(target_arch = "aarch64")]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::Arm64;
#[cfg(not(any(
    target_arch = "x86",
    target_arch = "x86_64",
    target_arch = "arm",
    target_arch = "aarch64"
)))]
pub const CURRENT_ARCHITECTURE: Architecture = Architecture::X64; // default fallback

// ---------------------------------------------------------------------------
// Top-level constants
// ---------------------------------------------------------------------------

/// Path environment variable name (platform-specific).
#[cfg(target_os = "windows")]
pub const PATH_VARIABLE: &str = "Path";
#[cfg(not(target_os = "windows"))]
pub const PATH_VARIABLE: &str = "PATH";

/// Path list separator for PATH-style variables.
#[cfg(target_os = "windows")]
pub const PATH_SEPARATOR: &str = ";";
#[cfg(not(target_os = "windows"))]
pub const PATH_SEPARATOR: &str = ":";

/// Label implicitly carried by every runner.
pub const SELF_HOSTED_LABEL: &str = "self-hosted";

/// Default per-step timeout when neither the job nor the step declares one.
pub const DEFAULT_STEP_TIMEOUT_MINUTES: u32 = 360;

// ---------------------------------------------------------------------------
// ExitCode
// ---------------------------------------------------------------------------

/// Process exit codes for the `flowrun` binary.
pub mod exit_code {
    /// Job succeeded, or every job was skipped.
    pub const SUCCESS: i32 = 0;
    /// A job ran and failed (or was cancelled).
    pub const JOB_FAILURE: i32 = 1;
    /// Bad arguments, unreadable workflow/event file, or validation failure.
    pub const CONFIG_ERROR: i32 = 2;
}

// ---------------------------------------------------------------------------
// Path constants
// ---------------------------------------------------------------------------

pub mod path {
    pub const DIAG_DIRECTORY: &str = "_diag";
    pub const LOGS_DIRECTORY: &str = "_logs";
    pub const TEMP_DIRECTORY: &str = "_temp";
    pub const TOOL_DIRECTORY: &str = "_tool";
    pub const WORK_DIRECTORY: &str = "_work";
}

// ---------------------------------------------------------------------------
// Environment variable names
// ---------------------------------------------------------------------------

pub mod env_vars {
    pub const CI: &str = "CI";
    pub const GITHUB_ACTIONS: &str = "GITHUB_ACTIONS";
    pub const GITHUB_WORKSPACE: &str = "GITHUB_WORKSPACE";
    pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
    pub const GITHUB_REPOSITORY_OWNER: &str = "GITHUB_REPOSITORY_OWNER";
    pub const GITHUB_REF: &str = "GITHUB_REF";
    pub const GITHUB_REF_NAME: &str = "GITHUB_REF_NAME";
    pub const GITHUB_SHA: &str = "GITHUB_SHA";
    pub const GITHUB_EVENT_NAME: &str = "GITHUB_EVENT_NAME";
    pub const GITHUB_WORKFLOW: &str = "GITHUB_WORKFLOW";
    pub const GITHUB_JOB: &str = "GITHUB_JOB";
    pub const GITHUB_SERVER_URL: &str = "GITHUB_SERVER_URL";
    pub const RUNNER_NAME: &str = "RUNNER_NAME";
    pub const RUNNER_OS: &str = "RUNNER_OS";
    pub const RUNNER_ARCH: &str = "RUNNER_ARCH";
    pub const RUNNER_TEMP: &str = "RUNNER_TEMP";
    pub const RUNNER_TOOL_CACHE: &str = "RUNNER_TOOL_CACHE";
    pub const RUNNER_WORKSPACE: &str = "RUNNER_WORKSPACE";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_label_names() {
        assert_eq!(OsPlatform::Linux.label_name(), "Linux");
        assert_eq!(OsPlatform::MacOS.label_name(), "macOS");
        assert_eq!(OsPlatform::Windows.label_name(), "Windows");
    }

    #[test]
    fn architecture_display_matches_label() {
        assert_eq!(Architecture::Arm64.to_string(), "ARM64");
        assert_eq!(Architecture::X64.to_string(), "X64");
    }

    #[cfg(unix)]
    #[test]
    fn unix_path_variable() {
        assert_eq!(PATH_VARIABLE, "PATH");
        assert_eq!(PATH_SEPARATOR, ":");
    }
}
