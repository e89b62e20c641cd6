//! Engine configuration
//!
//! Function whitelists, the attribution deny-list and debugger markers are all
//! data rather than literals so they can be extended from a TOML file without
//! touching the correlation code.
//!
//! # Example dllgraph.toml
//!
//! ```toml
//! deny_list = [
//!     'C:\Windows\System32\KERNELBASE.dll',
//!     'C:\Windows\System32\ntdll.dll',
//!     'C:\Windows\System32\KERNEL32.DLL',
//! ]
//! warn_on_unknown_handle = true
//!
//! # Replaces the whole debugger whitelist
//! [[debugger_functions.entries]]
//! name = "LdrLoadDll"
//! role = "dispatch_load"
//!
//! [[debugger_functions.entries]]
//! name = "LdrpResolveDllName"
//! role = "resolve"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What a traced function means to the graph builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionRole {
    /// Public load API; each call becomes a graph edge
    Load,
    /// Lowest-level loader entry point; becomes an edge after stack-based attribution
    DispatchLoad,
    /// DLL search directory configuration (auxiliary call)
    SearchPath,
    /// Adds a search directory and returns a handle for it
    AddDirectory,
    /// Removes a search directory by the handle an addition returned
    RemoveDirectory,
    /// Loader-internal name resolution (debugger traces only)
    Resolve,
    /// Loader-internal image mapping (debugger traces only)
    Map,
}

impl FunctionRole {
    /// Whether calls with this role create an edge in the call graph
    pub fn is_load(self) -> bool {
        matches!(self, FunctionRole::Load | FunctionRole::DispatchLoad)
    }
}

/// A whitelisted function name and its role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntry {
    pub name: String,
    pub role: FunctionRole,
}

impl FunctionEntry {
    fn new(name: &str, role: FunctionRole) -> Self {
        Self {
            name: name.to_string(),
            role,
        }
    }
}

/// Ordered whitelist of traced functions
///
/// Order matters: summaries are printed in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionCatalog {
    #[serde(default)]
    pub entries: Vec<FunctionEntry>,
}

impl FunctionCatalog {
    /// Functions recorded by the injected instrumentation library
    pub fn structured() -> Self {
        use FunctionRole::{AddDirectory, DispatchLoad, Load, RemoveDirectory, SearchPath};
        Self {
            entries: vec![
                FunctionEntry::new("LoadLibraryA", Load),
                FunctionEntry::new("LoadLibraryW", Load),
                FunctionEntry::new("LoadLibraryExA", Load),
                FunctionEntry::new("LoadLibraryExW", Load),
                FunctionEntry::new("LdrLoadDll", DispatchLoad),
                FunctionEntry::new("SetDefaultDllDirectories", SearchPath),
                FunctionEntry::new("SetDllDirectoryA", SearchPath),
                FunctionEntry::new("SetDllDirectoryW", SearchPath),
                FunctionEntry::new("AddDllDirectory", AddDirectory),
                FunctionEntry::new("RemoveDllDirectory", RemoveDirectory),
            ],
        }
    }

    /// Functions reported by loader snaps under the debugger
    pub fn debugger() -> Self {
        use FunctionRole::{DispatchLoad, Load, Map, Resolve};
        Self {
            entries: vec![
                FunctionEntry::new("LdrLoadDll", DispatchLoad),
                FunctionEntry::new("LdrpLoadDllInternal", Load),
                FunctionEntry::new("LdrpMinimalMapModule", Map),
                FunctionEntry::new("LdrpResolveDllName", Resolve),
            ],
        }
    }

    /// Look up the role of a function, `None` if it is not whitelisted
    pub fn role(&self, function: &str) -> Option<FunctionRole> {
        self.entries
            .iter()
            .find(|e| e.name == function)
            .map(|e| e.role)
    }

    pub fn contains(&self, function: &str) -> bool {
        self.role(function).is_some()
    }

    /// Function names in catalog order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }
}

/// Configuration for the whole correlation pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whitelist for structured instrumentation logs
    #[serde(default = "FunctionCatalog::structured")]
    pub structured_functions: FunctionCatalog,

    /// Whitelist for debugger loader-snap output
    #[serde(default = "FunctionCatalog::debugger")]
    pub debugger_functions: FunctionCatalog,

    /// Always-resident modules never used as a caller attribution
    #[serde(default = "default_deny_list")]
    pub deny_list: Vec<String>,

    /// Marker printed by the loader helper before the traced load
    #[serde(default = "default_start_marker")]
    pub start_marker: String,

    /// Marker printed by the loader helper after the traced load
    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    /// Move dispatch-level records after all other records
    #[serde(default = "default_true")]
    pub defer_dispatch_events: bool,

    /// Emit a warning when a directory removal names an unknown handle
    #[serde(default)]
    pub warn_on_unknown_handle: bool,

    /// Graph node name for loads that produced no module
    #[serde(default = "default_unresolved_sentinel")]
    pub unresolved_sentinel: String,
}

fn default_deny_list() -> Vec<String> {
    vec![
        r"C:\Windows\System32\KERNELBASE.dll".to_string(),
        r"C:\Windows\System32\ntdll.dll".to_string(),
    ]
}

fn default_start_marker() -> String {
    "[LOADLIBRARY][START]".to_string()
}

fn default_end_marker() -> String {
    "[LOADLIBRARY][END]".to_string()
}

fn default_true() -> bool {
    true
}

fn default_unresolved_sentinel() -> String {
    "NULL".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            structured_functions: FunctionCatalog::structured(),
            debugger_functions: FunctionCatalog::debugger(),
            deny_list: default_deny_list(),
            start_marker: default_start_marker(),
            end_marker: default_end_marker(),
            defer_dispatch_events: true,
            warn_on_unknown_handle: false,
            unresolved_sentinel: default_unresolved_sentinel(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dllgraph::config::EngineConfig;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = EngineConfig::from_file("dllgraph.toml")?;
    /// println!("{} deny-listed modules", config.deny_list.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML")
    }
}
