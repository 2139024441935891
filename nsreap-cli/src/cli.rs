//! CLI argument definitions

use clap::Parser;
use nsreap_namespace::{BridgeTiming, NamespaceConfig};

#[derive(Parser, Debug)]
#[command(name = "nsreap")]
#[command(about = "Run a command in new Linux namespaces and reap its process tree", long_about = None)]
#[command(version)]
pub struct Cli {
    /// New IPC namespace
    #[arg(short = 'i', long)]
    pub ipc: bool,

    /// New mount namespace
    #[arg(short = 'm', long)]
    pub mount: bool,

    /// New network namespace
    #[arg(short = 'n', long = "net")]
    pub network: bool,

    /// New PID namespace
    #[arg(short = 'p', long)]
    pub pid: bool,

    /// New UTS namespace
    #[arg(short = 'u', long)]
    pub uts: bool,

    /// New user namespace
    #[arg(short = 'U', long)]
    pub user: bool,

    /// Become child subreaper and wait for every adopted descendant before exiting
    #[arg(short = 'r', long)]
    pub subreaper: bool,

    /// Display verbose messages
    #[arg(short, long)]
    pub verbose: bool,

    /// Delay before the re-entered orphan reports its parent
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub bridge_settle_ms: u64,

    /// Delay before the re-entered orphan exits after reporting
    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub bridge_linger_ms: u64,

    /// Command to run, with its arguments
    #[arg(
        value_name = "CMD",
        required = true,
        trailing_var_arg = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Namespaces selected by the flags
    pub fn namespace_config(&self) -> NamespaceConfig {
        NamespaceConfig::new()
            .with_ipc(self.ipc)
            .with_mount(self.mount)
            .with_network(self.network)
            .with_pid(self.pid)
            .with_uts(self.uts)
            .with_user(self.user)
    }

    /// Sleeps of the re-entered orphan
    pub const fn bridge_timing(&self) -> BridgeTiming {
        BridgeTiming::from_millis(self.bridge_settle_ms, self.bridge_linger_ms)
    }
}
