//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use sinan_lib::device::traits::Platform;

/// Natural-language UI automation for Android and HarmonyOS devices.
///
/// Resolves element descriptions against the device's UI hierarchy, falls back
/// to a vision model when the hierarchy has no match, and streams JSON results
/// on stdout.
#[derive(Debug, Parser)]
#[command(name = "sinan", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List attached devices (adb and hdc)
    Devices,

    /// Print device connect/disconnect events until interrupted
    Monitor,

    /// Resolve and tap a single instruction
    #[command(after_help = "\
Examples:
  sinan exec --device emulator-5554 点击外卖
  sinan exec -d 127.0.0.1:5555 'tap Settings'")]
    Exec(ExecArgs),

    /// Run a saved test case
    #[command(after_help = "\
Examples:
  sinan run --device emulator-5554 cases/tc_1a2b3c4d.json
  sinan run -d emulator-5554 --keep-going smoke.json")]
    Run(RunArgs),

    /// Print the elements normalized from a saved hierarchy dump
    #[command(after_help = "\
Examples:
  sinan elements window_dump.xml
  sinan elements --platform harmony layout.json")]
    Elements(ElementsArgs),
}

#[derive(Debug, clap::Args)]
pub struct ExecArgs {
    /// Target device serial
    #[arg(short, long)]
    pub device: String,

    /// Instruction, e.g. "点击外卖"
    pub instruction: String,
}

#[derive(Debug, clap::Args)]
pub struct RunArgs {
    /// Target device serial
    #[arg(short, long)]
    pub device: String,

    /// Path to the case JSON file
    pub case: PathBuf,

    /// Run every step even after one fails
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Debug, clap::Args)]
pub struct ElementsArgs {
    /// Dialect of the dump
    #[arg(short, long, value_enum, default_value_t = DumpPlatform::Android)]
    pub platform: DumpPlatform,

    /// uiautomator XML or dumpLayout JSON file
    pub dump: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DumpPlatform {
    Android,
    Harmony,
}

impl From<DumpPlatform> for Platform {
    fn from(value: DumpPlatform) -> Self {
        match value {
            DumpPlatform::Android => Platform::Android,
            DumpPlatform::Harmony => Platform::Harmony,
        }
    }
}
