//! Build script for generating the `vmvault` man page.
//!
//! Packaging picks the man page up from the build output directory.

use std::env;
use std::io::Write;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var("OUT_DIR").map(Utf8PathBuf::from)?;
    let dir = Dir::open_ambient_dir(&out_dir, ambient_authority())?;

    let mut buffer = Vec::new();
    Man::new(Cli::command()).render(&mut buffer)?;
    dir.write("vmvault.1", buffer)?;

    Ok(())
}
