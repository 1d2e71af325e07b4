use std::process::ExitCode;

use update_display::{cli, config::UPDATE_SCREEN};

fn main() -> ExitCode {
    cli::main(&UPDATE_SCREEN)
}
