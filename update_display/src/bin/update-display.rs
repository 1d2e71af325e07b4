use std::process::ExitCode;

use update_display::{cli, config::UPDATE_DISPLAY};

fn main() -> ExitCode {
    cli::main(&UPDATE_DISPLAY)
}
