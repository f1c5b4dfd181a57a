use std::process::ExitCode;

fn main() -> ExitCode {
    llm_organizer::cli::run()
}
