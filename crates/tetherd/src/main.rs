use std::process::ExitCode;

fn main() -> ExitCode {
    match tetherd::run_supervisor() {
        Ok(termination) => ExitCode::from(termination.exit_code()),
        Err(error) => {
            if tracing::dispatcher::has_been_set() {
                tracing::error!(target: "tetherd", error = %error, "supervisor failed");
            } else {
                eprintln!("tetherd: {error}");
            }
            ExitCode::FAILURE
        }
    }
}
