use std::process::ExitCode;

use reactor_httpd::config::Config;
use reactor_httpd::server::Server;

fn main() -> ExitCode {
    reactor_httpd::telemetry::init();

    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("reactor-httpd: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Server::new(config).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("reactor-httpd: {e}");
            ExitCode::FAILURE
        }
    }
}
