//! plainweb binary entry point: serves the chat demo.

mod chat;

use std::process::ExitCode;
use std::sync::Arc;

use plainweb::cli::{self, Args};
use plainweb::config::Config;
use plainweb::{logging, serve, serve_with_shutdown, RequestHandler, SessionStore, Templates};
use tracing::{error, info};

use chat::ChatApp;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Try 'plainweb --help' for more information.");
            return ExitCode::from(2);
        }
    };

    if args.help {
        cli::print_help();
        return ExitCode::SUCCESS;
    }
    if args.version {
        cli::print_version();
        return ExitCode::SUCCESS;
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(args)?;
    logging::try_init_with(config.log_filter()).ok();

    info!("plainweb v{}", env!("CARGO_PKG_VERSION"));

    let server_config = config.to_server_config()?;
    let store = Arc::new(SessionStore::with_idle_timeout(config.idle_timeout()));
    let templates = Arc::new(
        Templates::from_glob(&config.templates.pattern)?.with_reload(config.templates.reload),
    );
    info!(
        idle_timeout_secs = config.session.idle_timeout_secs,
        "Session store initialized"
    );

    let app = ChatApp::new(Arc::clone(&store));
    let handler = RequestHandler::new(move |req| app.serve(req), store, templates)
        .with_cookie_name(config.session.cookie_name.clone());

    match config.watchdog() {
        Some(dog) => {
            let shutdown = async move {
                tokio::select! {
                    result = dog.changed() => {
                        if let Err(e) = result {
                            error!(error = %e, "watchdog failed, running until Ctrl-C");
                            tokio::signal::ctrl_c().await.ok();
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutdown requested");
                    }
                }
            };
            serve_with_shutdown(server_config, handler, shutdown).await?;
        }
        None => serve(server_config, handler).await?,
    }

    Ok(())
}
