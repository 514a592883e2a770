mod cli;
mod core;
mod interfaces;
mod logging;
mod platform;

use crate::core::terminal;

/// Panics anywhere end up in the log before the default report.
fn install_panic_guard() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("Uncaught panic: {}", info);
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() {
    install_panic_guard();

    if let Err(e) = cli::run_main().await {
        terminal::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
