use colored::*;
use portsweep::{cli, Scanner};
use std::env;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args
        .first()
        .map(String::as_str)
        .unwrap_or("portsweep")
        .to_string();

    if args.len() < 4 {
        eprint!("{}", cli::usage(&program));
        process::exit(1);
    }

    let config = match cli::parse(&args[1..]) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red().bold(), e);
            eprint!("{}", cli::usage(&program));
            process::exit(1);
        }
    };

    let scanner = match Scanner::new(config) {
        Ok(scanner) => scanner,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red().bold(), e);
            process::exit(1);
        }
    };

    println!(
        "{} {}\n",
        "portsweep".bright_cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    let config = scanner.config();
    println!(
        "{} scan: about to scan {} using {} workers\n",
        config.mode.name().bright_yellow().bold(),
        config.start_ip.bright_cyan(),
        config.concurrency.to_string().bright_white()
    );

    // INT and TERM exit right away; whatever was printed so far is the
    // result of the run, and pending persistence is abandoned.
    tokio::spawn(async {
        wait_for_signal().await;
        process::exit(0);
    });

    if let Err(e) = scanner.run().await {
        eprintln!("{} {}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
