//! Positional command-line parsing
//!
//! Grammar: `<TCP|SYN> <start_ip>[/<cidr>] [<end_ip>] <ports> [<threads>]
//! [/T<secs>] [/Banner|/HBanner] [/Save]`. Options are slash-prefixed and
//! case-insensitive; bare tokens are classified by shape - a dotted token
//! before the port spec is the range end, a trailing integer is the
//! worker count.

use crate::config::ScanConfig;
use crate::error::ScanError;

/// Parse everything after the program name into a validated config.
pub fn parse(args: &[String]) -> crate::Result<ScanConfig> {
    if args.len() < 3 {
        return Err(ScanError::InvalidArgs(
            "expected <scan_type> <start_ip> [<end_ip>] <ports>".to_string(),
        ));
    }

    let mode = args[0].parse()?;
    let mut config = ScanConfig::new(mode, args[1].clone());

    let mut ports: Option<String> = None;
    for arg in &args[2..] {
        if let Some(option) = arg.strip_prefix('/') {
            apply_option(&mut config, option)?;
            continue;
        }
        if config.end_ip.is_none() && ports.is_none() && arg.contains('.') {
            config.end_ip = Some(arg.clone());
            continue;
        }
        if ports.is_none() {
            ports = Some(arg.clone());
            continue;
        }
        match arg.parse::<usize>() {
            Ok(threads) if threads > 0 => config.concurrency = threads,
            _ => {
                return Err(ScanError::InvalidArgs(format!(
                    "unexpected argument: {}",
                    arg
                )))
            }
        }
    }

    config.ports = ports.ok_or_else(|| ScanError::InvalidArgs("no ports specified".to_string()))?;
    config.validate()?;
    Ok(config)
}

fn apply_option(config: &mut ScanConfig, option: &str) -> crate::Result<()> {
    match option.to_ascii_uppercase().as_str() {
        "SAVE" => config.persist = true,
        "BANNER" => config.grab_banner = true,
        "HBANNER" => {
            config.grab_banner = true;
            config.http_banner = true;
        }
        upper => {
            let secs = upper.strip_prefix('T').ok_or_else(|| {
                ScanError::InvalidArgs(format!("unknown option: /{}", option))
            })?;
            config.timeout_secs = secs
                .parse()
                .map_err(|_| ScanError::InvalidArgs(format!("invalid timeout: /{}", option)))?;
            if config.timeout_secs == 0 {
                return Err(ScanError::InvalidArgs(
                    "timeout must be greater than 0".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Usage text with worked examples.
pub fn usage(program: &str) -> String {
    let mut text = String::new();
    text.push_str(&format!(
        "Usage:   {} TCP/SYN StartIP [EndIP] Ports [Threads] [/T(N)] [/(H)Banner] [/Save]\n",
        program
    ));
    for example in [
        "TCP 12.12.12.12 12.12.12.254 80 512",
        "TCP 12.12.12.12/24 80 512",
        "TCP 12.12.12.12/24 80 512 /T8 /Save",
        "TCP 12.12.12.12 12.12.12.254 80 512 /HBanner",
        "TCP 12.12.12.12 12.12.12.254 21 512 /Banner",
        "TCP 12.12.12.12 1-65535 512",
        "TCP 12.12.12.12 12.12.12.254 21,3389,5631 512",
        "SYN 12.12.12.12 12.12.12.254 80",
        "SYN 12.12.12.12 1-65535",
        "SYN 12.12.12.12 21,80,3389",
    ] {
        text.push_str(&format!("Example: {} {}\n", program, example));
    }
    text
}
