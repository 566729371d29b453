//! Conflux Ledger CLI Example
//!
//! This example drives the Conflux application running in the device
//! emulator over its TCP APDU and button sockets.
//!
//! # Prerequisites
//!
//! - An emulator running the Conflux application, with its APDU socket
//!   (default `9999`) and button socket (default `42000`) reachable
//! - For real hardware, confirmation must be given by hand: set
//!   `CFX_LEDGER_NO_BUTTON=1` and press the buttons yourself
//!
//! # Quick Start
//!
//! ```bash
//! cargo run --example cfx-ledger-cli -- version
//! cargo run --example cfx-ledger-cli -- pubkey "m/503'/1'/0'/0/0"
//! cargo run --example cfx-ledger-cli -- sign-tx eb8085...
//! cargo run --example cfx-ledger-cli -- -vv personal-sign "Hello, world!"
//! RUST_LOG=cfx_ledger_client=trace cargo run --example cfx-ledger-cli -- version
//! ```
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `version` | Show the application version |
//! | `app-name` | Show the application name |
//! | `app-and-version` | Show the running application, as seen by the dashboard |
//! | `pubkey [path] [--display]` | Show the public key and address |
//! | `sign-tx <hex> [path]` | Sign a raw transaction |
//! | `personal-sign <message> [path]` | Sign a personal message |
//!
//! # Configuration
//!
//! Connection settings are read from `CFX_LEDGER_HOST`,
//! `CFX_LEDGER_APDU_PORT`, `CFX_LEDGER_BUTTON_PORT`, `CFX_LEDGER_SETTLE_MS`
//! and `CFX_LEDGER_TIMEOUT_MS`.

#![expect(unused_crate_dependencies, reason = "needed for CLI example")]

use std::env;
use std::process::ExitCode;

use cfx_ledger_client::config::EmulatorConfig;
use cfx_ledger_client::crypto::{verify_personal_message_signature, verify_transaction_signature};
use cfx_ledger_client::ledger::{Button, ConfluxApp, NoOpButton, TcpButton, TcpTransport};
use cfx_ledger_client::{Bip32Path, Error, Result};
use tracing_subscriber::EnvFilter;

/// Path used when none is given: first Conflux account.
const DEFAULT_PATH: &str = "m/503'/1'/0'/0/0";

fn main() -> ExitCode {
    let (verbosity, args): (Vec<String>, Vec<String>) = env::args().partition(|a| is_verbosity_flag(a));
    init_tracing(verbosity.iter().map(|f| f.len() - 1).sum());

    if args.len() < 2 {
        print_help();
        return ExitCode::FAILURE;
    }

    let result = match args[1].as_str() {
        "version" => cmd_version(),
        "app-name" => cmd_app_name(),
        "app-and-version" => cmd_app_and_version(),
        "pubkey" => cmd_pubkey(&args[2..]),
        "sign-tx" => cmd_sign_tx(&args[2..]),
        "personal-sign" => cmd_personal_sign(&args[2..]),
        "--help" | "-h" | "help" => {
            print_help();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_denied() => {
            eprintln!("Rejected on device.");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn is_verbosity_flag(arg: &str) -> bool {
    arg.len() > 1 && arg.starts_with('-') && arg[1..].bytes().all(|b| b == b'v')
}

/// Installs a stderr subscriber. `RUST_LOG` wins over `-v` flags.
fn init_tracing(verbosity: usize) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_help() {
    println!(
        r#"Conflux Ledger CLI

USAGE:
    cfx-ledger-cli [-v...] <COMMAND>

COMMANDS:
    version                        Show the application version
    app-name                       Show the application name
    app-and-version                Show the running application and version
    pubkey [path] [--display]      Show the public key and address
    sign-tx <hex> [path]           Sign a raw transaction
    personal-sign <msg> [path]     Sign a personal message
    help                           Show this help message

OPTIONS:
    -v, -vv, -vvv                  Log at info, debug or trace level

The default path is {DEFAULT_PATH}.
"#
    );
}

fn connect() -> Result<(EmulatorConfig, ConfluxApp)> {
    let config = EmulatorConfig::from_env()?;
    let transport = TcpTransport::from_config(&config)?;
    Ok((config, ConfluxApp::new(Box::new(transport))))
}

fn button(config: &EmulatorConfig) -> Result<Box<dyn Button>> {
    if env::var_os("CFX_LEDGER_NO_BUTTON").is_some() {
        println!("Confirm on the device...");
        return Ok(Box::new(NoOpButton));
    }
    Ok(Box::new(TcpButton::connect(config)?))
}

fn path_arg(arg: Option<&String>) -> Result<Bip32Path> {
    arg.map_or(DEFAULT_PATH, String::as_str).parse()
}

fn cmd_version() -> Result<()> {
    let (_, mut app) = connect()?;
    println!("Version: {}", app.get_version()?);
    Ok(())
}

fn cmd_app_name() -> Result<()> {
    let (_, mut app) = connect()?;
    println!("Application: {}", app.get_app_name()?);
    Ok(())
}

fn cmd_app_and_version() -> Result<()> {
    let (_, mut app) = connect()?;
    let info = app.get_app_and_version()?;
    println!("Application: {}", info.app_name);
    println!("Version:     {}", info.version);
    Ok(())
}

fn cmd_pubkey(args: &[String]) -> Result<()> {
    let display = args.iter().any(|a| a == "--display");
    let path = path_arg(args.iter().find(|a| !a.starts_with("--")))?;
    let (config, mut app) = connect()?;

    let key = if display {
        let mut button = button(&config)?;
        let key = app.get_public_key_with(&path, || {
            button.right_click()?;
            button.both_click()
        });
        button.close()?;
        key?
    } else {
        app.get_public_key(&path, false)?
    };

    println!("Path:       {path}");
    println!("Public key: 0x{}", hex::encode(&key.public_key));
    println!("Chain code: 0x{}", hex::encode(&key.chain_code));
    println!("Address:    {}", key.address()?);
    Ok(())
}

fn cmd_sign_tx(args: &[String]) -> Result<()> {
    let Some(raw) = args.first() else {
        return Err(Error::Encoding("usage: sign-tx <hex> [path]".to_string()));
    };
    let transaction = hex::decode(raw.strip_prefix("0x").unwrap_or(raw))?;
    let path = path_arg(args.get(1))?;

    let (config, mut app) = connect()?;
    let key = app.get_public_key(&path, false)?;

    let mut button = button(&config)?;
    let signature = app.sign_tx_with(&path, &transaction, || {
        button.right_click()?;
        button.both_click()
    });
    button.close()?;
    let signature = signature?;

    println!("Signature: {signature}");
    println!(
        "Verified:  {}",
        verify_transaction_signature(&key.public_key, &signature, &transaction)
    );
    Ok(())
}

fn cmd_personal_sign(args: &[String]) -> Result<()> {
    let Some(message) = args.first() else {
        return Err(Error::Encoding("usage: personal-sign <message> [path]".to_string()));
    };
    let path = path_arg(args.get(1))?;

    let (config, mut app) = connect()?;
    let key = app.get_public_key(&path, false)?;

    let mut button = button(&config)?;
    let pending = app.begin_personal_sign(&path, message.as_bytes())?;
    let confirmed = button.right_click().and_then(|()| button.both_click());
    let signature = app.finish_signing(pending);
    button.close()?;
    confirmed?;
    let signature = signature?;

    println!("Signature: {signature}");
    println!(
        "Verified:  {}",
        verify_personal_message_signature(&key.public_key, &signature, message.as_bytes())
    );
    Ok(())
}
