//! ternion-admin CLI tool
//!
//! Talks to a running ternion-node over its admin socket.
//!
//! Usage:
//!   ternion-admin suspend <member>
//!   ternion-admin reinstate <member>
//!   ternion-admin show <member>
//!   ternion-admin placement <sponsor>
//!   ternion-admin active-sponsor <member>
//!   ternion-admin beneficiary <payer> <tier>
//!   ternion-admin ping

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;

/// Admin command sent over the socket.
#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum AdminCommand {
    Suspend { member: String },
    Reinstate { member: String },
    Show { member: String },
    Placement { sponsor: String },
    ActiveSponsor { member: String },
    Beneficiary { payer: String, tier: String },
    Ping,
}

/// Response from admin command.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Member { member: serde_json::Value },
    Placement { parent_id: String, degraded: bool },
    Sponsor { sponsor_id: Option<String> },
    Beneficiary {
        beneficiary: Option<String>,
        last_checked: Option<String>,
    },
    Pong,
}

fn print_usage() {
    eprintln!("ternion-admin - Administer a Ternion node");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  ternion-admin suspend <member>             Mark a member INACTIVE");
    eprintln!("  ternion-admin reinstate <member>           Mark a member ACTIVE");
    eprintln!("  ternion-admin show <member>                Print a member record");
    eprintln!("  ternion-admin placement <sponsor>          Where a new registrant would land");
    eprintln!("  ternion-admin active-sponsor <member>      Nearest active sponsor");
    eprintln!("  ternion-admin beneficiary <payer> <tier>   Who receives a tier payment");
    eprintln!("  ternion-admin ping                         Check if daemon is running");
    eprintln!();
    eprintln!("Members may be given by id or email.");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TERNION_ADMIN_SOCKET  Path to admin socket (default: ./ternion-data/admin.sock)");
}

fn get_socket_path() -> PathBuf {
    std::env::var("TERNION_ADMIN_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./ternion-data/admin.sock"))
}

fn send_command(cmd: AdminCommand) -> Result<AdminResponse, String> {
    let socket_path = get_socket_path();

    let mut stream = UnixStream::connect(&socket_path).map_err(|e| {
        format!(
            "Failed to connect to ternion-node at {:?}: {}\n\
             Is the ternion-node running?",
            socket_path, e
        )
    })?;

    // Send command
    let cmd_json = serde_json::to_string(&cmd).map_err(|e| e.to_string())?;
    writeln!(stream, "{}", cmd_json).map_err(|e| e.to_string())?;

    // Read response
    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| e.to_string())?;

    serde_json::from_str(&response_line).map_err(|e| format!("Invalid response: {}", e))
}

/// The `n`th argument, or exit with a usage error.
fn required(args: &[String], n: usize, what: &str) -> String {
    match args.get(n) {
        Some(arg) => arg.clone(),
        None => {
            eprintln!("Error: {} requires a {} argument", args[1], what);
            std::process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let cmd = match args[1].as_str() {
        "suspend" => AdminCommand::Suspend {
            member: required(&args, 2, "member"),
        },
        "reinstate" => AdminCommand::Reinstate {
            member: required(&args, 2, "member"),
        },
        "show" => AdminCommand::Show {
            member: required(&args, 2, "member"),
        },
        "placement" => AdminCommand::Placement {
            sponsor: required(&args, 2, "sponsor"),
        },
        "active-sponsor" => AdminCommand::ActiveSponsor {
            member: required(&args, 2, "member"),
        },
        "beneficiary" => AdminCommand::Beneficiary {
            payer: required(&args, 2, "payer"),
            tier: required(&args, 3, "tier"),
        },
        "ping" => AdminCommand::Ping,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    match send_command(cmd) {
        Ok(response) => match response {
            AdminResponse::Ok { message } => {
                println!("{}", message);
            }
            AdminResponse::Error { error } => {
                eprintln!("Error: {}", error);
                std::process::exit(1);
            }
            AdminResponse::Member { member } => {
                match serde_json::to_string_pretty(&member) {
                    Ok(pretty) => println!("{}", pretty),
                    Err(_) => println!("{}", member),
                }
            }
            AdminResponse::Placement { parent_id, degraded } => {
                if degraded {
                    println!("{} (degraded: search cap reached)", parent_id);
                } else {
                    println!("{}", parent_id);
                }
            }
            AdminResponse::Sponsor { sponsor_id } => match sponsor_id {
                Some(id) => println!("{}", id),
                None => {
                    println!("(none)");
                    std::process::exit(1);
                }
            },
            AdminResponse::Beneficiary {
                beneficiary,
                last_checked,
            } => match beneficiary {
                Some(id) => println!("{}", id),
                None => {
                    println!(
                        "(none, stopped at {})",
                        last_checked.as_deref().unwrap_or("?")
                    );
                    std::process::exit(1);
                }
            },
            AdminResponse::Pong => {
                println!("pong - ternion-node is running");
            }
        },
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
