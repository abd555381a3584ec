//! Unix socket server for admin commands.
//!
//! Provides a local IPC interface for suspending members and querying the
//! resolvers against live data. One JSON command per line, one JSON response
//! per line.

use crate::error::Result;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ternion_resolver::{Beneficiary, Placement};
use ternion_tree::{Member, MemberId, MemberKey, Tier};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Admin command sent over the socket.
///
/// Member references accept an id or an email.
#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum AdminCommand {
    /// Mark a member INACTIVE
    Suspend { member: String },
    /// Mark a member ACTIVE again
    Reinstate { member: String },
    /// Show a member record
    Show { member: String },
    /// Where a registration sponsored by `sponsor` would land
    Placement { sponsor: String },
    /// Nearest active sponsor at or above `member`
    ActiveSponsor { member: String },
    /// Who receives `payer`'s payment for `tier`
    Beneficiary { payer: String, tier: String },
    /// Ping (health check)
    Ping,
}

/// Response from admin command.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdminResponse {
    Ok { message: String },
    Error { error: String },
    Member { member: Member },
    Placement { parent_id: MemberId, degraded: bool },
    Sponsor { sponsor_id: Option<MemberId> },
    Beneficiary {
        beneficiary: Option<MemberId>,
        last_checked: Option<MemberId>,
    },
    Pong,
}

/// Admin socket server.
pub struct AdminSocket {
    registry: Arc<Registry>,
    socket_path: PathBuf,
}

impl AdminSocket {
    /// Create a new admin socket server.
    pub fn new(registry: Arc<Registry>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            socket_path: socket_path.into(),
        }
    }

    /// Run the admin socket server.
    pub async fn run(&self) -> Result<()> {
        // Remove a stale socket file from a previous run
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Admin socket listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry).await {
                            tracing::error!("Admin connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept admin connection: {}", e);
                }
            }
        }
    }

    /// Get the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream, registry: Arc<Registry>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    while reader.read_line(&mut line).await? > 0 {
        let response = match serde_json::from_str::<AdminCommand>(&line) {
            Ok(cmd) => execute_command(cmd, &registry).await,
            Err(e) => AdminResponse::Error {
                error: format!("Invalid command: {}", e),
            },
        };

        let response_json = serde_json::to_string(&response)? + "\n";
        writer.write_all(response_json.as_bytes()).await?;
        line.clear();
    }

    Ok(())
}

async fn execute_command(cmd: AdminCommand, registry: &Registry) -> AdminResponse {
    match run_command(cmd, registry).await {
        Ok(response) => response,
        Err(e) => AdminResponse::Error {
            error: e.to_string(),
        },
    }
}

async fn run_command(cmd: AdminCommand, registry: &Registry) -> Result<AdminResponse> {
    let response = match cmd {
        AdminCommand::Suspend { member } => {
            let member = registry.suspend(&MemberKey::parse(&member)?).await?;
            AdminResponse::Ok {
                message: format!("Suspended {} ({})", member.id, member.email),
            }
        }

        AdminCommand::Reinstate { member } => {
            let member = registry.reinstate(&MemberKey::parse(&member)?).await?;
            AdminResponse::Ok {
                message: format!("Reinstated {} ({})", member.id, member.email),
            }
        }

        AdminCommand::Show { member } => AdminResponse::Member {
            member: registry.member(&MemberKey::parse(&member)?)?,
        },

        AdminCommand::Placement { sponsor } => {
            let sponsor = registry.member(&MemberKey::parse(&sponsor)?)?;
            match registry.resolver().placement(&sponsor.id).await? {
                Placement::Slot(parent_id) => AdminResponse::Placement {
                    parent_id,
                    degraded: false,
                },
                Placement::Degraded(parent_id) => AdminResponse::Placement {
                    parent_id,
                    degraded: true,
                },
            }
        }

        AdminCommand::ActiveSponsor { member } => AdminResponse::Sponsor {
            sponsor_id: registry
                .resolver()
                .active_sponsor(&MemberKey::parse(&member)?)
                .await?,
        },

        AdminCommand::Beneficiary { payer, tier } => {
            let payer = registry.member(&MemberKey::parse(&payer)?)?;
            let tier: Tier = tier.parse()?;
            match registry.resolver().beneficiary(&payer.id, tier).await? {
                Beneficiary::Found(id) => AdminResponse::Beneficiary {
                    beneficiary: Some(id),
                    last_checked: None,
                },
                Beneficiary::NoBeneficiary { last_checked } => AdminResponse::Beneficiary {
                    beneficiary: None,
                    last_checked: Some(last_checked),
                },
            }
        }

        AdminCommand::Ping => AdminResponse::Pong,
    };
    Ok(response)
}
