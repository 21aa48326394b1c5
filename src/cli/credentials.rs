//! `upkeep credentials` subcommands.

use serde::Serialize;

use super::Context;
use crate::cli::args::CredentialsCommand;
use crate::core::{Provider, SaveCredentialRequest};
use crate::error::Result;
use crate::render::{human, render};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CredentialChange {
    user_id: String,
    provider: Provider,
    connected: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectedProviders {
    user_id: String,
    providers: Vec<Provider>,
}

/// Execute credential commands.
///
/// # Errors
/// Returns an error when no user is configured or the change is rejected.
pub fn execute(cmd: &CredentialsCommand, ctx: &Context) -> Result<String> {
    let user_id = ctx.user()?.to_string();
    match cmd {
        CredentialsCommand::Set {
            provider,
            token,
            team,
        } => {
            let provider = ctx.upkeep.save_credential(SaveCredentialRequest {
                user_id: user_id.clone(),
                provider: provider.clone(),
                token: token.clone(),
                team_id: team.clone(),
            })?;
            let change = CredentialChange {
                user_id,
                provider,
                connected: true,
            };
            render("credentials set", &change, ctx.format, ctx.pretty, |c| {
                format!("Connected {} for {}.", c.provider.display_name(), c.user_id)
            })
        }
        CredentialsCommand::Remove { provider } => {
            let existed = ctx.upkeep.remove_credential(&user_id, provider)?;
            let provider = Provider::from_slug(provider)?;
            let change = CredentialChange {
                user_id,
                provider,
                connected: false,
            };
            render("credentials remove", &change, ctx.format, ctx.pretty, |c| {
                if existed {
                    format!("Disconnected {} for {}.", c.provider.display_name(), c.user_id)
                } else {
                    format!("{} was not connected for {}.", c.provider.display_name(), c.user_id)
                }
            })
        }
        CredentialsCommand::List => {
            let providers = ctx.upkeep.connected_providers(&user_id)?;
            let data = ConnectedProviders { user_id, providers };
            render("credentials list", &data, ctx.format, ctx.pretty, |d| {
                human::render_connected(&d.user_id, &d.providers)
            })
        }
    }
}
