//! `upkeep apps` subcommands.

use serde::Serialize;

use super::Context;
use crate::cli::args::AppsCommand;
use crate::core::{Application, BindProviderRequest, CreateApplicationRequest, ProviderBinding};
use crate::error::Result;
use crate::render::{human, render};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationDetail {
    application: Application,
    bindings: Vec<ProviderBinding>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Deleted {
    application_id: i64,
    deleted: bool,
}

/// Execute application commands.
///
/// # Errors
/// Returns an error when input is rejected or the application is unknown.
pub fn execute(cmd: &AppsCommand, ctx: &Context) -> Result<String> {
    match cmd {
        AppsCommand::Add {
            name,
            provider,
            url,
            tags,
        } => {
            let application = ctx.upkeep.create_application(CreateApplicationRequest {
                user_id: ctx.user()?.to_string(),
                name: name.clone(),
                url: url.clone(),
                provider: provider.clone(),
                tags: tags.clone(),
            })?;
            show("apps add", application, ctx)
        }
        AppsCommand::Bind {
            app_id,
            provider,
            resource,
        } => {
            ctx.upkeep.bind_provider(BindProviderRequest {
                application_id: *app_id,
                provider: provider.clone(),
                resource: resource.clone(),
            })?;
            show("apps bind", ctx.upkeep.application(*app_id)?, ctx)
        }
        AppsCommand::List => {
            let apps = ctx.upkeep.list_applications(ctx.user()?)?;
            render("apps list", &apps, ctx.format, ctx.pretty, |a| {
                human::render_applications(a)
            })
        }
        AppsCommand::Show { app_id } => show("apps show", ctx.upkeep.application(*app_id)?, ctx),
        AppsCommand::Remove { app_id } => {
            ctx.upkeep.delete_application(*app_id)?;
            let data = Deleted {
                application_id: *app_id,
                deleted: true,
            };
            render("apps remove", &data, ctx.format, ctx.pretty, |d| {
                format!("Deleted application {}.", d.application_id)
            })
        }
    }
}

fn show(command: &str, application: Application, ctx: &Context) -> Result<String> {
    let bindings = ctx.upkeep.bindings(application.id)?;
    let detail = ApplicationDetail {
        application,
        bindings,
    };
    render(command, &detail, ctx.format, ctx.pretty, |d| {
        human::render_application(&d.application, &d.bindings)
    })
}
