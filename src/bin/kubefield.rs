use std::ffi::OsString;

use anyhow::{anyhow, Context, Result};
use kube::Client;
use tracing::Instrument;

use kubefield::{
    cluster,
    command::{run::read_documents, CommandTree, Dispatch, FieldCommand, GlobalArgs, RunArgs},
    config::Config,
    fields::FieldTable,
    output,
    resource::ResourceIndex,
    schema::{openapi, Models},
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .compact()
        .without_time()
        .init();

    let config = Config::try_from_env().context("failed to read configuration from environment")?;
    let argv: Vec<OsString> = std::env::args_os().collect();
    let global = GlobalArgs::peek(&argv);
    let mut client = None;

    let models = match global.openapi.as_ref().or(config.openapi_path.as_ref()) {
        Some(path) => openapi::from_path(path)
            .with_context(|| format!("failed to load OpenAPI document {}", path.display()))?,
        None => cluster::fetch_models(&connect(&mut client).await?)
            .await
            .context("failed to fetch OpenAPI document from the cluster")?,
    };

    let table = match global.fields.as_ref().or(config.fields_path.as_ref()) {
        Some(path) => FieldTable::from_path(path)
            .with_context(|| format!("failed to load field definitions {}", path.display()))?,
        None => FieldTable::builtin(),
    };

    let mut index = if config.discovery {
        let discovered = cluster::discover(&connect(&mut client).await?)
            .await
            .context("failed to discover API resources")?;
        ResourceIndex::from_discovery(&models, discovered)
    } else {
        ResourceIndex::from_models(&models)
    };
    index.filter_group_version(config.api_group.as_deref(), config.api_version.as_deref());
    tracing::info!(resources = index.len(), "indexed resources");

    let tree = CommandTree::build(&models, &index, &table, &config.expand_roots);
    let matches = tree.command().get_matches_from(&argv);

    match tree.dispatch(&matches)? {
        Dispatch::Resources => {
            print!("{}", tree.listing());
            Ok(())
        }
        Dispatch::Field { command, args } => {
            let span = tracing::info_span!(
                "command",
                verb = %command.verb,
                resource = %command.resource.api.plural,
                field = %command.field,
            );
            run_command(&models, command, args, &mut client)
                .instrument(span)
                .await
        }
    }
}

async fn run_command(
    models: &Models,
    command: &FieldCommand,
    args: RunArgs,
    client: &mut Option<Client>,
) -> Result<()> {
    let mut documents = read_documents(&args.input.filenames)?;

    if args.input.live {
        let name = command
            .materializer()
            .name()
            .ok_or_else(|| anyhow!("--name is required with --live"))?;
        let namespace = command.materializer().namespace();
        let live = cluster::fetch_live(
            &connect(client).await?,
            &command.resource,
            namespace.as_deref(),
            &name,
        )
        .await
        .context("failed to get live object")?;
        documents.push(live);
    }
    tracing::debug!(documents = documents.len(), "read input documents");

    let outcomes = command
        .run(models, documents, args.prefix.as_deref())
        .context("failed to run command")?;
    output::write(
        args.output.output_format,
        args.output.output_destination.as_deref(),
        &outcomes,
    )
    .context("failed to write output")
}

/// Create the Kubernetes client on first use
async fn connect(client: &mut Option<Client>) -> Result<Client> {
    if let Some(client) = client {
        return Ok(client.clone());
    }
    let created = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    *client = Some(created.clone());
    Ok(created)
}
