//! The generated command tree, `kubefield <verb> <resource> <field>`

pub mod run;

use std::{
    collections::{BTreeMap, BTreeSet},
    ffi::OsString,
    path::PathBuf,
};

use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Args, Command, FromArgMatches};
use itertools::Itertools;

use crate::{
    error::Error,
    fields::{FieldDefinition, FieldTable, Verb},
    flags::{ClapFlags, FlagSynthesizer, Materializer},
    output::OutputFormat,
    path::FieldPath,
    resource::{Resource, ResourceIndex},
    schema::Models,
};

/// Argument names defined by the tree itself, never used for synthesized flags
const RESERVED: [&str; 8] = [
    "filename",
    "live",
    "output-format",
    "output-destination",
    "value",
    "help",
    "openapi",
    "fields",
];

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct GlobalArgs {
    /// Swagger document to read schemas from, must precede the command
    #[arg(long, global = true, value_name = "PATH")]
    pub openapi: Option<PathBuf>,
    /// YAML file of field definitions, must precede the command
    #[arg(long, global = true, value_name = "PATH")]
    pub fields: Option<PathBuf>,
}

impl GlobalArgs {
    /// Read the global options before the full tree exists. Everything else is ignored.
    pub fn peek<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let command = Self::augment_args(Command::new("kubefield"))
            .ignore_errors(true)
            .allow_external_subcommands(true)
            .disable_help_flag(true)
            .disable_version_flag(true);
        command
            .try_get_matches_from(args)
            .ok()
            .and_then(|matches| Self::from_arg_matches(&matches).ok())
            .unwrap_or_default()
    }
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct InputArgs {
    /// Files to read documents from, `-` reads stdin
    #[arg(short = 'f', long = "filename", value_name = "FILE")]
    pub filenames: Vec<String>,
    /// Read the object named by --name and --namespace from the cluster
    #[arg(long)]
    pub live: bool,
}

#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output_format: OutputFormat,
    /// File to write to instead of stdout
    #[arg(long, value_name = "FILE")]
    pub output_destination: Option<PathBuf>,
}

/// Options of one invocation of a field command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunArgs {
    pub input: InputArgs,
    pub output: OutputArgs,
    /// Value given to `prefix` commands
    pub prefix: Option<String>,
}

/// A command for one field of one resource
#[derive(Debug)]
pub struct FieldCommand {
    pub verb: Verb,
    pub resource: Resource,
    pub field: String,
    /// Paths of the field definition that resolve in the resource
    pub paths: Vec<FieldPath>,
    flags: ClapFlags,
    materializer: Materializer,
}

impl FieldCommand {
    pub fn build(
        models: &Models,
        verb: Verb,
        resource: &Resource,
        definition: &FieldDefinition,
        paths: Vec<FieldPath>,
        expand_roots: &BTreeSet<String>,
    ) -> Result<Self, Error> {
        let schema = resource
            .schema(models)
            .ok_or_else(|| Error::UnresolvedReference(resource.definition.clone()))?;
        let mut flags = ClapFlags::with_reserved(RESERVED);
        // Only set and patch take values from flags, the rest just need to name an object
        let synthesized: &[FieldPath] = match verb {
            Verb::Set | Verb::Patch => &paths,
            _ => &[],
        };
        let materializer = FlagSynthesizer::new(models, &mut flags)
            .with_expand_roots(expand_roots.iter().cloned())
            .synthesize(&resource.gvk(), schema, synthesized)?;
        Ok(Self {
            verb,
            resource: resource.clone(),
            field: definition.name.clone(),
            paths,
            flags,
            materializer,
        })
    }

    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    fn command(&self) -> Command {
        let about = format!(
            "{} `{}` of {}",
            self.verb.about(),
            self.field,
            self.resource.api.plural
        );
        let command = Command::new(self.field.clone()).about(about);
        let command = match self.verb {
            Verb::Patch => OutputArgs::augment_args(command),
            _ => OutputArgs::augment_args(InputArgs::augment_args(command)),
        };
        let command = match self.verb {
            Verb::Prefix => command.arg(
                Arg::new("value")
                    .long("value")
                    .required(true)
                    .help("Prefix to put in front of the current value"),
            ),
            _ => command,
        };
        self.flags.augment(command)
    }

    fn parse_args(&self, matches: &ArgMatches) -> Result<RunArgs> {
        self.flags.apply(matches).context("failed to read flags")?;
        let input = match self.verb {
            Verb::Patch => InputArgs::default(),
            _ => InputArgs::from_arg_matches(matches)?,
        };
        let output = OutputArgs::from_arg_matches(matches)?;
        let prefix = match self.verb {
            Verb::Prefix => matches.get_one::<String>("value").cloned(),
            _ => None,
        };
        Ok(RunArgs {
            input,
            output,
            prefix,
        })
    }
}

pub enum Dispatch<'t> {
    Resources,
    Field {
        command: &'t FieldCommand,
        args: RunArgs,
    },
}

/// Every field command that could be built, by verb, resource and field
pub struct CommandTree {
    commands: BTreeMap<(Verb, String, String), FieldCommand>,
}

impl CommandTree {
    /// Build a command for each field definition and each resource where one of its paths
    /// resolves. Commands that fail to build are logged and left out.
    pub fn build(
        models: &Models,
        index: &ResourceIndex,
        table: &FieldTable,
        expand_roots: &BTreeSet<String>,
    ) -> Self {
        let mut commands = BTreeMap::new();
        for verb in Verb::ALL {
            for definition in table.for_verb(verb) {
                for (name, _) in index.iter() {
                    let Some((resource, paths)) = index.select(models, name, &definition.paths)
                    else {
                        continue;
                    };
                    let built = FieldCommand::build(
                        models,
                        verb,
                        resource,
                        definition,
                        paths,
                        expand_roots,
                    );
                    match built {
                        Ok(command) => {
                            let key = (verb, name.to_string(), definition.name.clone());
                            commands.insert(key, command);
                        }
                        Err(err) => tracing::warn!(
                            %verb,
                            resource = name,
                            field = %definition.name,
                            error = %err,
                            "failed to build command, skipping"
                        ),
                    }
                }
            }
        }
        tracing::debug!(commands = commands.len(), "built command tree");
        Self { commands }
    }

    pub fn get(&self, verb: Verb, resource: &str, field: &str) -> Option<&FieldCommand> {
        self.commands
            .get(&(verb, resource.to_string(), field.to_string()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn command(&self) -> Command {
        let mut root = GlobalArgs::augment_args(
            Command::new("kubefield")
                .about("Edit fields of Kubernetes resources with flags generated from their schemas")
                .subcommand_required(true)
                .arg_required_else_help(true),
        )
        .subcommand(Command::new("resources").about("List resources and their fields"));

        for verb in Verb::ALL {
            let mut verb_command = Command::new(verb.as_str())
                .about(verb.about())
                .subcommand_required(true)
                .arg_required_else_help(true);
            let by_resource = self
                .commands
                .iter()
                .filter(|((v, _, _), _)| *v == verb)
                .group_by(|((_, resource, _), _)| resource.clone());
            for (resource, commands) in &by_resource {
                let mut resource_command = Command::new(resource.clone())
                    .subcommand_required(true)
                    .arg_required_else_help(true);
                for (_, command) in commands {
                    resource_command = resource_command.subcommand(command.command());
                }
                verb_command = verb_command.subcommand(resource_command);
            }
            root = root.subcommand(verb_command);
        }
        root
    }

    /// Find the command `matches` selected and read its arguments
    pub fn dispatch(&self, matches: &ArgMatches) -> Result<Dispatch<'_>> {
        let (verb_name, verb_matches) = matches
            .subcommand()
            .ok_or_else(|| anyhow!("no command given"))?;
        if verb_name == "resources" {
            return Ok(Dispatch::Resources);
        }
        let verb = Verb::ALL
            .into_iter()
            .find(|verb| verb.as_str() == verb_name)
            .ok_or_else(|| anyhow!("unknown command `{}`", verb_name))?;
        let (resource, resource_matches) = verb_matches
            .subcommand()
            .ok_or_else(|| anyhow!("no resource given"))?;
        let (field, field_matches) = resource_matches
            .subcommand()
            .ok_or_else(|| anyhow!("no field given"))?;
        let command = self
            .get(verb, resource, field)
            .ok_or_else(|| anyhow!("no command `{} {} {}`", verb, resource, field))?;
        let args = command.parse_args(field_matches).with_context(|| {
            format!("failed to read arguments of `{} {} {}`", verb, resource, field)
        })?;
        Ok(Dispatch::Field { command, args })
    }

    /// One line per resource version: plural name, API version and the fields commands exist for
    pub fn listing(&self) -> String {
        let mut resources: BTreeMap<(&str, &str), BTreeSet<&str>> = BTreeMap::new();
        for ((_, resource, field), command) in &self.commands {
            resources
                .entry((resource.as_str(), command.resource.api.api_version.as_str()))
                .or_default()
                .insert(field.as_str());
        }
        resources
            .into_iter()
            .map(|((resource, api_version), fields)| {
                format!("{}\t{}\t{}\n", resource, api_version, fields.iter().join(","))
            })
            .collect()
    }
}
