//! [`FlagSurface`] backed by clap arguments

use std::collections::BTreeSet;

use ::clap::{
    builder::BoolishValueParser, parser::ValueSource, value_parser, Arg, ArgAction, ArgMatches,
    Command,
};

use super::{FlagCell, FlagKind, FlagSpec, FlagSurface, FlagValue};
use crate::error::{Error, Result};

/// Collects synthesized flags, turns them into clap arguments and copies parsed values back into
/// their cells.
#[derive(Debug, Default)]
pub struct ClapFlags {
    flags: Vec<(FlagSpec, FlagCell)>,
    /// Names taken by arguments defined elsewhere on the same command
    reserved: BTreeSet<String>,
}

impl ClapFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            flags: Vec::new(),
            reserved: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn specs(&self) -> impl Iterator<Item = &FlagSpec> {
        self.flags.iter().map(|(spec, _)| spec)
    }

    pub fn augment(&self, command: Command) -> Command {
        command.args(self.flags.iter().map(|(spec, _)| to_arg(spec)))
    }

    /// Copy parsed values into the registered cells
    pub fn apply(&self, matches: &ArgMatches) -> Result<()> {
        for (spec, cell) in &self.flags {
            let name = spec.name.as_str();
            let value = match read_value(matches, spec) {
                Ok(Some(value)) => value,
                Ok(None) => {
                    cell.set(spec.default.clone(), false);
                    continue;
                }
                Err(err) => {
                    return Err(Error::InvalidFlag {
                        flag: spec.name.clone(),
                        message: err.to_string(),
                    })
                }
            };
            let changed = matches.value_source(name) == Some(ValueSource::CommandLine);
            cell.set(value, changed);
        }
        Ok(())
    }
}

impl FlagSurface for ClapFlags {
    fn register(&mut self, spec: FlagSpec) -> Result<FlagCell> {
        if self.reserved.contains(&spec.name) || self.flags.iter().any(|(s, _)| s.name == spec.name)
        {
            return Err(Error::FlagConflict(spec.name));
        }
        let cell = FlagCell::new(spec.default.clone());
        self.flags.push((spec, cell.clone()));
        Ok(cell)
    }

    fn changed(&self, name: &str) -> bool {
        self.flags
            .iter()
            .find(|(spec, _)| spec.name == name)
            .map_or(false, |(_, cell)| cell.changed())
    }
}

fn to_arg(spec: &FlagSpec) -> Arg {
    let help = spec.description.lines().next().unwrap_or_default().to_string();
    let arg = Arg::new(spec.name.clone())
        .long(spec.name.clone())
        .help(help);
    let arg = match spec.kind() {
        FlagKind::String | FlagKind::StringSlice => arg.value_parser(value_parser!(String)),
        FlagKind::Int | FlagKind::IntSlice => arg.value_parser(value_parser!(i64)),
        FlagKind::Float | FlagKind::FloatSlice => arg.value_parser(value_parser!(f64)),
        FlagKind::Bool | FlagKind::BoolSlice => arg.value_parser(BoolishValueParser::new()),
    };
    let arg = match spec.kind() {
        FlagKind::Bool => arg
            .action(ArgAction::Set)
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true"),
        kind if kind.is_slice() => arg.action(ArgAction::Append).value_delimiter(','),
        _ => arg.action(ArgAction::Set),
    };
    match &spec.default {
        // No default at all rather than an empty one
        FlagValue::String(s) if s.is_empty() => arg,
        default => {
            let defaults = default.to_args();
            if defaults.is_empty() {
                arg
            } else {
                arg.default_values(defaults)
            }
        }
    }
}

fn read_value(
    matches: &ArgMatches,
    spec: &FlagSpec,
) -> Result<Option<FlagValue>, ::clap::parser::MatchesError> {
    let id = spec.name.as_str();
    let value = match spec.kind() {
        FlagKind::String => matches
            .try_get_one::<String>(id)?
            .map(|s| FlagValue::String(s.clone())),
        FlagKind::Int => matches.try_get_one::<i64>(id)?.map(|&i| FlagValue::Int(i)),
        FlagKind::Bool => matches.try_get_one::<bool>(id)?.map(|&b| FlagValue::Bool(b)),
        FlagKind::Float => matches.try_get_one::<f64>(id)?.map(|&f| FlagValue::Float(f)),
        FlagKind::StringSlice => matches
            .try_get_many::<String>(id)?
            .map(|v| FlagValue::StringSlice(v.cloned().collect())),
        FlagKind::IntSlice => matches
            .try_get_many::<i64>(id)?
            .map(|v| FlagValue::IntSlice(v.copied().collect())),
        FlagKind::BoolSlice => matches
            .try_get_many::<bool>(id)?
            .map(|v| FlagValue::BoolSlice(v.copied().collect())),
        FlagKind::FloatSlice => matches
            .try_get_many::<f64>(id)?
            .map(|v| FlagValue::FloatSlice(v.copied().collect())),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(flags: &ClapFlags) -> Command {
        flags.augment(Command::new("test").no_binary_name(true))
    }

    #[test]
    fn test_parse_flags() {
        let mut flags = ClapFlags::new();
        let image = flags.string("image", "", "container image").unwrap();
        let replicas = flags.int32("replicas", 1, "number of replicas").unwrap();
        let paused = flags.bool("paused", false, "paused").unwrap();
        let names = flags.string_slice("containers-name", "names").unwrap();
        let ports = flags.int_slice("ports", "ports").unwrap();

        let matches = command(&flags)
            .try_get_matches_from([
                "--image=nginx:1.21",
                "--paused",
                "--containers-name=web,sidecar",
                "--ports",
                "80",
                "--ports",
                "443",
            ])
            .unwrap();
        flags.apply(&matches).unwrap();

        assert_eq!(image.get(), FlagValue::String("nginx:1.21".into()));
        assert!(image.changed());
        assert_eq!(replicas.get(), FlagValue::Int(1));
        assert!(!replicas.changed());
        assert!(!flags.changed("replicas"));
        assert_eq!(paused.get(), FlagValue::Bool(true));
        assert_eq!(
            names.get(),
            FlagValue::StringSlice(vec!["web".into(), "sidecar".into()])
        );
        assert_eq!(ports.get(), FlagValue::IntSlice(vec![80, 443]));
        assert!(flags.changed("ports"));
    }

    #[test]
    fn test_explicit_false() {
        let mut flags = ClapFlags::new();
        let paused = flags.bool("paused", true, "paused").unwrap();
        let matches = command(&flags)
            .try_get_matches_from(["--paused=false"])
            .unwrap();
        flags.apply(&matches).unwrap();
        assert_eq!(paused.get(), FlagValue::Bool(false));
        assert!(paused.changed());
    }

    #[test]
    fn test_invalid_value() {
        let mut flags = ClapFlags::new();
        flags.int32("replicas", 0, "number of replicas").unwrap();
        assert!(command(&flags)
            .try_get_matches_from(["--replicas=many"])
            .is_err());
    }

    #[test]
    fn test_conflict() {
        let mut flags = ClapFlags::with_reserved(["filename"]);
        flags.string("image", "", "").unwrap();
        assert!(matches!(
            flags.string("image", "", ""),
            Err(Error::FlagConflict(_))
        ));
        assert!(matches!(
            flags.string_slice("filename", ""),
            Err(Error::FlagConflict(_))
        ));
    }
}
