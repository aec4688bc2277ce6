//! Command-line flags.

use clap::Parser;

use crate::logging::Verbosity;

/// Bridge HDMI-CEC volume, mute and power to an IR-only amplifier via lircd.
#[derive(Parser, Debug)]
#[command(name = "cec-lirc", version, about)]
pub struct Args {
    /// Echo every CEC log message, bus traffic included
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Echo no CEC log messages
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    pub fn verbosity(&self) -> Verbosity {
        match (self.verbose, self.quiet) {
            (true, _) => Verbosity::Verbose,
            (_, true) => Verbosity::Quiet,
            _ => Verbosity::Normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("cec-lirc").chain(args.iter().copied()))
    }

    #[test]
    fn no_flags_is_normal() {
        assert_eq!(parse(&[]).unwrap().verbosity(), Verbosity::Normal);
    }

    #[test]
    fn short_and_long_flags() {
        assert_eq!(parse(&["-v"]).unwrap().verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["--verbose"]).unwrap().verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["-q"]).unwrap().verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["--quiet"]).unwrap().verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(parse(&["-v", "-q"]).is_err());
    }

    #[test]
    fn positional_arguments_are_rejected() {
        assert!(parse(&["/dev/cec0"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
