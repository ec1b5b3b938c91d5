use std::path::PathBuf;

use clap::{Parser, Subcommand};
use therapist_core::GroupBy;

#[derive(Parser)]
#[command(name = "therapist")]
#[command(version, about = "Dwarf Fortress labor manager")]
pub struct Cli {
    /// Settings file (default: <config dir>/therapist/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Executable name of the game process
    #[arg(short, long, global = true, env = "THERAPIST_PROCESS")]
    pub process: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the attach target, its build and the matching layout
    Status,

    /// Locate the creature vector and word tables
    Scan,

    /// Print creatures grouped and sorted
    List {
        /// nothing, profession, legendary, sex or happiness
        #[arg(short, long)]
        group: Option<GroupBy>,

        /// Sort by this labor's skill rating instead of by name
        #[arg(short, long)]
        labor: Option<String>,

        /// Print the groups as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change labors or skill ratings and write them to the game
    Edit {
        /// JSON file with a list of changes
        #[arg(long, conflicts_with = "profession")]
        changes: Option<PathBuf>,

        /// Custom profession from the settings file to apply
        #[arg(long, requires = "entity")]
        profession: Option<String>,

        /// Creature ids the custom profession is applied to
        #[arg(short, long, num_args = 1..)]
        entity: Vec<i32>,

        /// Show what would change, then discard instead of committing
        #[arg(long)]
        dry_run: bool,
    },

    /// Export decoded creatures as JSON
    Dump {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let cli = Cli::parse_from(["therapist", "list", "--group", "Profession", "--labor", "mining"]);
        match cli.command {
            Command::List { group, labor, json } => {
                assert_eq!(group, Some(GroupBy::Profession));
                assert_eq!(labor.as_deref(), Some("mining"));
                assert!(!json);
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_profession_requires_entity() {
        assert!(Cli::try_parse_from(["therapist", "edit", "--profession", "Miner"]).is_err());
        assert!(
            Cli::try_parse_from(["therapist", "edit", "--profession", "Miner", "-e", "1", "2"])
                .is_ok()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["therapist", "status", "--verbose", "-p", "df.exe"]);
        assert!(cli.verbose);
        assert_eq!(cli.process.as_deref(), Some("df.exe"));
    }
}
