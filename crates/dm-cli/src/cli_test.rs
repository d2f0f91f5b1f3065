use super::*;
use clap::{CommandFactory, Parser};

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_history_limit_default() {
    let cli = Cli::try_parse_from(["dm", "history"]).unwrap();
    match cli.command {
        Commands::History(args) => {
            assert_eq!(args.limit, 20);
            assert!(args.execution_id.is_none());
        }
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_history_single_execution() {
    let cli = Cli::try_parse_from(["dm", "history", "--id", "abc"]).unwrap();
    match cli.command {
        Commands::History(args) => assert_eq!(args.execution_id.as_deref(), Some("abc")),
        other => panic!("unexpected command {:?}", other),
    }
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from(["dm", "migrate", "-e", "prod", "-v", "-p", "/srv/app"]).unwrap();
    assert_eq!(cli.global.environment.as_deref(), Some("prod"));
    assert!(cli.global.verbose);
    assert_eq!(cli.global.project_dir, "/srv/app");
    assert_eq!(cli.command.name(), "migrate");
}

#[test]
fn test_clean_requires_explicit_yes() {
    let cli = Cli::try_parse_from(["dm", "clean"]).unwrap();
    match cli.command {
        Commands::Clean(args) => assert!(!args.yes),
        other => panic!("unexpected command {:?}", other),
    }
    let cli = Cli::try_parse_from(["dm", "clean", "--yes"]).unwrap();
    assert!(matches!(cli.command, Commands::Clean(CleanArgs { yes: true })));
}

#[test]
fn test_unknown_command_rejected() {
    assert!(Cli::try_parse_from(["dm", "rollback"]).is_err());
}
