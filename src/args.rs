//! Command-line argument parsing and processing.
//!
//! This module handles parsing of command-line arguments and provides a clean
//! interface for the main application logic. It supports the standard help,
//! version, and debug flags while gracefully handling unknown options.

use chrono::NaiveDate;

/// Represents the parsed command-line arguments and their intended actions.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the controller until a shutdown signal arrives
    Run {
        debug_enabled: bool,
        config_path: Option<String>,
        log_file: Option<String>,
    },
    /// Validate the configuration, print the plan of one day and exit
    Check {
        debug_enabled: bool,
        config_path: Option<String>,
        date: Option<NaiveDate>,
    },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to unknown or malformed arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse command-line arguments into a structured result.
    ///
    /// The first item is the program name and is skipped. Version takes
    /// precedence over help, help over everything else.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut debug_enabled = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut run_check = false;
        let mut unknown_arg_found = false;
        let mut config_path: Option<String> = None;
        let mut log_file: Option<String> = None;
        let mut date: Option<NaiveDate> = None;

        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut i = 0;
        while i < args_vec.len() {
            let arg_str = args_vec[i].as_str();
            match arg_str {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--debug" | "-d" => debug_enabled = true,
                "--check" => run_check = true,
                "--config" | "-c" | "--log" | "--date" => {
                    let Some(value) = args_vec.get(i + 1).filter(|v| !v.starts_with('-')) else {
                        log_warning!("Missing value for {arg_str}");
                        unknown_arg_found = true;
                        i += 1;
                        continue;
                    };

                    match arg_str {
                        "--log" => log_file = Some(value.clone()),
                        "--date" => match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
                            Ok(parsed) => date = Some(parsed),
                            Err(_) => {
                                log_error!("Invalid date: '{value}'. Use YYYY-MM-DD");
                                unknown_arg_found = true;
                            }
                        },
                        _ => config_path = Some(value.clone()),
                    }
                    i += 1;
                }
                _ => {
                    if arg_str.starts_with('-') {
                        log_warning!("Unknown option: {arg_str}");
                    } else {
                        log_warning!("Unexpected argument: {arg_str}");
                    }
                    unknown_arg_found = true;
                }
            }
            i += 1;
        }

        if !run_check && date.is_some() && !unknown_arg_found {
            log_warning!("--date only applies together with --check");
            unknown_arg_found = true;
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if display_help {
            CliAction::ShowHelp
        } else if unknown_arg_found {
            CliAction::ShowHelpDueToError
        } else if run_check {
            CliAction::Check {
                debug_enabled,
                config_path,
                date,
            }
        } else {
            CliAction::Run {
                debug_enabled,
                config_path,
                log_file,
            }
        };

        ParsedArgs { action }
    }

    /// Convenience method to parse from std::env::args()
    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using custom logging style.
pub fn display_version_info() {
    log_version!();
    log_pipe!();
    println!("┗ {}", env!("CARGO_PKG_DESCRIPTION"));
}

/// Displays custom help message using logger methods.
pub fn display_help() {
    log_version!();
    log_block_start!(env!("CARGO_PKG_DESCRIPTION"));
    log_block_start!("Usage:");
    log_indented!("terracontrol [OPTIONS]");
    log_block_start!("Options:");
    log_indented!("-c, --config <file>    Use a custom configuration file (.toml or .json)");
    log_indented!("    --check            Validate the configuration, print today's plan and exit");
    log_indented!("    --date <date>      Day to plan with --check (YYYY-MM-DD)");
    log_indented!("-d, --debug            Enable detailed debug output");
    log_indented!("    --log <file>       Write the log to a file instead of stdout");
    log_indented!("-h, --help             Print help information");
    log_indented!("-V, --version          Print version information");
    log_block_start!("Signals:");
    log_indented!("SIGUSR1                Log pending transitions");
    log_indented!("SIGUSR2                Reschedule today");
    log_indented!("SIGINT, SIGTERM        Switch everything off and exit");
    log_end!();
}
