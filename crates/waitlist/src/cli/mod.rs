pub mod handlers;

use clap::{value_parser, Arg, Command};

pub fn build_cli() -> Command {
    Command::new("waitlist")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Equipment waitlist service")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .value_parser(value_parser!(std::path::PathBuf))
                .help("Config file to use instead of ./waitlist.toml"),
        )
        .subcommand(cmd_serve())
        .subcommand(cmd_sweep())
        .subcommand(cmd_freed())
        .subcommand(cmd_queue())
        .subcommand(cmd_position())
        .subcommand(cmd_history())
}

fn cmd_serve() -> Command {
    Command::new("serve").about("Run the HTTP API and the expiry sweeper")
}

fn cmd_sweep() -> Command {
    Command::new("sweep").about("Run one expiry sweep and exit")
}

fn cmd_freed() -> Command {
    Command::new("freed")
        .about("Signal that equipment became free")
        .arg(equipment_arg())
}

fn cmd_queue() -> Command {
    Command::new("queue")
        .about("Show an equipment queue")
        .arg(equipment_arg())
}

fn cmd_position() -> Command {
    Command::new("position")
        .about("Show a member's position")
        .arg(equipment_arg())
        .arg(Arg::new("member").required(true).help("Member ID"))
}

fn cmd_history() -> Command {
    Command::new("history")
        .about("Show recent queue events")
        .arg(equipment_arg())
        .arg(
            Arg::new("limit")
                .long("limit")
                .short('n')
                .default_value("20")
                .value_parser(value_parser!(u32).range(1..=500))
                .help("Number of events"),
        )
}

fn equipment_arg() -> Arg {
    Arg::new("equipment").required(true).help("Equipment ID")
}
