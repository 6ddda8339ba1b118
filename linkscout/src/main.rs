use commands::command_argument_builder;
use linkscout::handlers::{handle_crawl, handle_rules, init_tracing};

mod commands;

#[tokio::main]
async fn main() {
    let chosen_command = command_argument_builder().get_matches();
    init_tracing(
        chosen_command.get_flag("verbose"),
        chosen_command.get_flag("quiet"),
    );

    let exit_code = match chosen_command.subcommand() {
        Some(("crawl", primary_command)) => {
            handle_crawl(primary_command, chosen_command.get_flag("quiet")).await
        }
        Some(("rules", _)) => handle_rules(),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    std::process::exit(exit_code);
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
