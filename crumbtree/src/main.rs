use colored::Colorize;
use crumbtree::command_argument_builder;
use crumbtree::handlers::{handle_products, handle_taxonomy, init_logging};
use crumbtree_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }
    init_logging(quiet);

    let outcome = match chosen_command.subcommand() {
        Some(("taxonomy", primary_command)) => handle_taxonomy(primary_command).await,
        Some(("products", primary_command)) => handle_products(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = outcome {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}
