use crate::CLAP_STYLING;
use clap::{Arg, arg, command};
use std::path::PathBuf;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("crumbtree")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("crumbtree")
        .about("Rebuild a shop's category tree from the breadcrumbs on its pages")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner, progress spinner and info logs")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            command!("taxonomy")
                .about(
                    "Fetch every seed page, collect breadcrumb trails and write the resolved \
                category tree plus an errors log.",
                )
                .args(seed_args())
                .args(fetch_args())
                .arg(
                    arg!(-o --"out-dir" <PATH>)
                        .required(false)
                        .help("Directory for taxonomy_tree.json and taxonomy_errors.json")
                        .default_value("storage/taxonomy"),
                )
                .arg(
                    arg!(--"sample-size" <N>)
                        .required(false)
                        .help("Roots, conflicts and errors kept in the tree document's samples")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("50"),
                ),
        )
        .subcommand(
            command!("products")
                .about(
                    "Fetch every seed page and write one JSON line per product found, keyed by \
                slug.",
                )
                .args(seed_args())
                .args(fetch_args())
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("JSON lines file to write product records to")
                        .default_value("storage/products.jsonl"),
                ),
        )
}

fn seed_args() -> Vec<Arg> {
    vec![
        arg!(-s --"sitemap" <LOCATION>)
            .required(false)
            .help("Sitemap XML (urlset) as a local path or an http(s) URL")
            .conflicts_with("url-list"),
        arg!(-u --"url-list" <PATH>)
            .required(false)
            .help("JSON array, {errors|urls} object or newline-delimited list of URLs")
            .value_parser(clap::value_parser!(PathBuf))
            .conflicts_with("sitemap"),
        arg!(-l --"limit" <N>)
            .required(false)
            .help("Process at most N seed URLs (0 = unlimited)")
            .value_parser(clap::value_parser!(usize))
            .default_value("0"),
    ]
}

fn fetch_args() -> Vec<Arg> {
    vec![
        arg!(-c --"concurrency" <N>)
            .required(false)
            .help("Maximum requests in flight")
            .value_parser(clap::value_parser!(usize))
            .default_value("24"),
        arg!(--"connect-timeout" <SECONDS>)
            .required(false)
            .help("Connect timeout per request")
            .value_parser(clap::value_parser!(u64))
            .default_value("8"),
        arg!(-t --"timeout" <SECONDS>)
            .required(false)
            .help("Total timeout per request")
            .value_parser(clap::value_parser!(u64))
            .default_value("20"),
        arg!(-d --"delay-ms" <MILLIS>)
            .required(false)
            .help("Pause between dispatching two requests")
            .value_parser(clap::value_parser!(u64))
            .default_value("0"),
        arg!(--"progress-every" <N>)
            .required(false)
            .help("Log progress every N completed requests")
            .value_parser(clap::value_parser!(usize))
            .default_value("100"),
    ]
}
