//! A program for describing a firmware variable for live synchronization.
//!
//! The output of this program is json in the format of [Description](dartt_sync::Description).
//!
//! It can either resolve a global variable from the DWARF info of an ELF file, or reload an
//! existing description (keeping its UI state and any settings written by other tools).

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

use std::{fs, path::Path, process};

use clap::{App, Arg, ArgGroup};
use dartt_sync::Session;
use tracing::{info, Level};

mod logging;

fn main() {
    let matches = App::new("dartt_describe")
        .about("Outputs the field layout of a firmware variable as json")
        .arg(
            Arg::with_name("elf")
                .long("elf")
                .value_name("FILE")
                .requires("symbol")
                .help("path to the firmware ELF file, built with debug info"),
        )
        .arg(
            Arg::with_name("symbol")
                .long("symbol")
                .value_name("NAME")
                .help("name of the global variable to describe"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("FILE")
                .help("path to an existing description to reload"),
        )
        .group(
            ArgGroup::with_name("input-option")
                .args(&["elf", "config"])
                .required(true)
                .multiple(false),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("path to the output JSON file"),
        )
        .arg(
            Arg::with_name("stdout")
                .long("stdout")
                .help("print the JSON text to stdout"),
        )
        .arg(
            Arg::with_name("tree")
                .long("tree")
                .help("print the field tree to stdout"),
        )
        .group(
            ArgGroup::with_name("output-option")
                .args(&["output", "stdout", "tree"])
                .required(true)
                .multiple(true),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .value_name("FILE")
                .help("append log lines to this file"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("log resolution details"),
        )
        .get_matches();

    let max_level = if matches.is_present("verbose") {
        Level::DEBUG
    } else {
        Level::INFO
    };
    logging::init(matches.value_of("log").map(Path::new), max_level).unwrap_or_else(|error| {
        eprintln!("Error while initializing logging: {}", error);
        process::exit(1);
    });

    let session;
    if let Some(elf_filename) = matches.value_of("elf") {
        let symbol_name = matches.value_of("symbol").unwrap_or_default();
        session = Session::load_elf(elf_filename, symbol_name).unwrap_or_else(|error| {
            eprintln!(
                "Error while loading {} from {}: {}",
                symbol_name, elf_filename, error
            );
            process::exit(1);
        });
    } else if let Some(config_filename) = matches.value_of("config") {
        session = Session::load_description(config_filename).unwrap_or_else(|error| {
            eprintln!("Error while loading {}: {}", config_filename, error);
            process::exit(1);
        });
    } else {
        unreachable!();
    }

    let description_json = session.to_description().to_json().unwrap_or_else(|error| {
        eprintln!("Error while serializing: {}", error);
        process::exit(1);
    });

    if let Some(output_filename) = matches.value_of("output") {
        fs::write(output_filename, &description_json).unwrap_or_else(|error| {
            eprintln!("Error while writing {}: {}", output_filename, error);
            process::exit(1);
        });
        info!("wrote {}", output_filename);
    }
    if matches.is_present("stdout") {
        println!("{}", description_json);
    }
    if matches.is_present("tree") {
        println!("{}", session.symbol());
        print!("{}", session.tree());
    }
}
