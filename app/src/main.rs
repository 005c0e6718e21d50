use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docdash_lib::Options;

#[derive(Parser, Debug)]
#[command(name = "docdash")]
#[command(about = "Submit documents to an ingestion backend and follow their processing")]
struct Args {
    /// Backend base URL (overrides DOCDASH_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Answer yes to confirmation prompts
    #[arg(long, short = 'y', global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow documents, tasks and logs until Ctrl+C (default)
    Watch {
        /// Print the render model as JSON lines instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the current document list once
    List,
    /// Upload files, one at a time
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Start (or retry) processing of a document
    Process { document_id: String },
    /// Delete documents
    Delete {
        #[arg(required = true)]
        document_ids: Vec<String>,
    },
    /// Remove every document from the backend
    Clear,
}

fn main() {
    let args = Args::parse();
    let options = Options {
        base_url: args.base_url,
        assume_yes: args.yes,
    };

    let code = match args.command.unwrap_or(Command::Watch { json: false }) {
        Command::Watch { json } => {
            docdash_lib::run_command(options, move |ctx| docdash_lib::watch::run(ctx, json))
        }
        Command::List => docdash_lib::run_command(options, docdash_lib::cli::list),
        Command::Upload { paths } => {
            docdash_lib::run_command(options, move |ctx| docdash_lib::cli::upload(ctx, paths))
        }
        Command::Process { document_id } => docdash_lib::run_command(options, move |ctx| {
            docdash_lib::cli::process(ctx, document_id)
        }),
        Command::Delete { document_ids } => docdash_lib::run_command(options, move |ctx| {
            docdash_lib::cli::delete(ctx, document_ids)
        }),
        Command::Clear => docdash_lib::run_command(options, docdash_lib::cli::clear),
    };

    std::process::exit(code);
}
