mod cli;

use std::error::Error;
use std::process;

use clap::Parser;
use cli::{Cli, LoadedRule};
use git_leak_scan::RepositoryScanner;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let mut scanner = if cli.no_default_rules {
        RepositoryScanner::new()
    } else {
        match RepositoryScanner::with_default_rules() {
            Ok(scanner) => scanner,
            Err(err) => fail(&err),
        }
    };

    if let Some(threads) = cli.threads {
        scanner = scanner.with_threads(threads);
    }

    for (name, pattern) in &cli.rules {
        if let Err(err) = scanner.add_content_rule(name.clone(), pattern, Vec::<String>::new(), Vec::<String>::new())
        {
            fail(&err);
        }
    }

    if let Some(path) = &cli.rules_file {
        let loaded = match cli::load_rules_file(path) {
            Ok(loaded) => loaded,
            Err(err) => {
                eprintln!("{err}");
                process::exit(1);
            }
        };
        for rule in loaded {
            let result = match rule {
                LoadedRule::Content(spec) => {
                    scanner.add_content_rule(spec.name, &spec.pattern, spec.whitelist, spec.blacklist)
                }
                LoadedRule::FilePath(spec) => scanner.add_file_path_rule(spec.name, &spec.pattern),
            };
            if let Err(err) = result {
                fail(&err);
            }
        }
    }
    for ext in &cli.skip_extensions {
        if let Err(err) = scanner.add_file_extension_to_skip(ext.clone()) {
            fail(&err);
        }
    }
    for substr in &cli.skip_paths {
        if let Err(err) = scanner.add_file_path_to_skip(substr.clone()) {
            fail(&err);
        }
    }

    let results = match scanner.scan(&cli.repository, &cli.branches, cli.since) {
        Ok(results) => results,
        Err(err) => fail(&err),
    };

    cli::render(&results, cli.format);
}

fn fail(err: &dyn Error) -> ! {
    eprintln!("{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("Caused by: {cause}");
        source = cause.source();
    }
    process::exit(1);
}
