//! Kiln command-line front end.
//!
//! `kiln build <config>` runs a one-shot import of everything under the
//! configured source roots and exits non-zero if any import failed.
//! `kiln watch <config>` keeps running, re-importing assets as their
//! sources change on disk.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use kiln_pipeline::{ImportEvent, ImportListener, ImportPipeline, PipelineConfig};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, config_path) = match args.as_slice() {
        [command, config] => (command.as_str(), PathBuf::from(config)),
        [command] => (command.as_str(), PathBuf::from("kiln.properties")),
        _ => {
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match command {
        "build" => build(&config_path),
        "watch" => watch(&config_path),
        _ => {
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("usage: kiln <build|watch> [config.properties]");
}

fn build(config_path: &Path) -> ExitCode {
    let pipeline = ImportPipeline::new(PipelineConfig::load(config_path));
    pipeline.add_listener(Box::new(ConsoleListener));

    let failed = pipeline.build_all();
    if failed > 0 {
        log::error!("build finished with {} failed imports", failed);
        return ExitCode::FAILURE;
    }
    log::info!("build complete, {} assets tracked", pipeline.registry().len());
    ExitCode::SUCCESS
}

fn watch(config_path: &Path) -> ExitCode {
    let pipeline = ImportPipeline::new(PipelineConfig::load(config_path));
    pipeline.add_listener(Box::new(ConsoleListener));

    // Bring everything up to date before watching for changes.
    pipeline.build_all();

    if let Err(e) = pipeline.start_watcher() {
        log::error!("could not start watcher: {}", e);
        return ExitCode::FAILURE;
    }
    log::info!("watching {:?} (ctrl-c to stop)", pipeline.config().roots);

    loop {
        pipeline.update();
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Prints converged batches and failures to the log.
struct ConsoleListener;

impl ImportListener for ConsoleListener {
    fn assets_changed(&self, events: &[ImportEvent]) {
        for event in events {
            log::info!("reloaded {:?} asset '{}'", event.kind, event.name);
        }
    }

    fn import_failed(&self, path: &Path, error: &str) {
        log::error!("import failed for {}: {}", path.display(), error);
    }
}
