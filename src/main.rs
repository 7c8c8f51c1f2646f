use std::{fs::File, path::PathBuf, process::ExitCode};

use clap::Parser;
use fat32_boot::{LoaderOptionsBuilder, MB, ShortName, load_kernel_with};
use log::{Level, LevelFilter, Metadata, Record};

/// Loads the boot file from a FAT32 disk image the way the stage-2 loader would.
#[derive(Parser)]
#[command(name = "fat32-boot", version)]
struct Cli {
    /// Disk image with an MBR partition table
    image: PathBuf,

    /// 8.3 name of the boot file in the root directory
    #[arg(default_value = "KERNEL.IMG", value_parser = ShortName::parse)]
    boot_file: ShortName,

    /// Write the loaded clusters to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Size of the destination buffer in MiB, defaults to the size of the image
    #[arg(long)]
    buffer_mb: Option<u32>,

    /// Keep scanning past the first root directory cluster
    #[arg(long)]
    follow_root_chain: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let level = match record.level() {
                Level::Error => "ERROR",
                Level::Warn => "WARN ",
                Level::Info => "INFO ",
                Level::Debug => "DEBUG",
                Level::Trace => "TRACE",
            };
            eprintln!("[{level}] {}", record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }

    let mut image = match File::open(&cli.image) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Unable to open {}: {err}", cli.image.display());
            return ExitCode::FAILURE;
        }
    };

    let options = match LoaderOptionsBuilder::default()
        .boot_file(cli.boot_file)
        .follow_root_chain(cli.follow_root_chain)
        .build()
    {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Invalid loader options: {err}");
            return ExitCode::FAILURE;
        }
    };

    let buffer_size = match (cli.buffer_mb, image.metadata()) {
        (Some(mb), _) => mb as usize * MB as usize,
        (None, Ok(metadata)) => metadata.len() as usize,
        (None, Err(err)) => {
            eprintln!("Unable to stat {}: {err}", cli.image.display());
            return ExitCode::FAILURE;
        }
    };
    let mut kernel = vec![0u8; buffer_size];
    let loaded = match load_kernel_with(&mut image, &options, &mut kernel) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{}: {} clusters from cluster {}, {} bytes copied, {} bytes in directory entry",
        cli.boot_file, loaded.clusters, loaded.start_cluster, loaded.bytes_written, loaded.file_size
    );

    if let Some(output) = cli.output {
        // the directory entry knows the real size, the tail of the last cluster is slack
        let length = (loaded.file_size as usize).min(loaded.bytes_written);
        if let Err(err) = std::fs::write(&output, &kernel[..length]) {
            eprintln!("Unable to write {}: {err}", output.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
