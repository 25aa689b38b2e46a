use std::fs::OpenOptions;

#[derive(Debug, Default)]
struct CliArgs {
    null_audio: bool,
    output: Option<String>,
    list_outputs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = parse_args(std::env::args().skip(1).collect())?;

    if args.list_outputs {
        for name in mixdj::audio::output_device_names() {
            println!("{name}");
        }
        return Ok(());
    }

    init_logging();
    log::info!("mixdj starting up");

    mixdj::app::run(mixdj::app::AppOptions {
        null_audio: args.null_audio,
        output_device: args.output,
    })
}

/// Log lines go to the config directory so they never draw over the
/// terminal UI. Without a writable log file logging stays off.
fn init_logging() {
    let Ok(path) = mixdj::config::ensure_config_dir().and_then(|_| mixdj::config::log_path())
    else {
        return;
    };
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else {
        return;
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

fn parse_args(args: Vec<String>) -> anyhow::Result<CliArgs> {
    let mut out = CliArgs::default();
    let mut index = 0;
    while index < args.len() {
        match args[index].as_str() {
            "--null-audio" => out.null_audio = true,
            "--list-outputs" => out.list_outputs = true,
            "--output" => {
                index += 1;
                let Some(value) = args.get(index) else {
                    anyhow::bail!("--output requires a device name");
                };
                if value.trim().is_empty() {
                    anyhow::bail!("--output cannot be empty");
                }
                out.output = Some(value.trim().to_string());
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument {other}"),
        }
        index += 1;
    }
    Ok(out)
}

fn print_help() {
    println!("MixDJ");
    println!("  --null-audio      Play silently without opening an audio device");
    println!("  --output NAME     Use the named audio output device");
    println!("  --list-outputs    Print audio output device names and exit");
    println!();
    println!("  Set MIXDJ_CONFIG_DIR to move state, settings and the log file.");
}
