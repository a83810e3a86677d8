mod cli;

const USAGE: &str = "usage:
  anchorsonic-demo --generate-ping [out.wav]
  anchorsonic-demo --offline <out.wav> [asset.wav]
  anchorsonic-demo [asset.wav]            (needs --features device-output)";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--generate-ping") => {
            cli::generate_ping(args.get(2).map_or(cli::DEFAULT_ASSET, String::as_str))
        }
        Some("--offline") => {
            let Some(output) = args.get(2) else {
                anyhow::bail!("{USAGE}");
            };
            cli::render_offline(
                args.get(3).map_or(cli::DEFAULT_ASSET, String::as_str),
                output,
            )
        }
        Some("--help" | "-h") => {
            println!("{USAGE}");
            Ok(())
        }
        asset => cli::play_on_device(asset.unwrap_or(cli::DEFAULT_ASSET)),
    }
}
