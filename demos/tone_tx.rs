use hackrf_tone::harness::{self, ToneConfig};
use log::error;

fn main() {
    let mut builder = env_logger::builder();
    builder.filter_level(log::LevelFilter::Info);
    builder.parse_default_env();
    builder.init();

    let config = ToneConfig::default();

    let res = harness::install_signal().and_then(|stop| harness::run(&config, &stop));
    if let Err(e) = res {
        let code = e.exit_code();
        error!("{:#}", anyhow::Error::from(e));
        std::process::exit(code);
    }
}
