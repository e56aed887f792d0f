use anyhow::{Context, Result};
use hackrf_tone::HackRf;

fn main() -> Result<()> {
    env_logger::init();

    for device in HackRf::list().context("Failed to list devices")? {
        println!(
            "Found HackRF One at {}:{}, S/N {}",
            device.bus_number,
            device.address,
            device.serial_number.as_deref().unwrap_or("unknown")
        );
    }

    let radio = HackRf::open_first().context("Failed to open Hackrf")?;

    println!("Board ID: {}", radio.board_id().context("Read board id")?);
    println!(
        "Firmware version: {}",
        radio.version().context("Read board version")?
    );
    println!("Device version: {}", radio.device_version());

    Ok(())
}
