use clap::Parser;
use embassy_time::Duration;
use mini256::{Interface, camera::Camera, reassembly::Timeouts};
use std::{error::Error, fmt::Display};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Maximum time to wait for a response in milliseconds
    #[arg(long, default_value_t = 150)]
    response_timeout: u64,

    /// Silence in milliseconds that completes a response
    #[arg(long, default_value_t = 75)]
    byte_timeout: u64,
}

fn print_item(name: &str, item: Option<impl Display>) {
    match item {
        Some(val) => println!("{name:<22}{val}"),
        None => println!("{name:<22}unavailable"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = mini256::serial::open(&args.port)?;
    let mut intf = Interface::new(port);

    intf.set_timeouts(Timeouts {
        response: Duration::from_millis(args.response_timeout),
        byte: Duration::from_millis(args.byte_timeout),
    });

    let mut camera = Camera::from_interface(intf);
    let info = camera.query_device_info().await?;

    print_item("Model", Some(&info.model));
    print_item("FPGA version", info.fpga_version);
    print_item("FPGA build date", info.fpga_build_date);
    print_item("Software version", info.software_version);
    print_item("Software build date", info.software_build_date);
    print_item("Calibration version", info.calibration_version);
    print_item(
        "ISP version",
        info.isp_version
            .map(|v| format!("{:02x}{:02x}{:02x}{:02x}", v[0], v[1], v[2], v[3])),
    );
    print_item("Status", info.status);

    Ok(())
}
