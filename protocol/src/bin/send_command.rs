use clap::{Parser, Subcommand};
use mini256::{
    Interface,
    frame::{Class, Command, RwFlag},
};
use std::error::Error;
use strum::VariantNames;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Encode and send a command
    Command {
        /// Command class (name or hex value)
        #[arg(short, long, value_parser = parse_class)]
        class: u8,

        /// Command subclass (hex format, e.g. `0x02`)
        #[arg(short, long, value_parser = parse_hex)]
        subclass: u8,

        /// Send a read command and wait for the response
        #[arg(short, long)]
        read: bool,

        /// Payload bytes (hex format)
        #[arg(value_parser = parse_hex)]
        payload: Vec<u8>,
    },
    /// Send a complete frame as-is
    Raw {
        /// Frame bytes (hex format)
        #[arg(value_parser = parse_hex, required = true)]
        bytes: Vec<u8>,
    },
}

fn parse_hex(s: &str) -> Result<u8, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);

    u8::from_str_radix(s, 16)
}

fn parse_class(s: &str) -> Result<u8, String> {
    s.parse::<Class>()
        .map(|class| class as u8)
        .or_else(|_| parse_hex(s))
        .map_err(|_| format!("expected hex value or one of {}", Class::VARIANTS.join(", ")))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = mini256::serial::open(&args.port)?;
    let mut intf = Interface::new(port);
    let resp = match args.mode {
        Mode::Command {
            class,
            subclass,
            read,
            mut payload,
        } => {
            let rw = if read { RwFlag::Read } else { RwFlag::Write };

            // Read requests carry a single placeholder byte
            if read && payload.is_empty() {
                payload.push(0x00);
            }

            let cmd = Command::new(class, subclass, rw, &payload)?;

            println!("Sending: {}", to_hex(cmd.encode().as_bytes()));

            intf.send_command(&cmd).await?
        }
        Mode::Raw { bytes } => {
            println!("Sending: {}", to_hex(&bytes));

            intf.send_raw(&bytes).await?
        }
    };

    if let Some(val) = resp {
        println!("Received: {}", to_hex(intf.last_response().bytes()));
        println!("Decoded: {val}");
    }

    Ok(())
}
