use clap::Parser;
use mini256::{Error, Interface, Observer, decode::DecodedValue, frame::FrameView};
use std::error;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Serial port path
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Also print the raw bytes of every frame
    #[arg(short, long)]
    raw: bool,
}

struct Printer {
    raw: bool,
}

#[async_trait::async_trait(?Send)]
impl Observer for Printer {
    async fn on_response(&mut self, frame: &FrameView<'_>, val: &DecodedValue) {
        println!("[{:02x}/{:02x}] {val}", frame.class(), frame.subclass());

        if self.raw {
            println!("        {:02x?}", frame.as_bytes());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let port = mini256::serial::open(&args.port)?;
    let mut intf = Interface::with_observer(port, Printer { raw: args.raw });

    println!("Listening on {}", args.port);

    loop {
        match intf.listen().await {
            Ok(_) => {}
            // Line noise or a truncated frame
            Err(Error::ShortResponse(len)) => eprintln!("Ignoring {len} stray bytes"),
            Err(err) => return Err(err.into()),
        }
    }
}
