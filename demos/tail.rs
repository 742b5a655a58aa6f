//! Prints every line appended to the given files, the way a viewer sees them.
//!
//! Usage:
//!     tail /path/to/file1 /path/to/file2 ...
//!
//! The files do not need to exist yet, but their directories do.

use futures_util::StreamExt;

use livelog::{Config, Coordinator, Event};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let files = std::env::args().skip(1).map(Into::into).collect();

    let coordinator = Coordinator::new(Config {
        files,
        playback_buffer: 10,
        ..Config::default()
    })?;
    let _monitor = coordinator.start()?;

    let mut viewer = coordinator.connect();
    while let Some(event) = viewer.next().await {
        match event {
            Event::Handshake(handshake) => {
                for file in handshake.files {
                    println!("watching {} ({})", file.file_name, file.file_id);
                }
            }
            Event::Message(msg) => println!("({}) {}", msg.file_name, msg.message),
        }
    }

    Ok(())
}
