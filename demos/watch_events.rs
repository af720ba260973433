use std::error::Error;

use vessel_sdk::events::client::EventStreamClient;
use vessel_sdk::events::proto::VesselEvent;

fn main() -> Result<(), Box<dyn Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = EventStreamClient::new();
        let mut stream = client.connect().await?;

        while let Some(event) = stream.recv().await {
            match event {
                VesselEvent::SearchReply(reply) => {
                    println!(
                        "search_reply ticket={} user={} files={}",
                        reply.ticket,
                        reply.username,
                        reply.files.len(),
                    );
                }
                VesselEvent::DownloadStarted(started) => {
                    println!(
                        "download_started ticket={} file={}",
                        started.ticket, started.file_name,
                    );
                }
                VesselEvent::DownloadProgress(progress) => {
                    println!(
                        "download_progress ticket={} percent={}",
                        progress.ticket, progress.percent,
                    );
                }
                VesselEvent::RoomList(list) => {
                    println!("room_lists rooms={}", list.rooms.len());
                }
                VesselEvent::ChatMessage(message) => {
                    println!("[{}] {}: {}", message.room, message.username, message.message);
                }
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })
}
