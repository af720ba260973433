use std::error::Error;

use vessel_sdk::events::client::EventStreamClient;
use vessel_sdk::events::stores::TicketFiltering;

fn main() -> Result<(), Box<dyn Error>> {
    let ticket: u32 = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()?
        .unwrap_or(0);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let client = EventStreamClient::new();
        let router = client.connect().await?.into_router();

        let search = router.search_store(TicketFiltering::Enabled);
        search.reset(ticket);
        let _search_sub = search.subscribe(|results| {
            if let Some(reply) = results.replies.last() {
                println!(
                    "ticket={} replies={} latest={}",
                    results.ticket,
                    results.replies.len(),
                    reply.username,
                );
            }
        });

        let progress = router.download_progress_store();
        let _progress_sub = progress.subscribe(|percents| {
            for (ticket, percent) in percents {
                println!("download ticket={ticket} at {percent}%");
            }
        });

        // Stores update in the background; keep the process alive.
        std::future::pending::<()>().await;

        Ok::<(), Box<dyn Error>>(())
    })
}
