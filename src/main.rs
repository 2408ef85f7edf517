use tessio::app;

// Current-thread runtime: capture streams are not sendable and the session
// is cooperative, so nothing here needs worker threads.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), anyhow::Error> {
    app::run().await
}
