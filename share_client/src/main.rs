#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Delegate to the framework entry point.
    share_client::run_with_config().await
}
