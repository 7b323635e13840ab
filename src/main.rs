#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = studygate_rust::run().await {
        eprintln!("studygate-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
