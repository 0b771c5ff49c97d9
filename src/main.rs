#[tokio::main]
async fn main() -> anyhow::Result<()> {
    soc2_ledger::run().await?;
    Ok(())
}
