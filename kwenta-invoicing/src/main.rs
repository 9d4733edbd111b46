use kwenta_invoicing::{config::Config, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kwenta_core::observability::init_tracing(
        "kwenta-invoicing",
        "info,kwenta_invoicing=debug",
    );

    let config = Config::from_env()?;
    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
