use clap::Parser;
use token_deployer::cli::Cli;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let Cli {
        priv_key,
        rpc_url,
        artifacts_dir,
        deployments_path,
        command,
    } = Cli::parse();

    tracing_subscriber::fmt().pretty().init();

    command
        .run(priv_key, &rpc_url, &artifacts_dir, &deployments_path)
        .await?;

    Ok(())
}
